pub mod attrs;
pub mod builder;
pub mod error;
pub mod node;
pub mod parser;
pub mod writer;

pub use attrs::AttrParser;
pub use builder::ElementBuilder;
pub use error::XmlError;
pub use node::{Attrs, Element};
