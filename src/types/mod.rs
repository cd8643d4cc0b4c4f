pub mod jid;
pub mod participant;
pub mod service;

pub use jid::Jid;
pub use participant::Participant;
pub use service::ServiceEndpoint;
