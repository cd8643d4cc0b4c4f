use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum XmlError {
    /// The input ends before the current element is complete. The caller
    /// should append more input and retry.
    #[error("incomplete xml fragment")]
    Incomplete,
    #[error("malformed xml at byte {at}: {reason}")]
    Malformed { at: usize, reason: String },
    #[error("element <{element}> is missing required attribute '{attr}'")]
    MissingAttr { element: String, attr: String },
    #[error("failed to parse attribute '{attr}': {reason}")]
    AttrParse { attr: String, reason: String },
}

impl XmlError {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, XmlError::Incomplete)
    }
}
