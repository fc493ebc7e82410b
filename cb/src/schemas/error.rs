//! Validation error type

use thiserror::Error;

/// Why an inbound message was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{family} message has no `event` tag")]
    MissingTag { family: &'static str },

    #[error("{family} message has unknown tag `{tag}`")]
    UnknownTag { family: &'static str, tag: String },

    #[error("malformed {family} message: {reason}")]
    Shape { family: &'static str, reason: String },

    #[error("invalid {family} field `{field}`: {reason}")]
    Field {
        family: &'static str,
        field: &'static str,
        reason: String,
    },
}

impl ValidationError {
    pub fn family(&self) -> &'static str {
        match self {
            Self::MissingTag { family }
            | Self::UnknownTag { family, .. }
            | Self::Shape { family, .. }
            | Self::Field { family, .. } => family,
        }
    }
}
