//! Message schemas for every payload that crosses a context boundary
//!
//! Nothing read from a broadcast channel or a window message is trusted until
//! it has passed through [`Schema::validate`]. Validation runs in three steps:
//!
//! 1. the `event` tag must be present and name a known variant of the family
//! 2. the payload must deserialize structurally
//! 3. field-level checks (call SID pattern, coordinates) must pass
//!
//! A failure is reported as a [`ValidationError`]; callers log it and drop the
//! message.

mod error;
mod flex;
mod host;
mod protocol;
mod timestamp;

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::ValidationError;
pub use flex::{CallDetails, FlexEvent, HostEvent};
pub use host::{CallerIdCandidate, CallerIdMatch, EngagementCreated, ObjectCoordinates, ObjectTypeId, OnReadyEvent};
pub use protocol::{BroadcastEvent, CallDirection, ProtocolKind, StateEvent, WindowState, WindowStatus};

/// Name of the discriminating field on every tagged message
pub const TAG_FIELD: &str = "event";

/// Telephony provider call identifier: `CA` followed by 32 hex digits
static CALL_SID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CA[0-9a-fA-F]{32}$").expect("call SID pattern is valid"));

/// Check a call SID against the provider's fixed format
pub fn is_call_sid(value: &str) -> bool {
    CALL_SID.is_match(value)
}

pub(crate) fn check_call_sid(family: &'static str, field: &'static str, value: &str) -> Result<(), ValidationError> {
    if is_call_sid(value) {
        Ok(())
    } else {
        Err(ValidationError::Field {
            family,
            field,
            reason: format!("`{}` is not a call SID (expected CA followed by 32 hex digits)", value),
        })
    }
}

/// A message family that can be validated from raw JSON
pub trait Schema: Sized + DeserializeOwned {
    /// Family name used in errors and log lines
    const FAMILY: &'static str;

    /// Accepted values of the `event` tag; empty for untagged payloads
    const KNOWN_TAGS: &'static [&'static str] = &[];

    /// Field-level checks that run after structural deserialization
    fn check(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Validate a raw payload into a typed message
    fn validate(raw: &Value) -> Result<Self, ValidationError> {
        if !Self::KNOWN_TAGS.is_empty() {
            let tag = raw
                .get(TAG_FIELD)
                .and_then(Value::as_str)
                .ok_or(ValidationError::MissingTag { family: Self::FAMILY })?;

            if !Self::KNOWN_TAGS.contains(&tag) {
                return Err(ValidationError::UnknownTag {
                    family: Self::FAMILY,
                    tag: tag.to_string(),
                });
            }
        }

        let message: Self = serde_json::from_value(raw.clone()).map_err(|e| ValidationError::Shape {
            family: Self::FAMILY,
            reason: e.to_string(),
        })?;

        message.check()?;
        Ok(message)
    }
}
