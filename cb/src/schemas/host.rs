//! Payloads delivered by the CRM host SDK callbacks

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::{Schema, ValidationError};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

/// The host SDK is loose about ids: accept `42` as well as `"42"`
fn coerce_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("`{}` is not a numeric id", s))),
    }
}

/// Readiness signal; decides the context's role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnReadyEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_url: Option<String>,
    /// Kept as text so unsupported locations surface as a descriptive error
    pub iframe_location: String,
    #[serde(deserialize_with = "coerce_u64")]
    pub portal_id: u64,
    #[serde(deserialize_with = "coerce_u64")]
    pub user_id: u64,
}

impl Schema for OnReadyEvent {
    const FAMILY: &'static str = "ready";

    fn check(&self) -> Result<(), ValidationError> {
        if self.iframe_location.trim().is_empty() {
            return Err(ValidationError::Field {
                family: Self::FAMILY,
                field: "iframeLocation",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// CRM object type: `0-1` contacts, `0-2` companies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectTypeId {
    #[serde(rename = "0-1")]
    Contact,
    #[serde(rename = "0-2")]
    Company,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCoordinates {
    #[serde(deserialize_with = "coerce_u64")]
    pub object_id: u64,
    pub object_type_id: ObjectTypeId,
    #[serde(deserialize_with = "coerce_u64")]
    pub portal_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdCandidate {
    pub caller_id_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub object_coordinates: ObjectCoordinates,
}

/// Caller-id lookup result for an incoming call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdMatch {
    #[serde(deserialize_with = "coerce_u64")]
    pub call_id: u64,
    pub caller_id_matches: Vec<CallerIdCandidate>,
}

impl Schema for CallerIdMatch {
    const FAMILY: &'static str = "caller-id";
}

/// Host confirmation that an engagement was created for a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementCreated {
    pub external_call_id: String,
    #[serde(deserialize_with = "coerce_u64")]
    pub engagement_id: u64,
}

impl Schema for EngagementCreated {
    const FAMILY: &'static str = "engagement";

    fn check(&self) -> Result<(), ValidationError> {
        super::check_call_sid(Self::FAMILY, "externalCallId", &self.external_call_id)
    }
}
