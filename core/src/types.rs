//! Entities exchanged with the administrative API.
//!
//! # Design
//! Server-assigned fields are plain `String`s that stay empty until the
//! server fills them in. Empty optional fields are left out of request
//! bodies, and fields missing from a response decode to their empty value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scopes the server appends to keys on its own. They show up on reads even
/// when nobody asked for them.
pub const IMPLICIT_SCOPES: [&str; 3] = [
    "2fa_required",
    "sender_verification_eligible",
    "sender_verification_legacy",
];

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u8) -> bool {
    *value == 0
}

/// An API key. `secret` is only populated in the response to a create.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey {
    #[serde(rename = "api_key_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "api_key", default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl ApiKey {
    /// Scopes minus the ones the server adds by itself.
    pub fn explicit_scopes(&self) -> Vec<&str> {
        self.scopes
            .iter()
            .map(String::as_str)
            .filter(|scope| !IMPLICIT_SCOPES.contains(scope))
            .collect()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.secret.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("ApiKey")
            .field("id", &self.id)
            .field("secret", &secret)
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Template engine mode. Fixed once the template exists.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    #[default]
    Dynamic,
    Legacy,
}

impl Generation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Generation::Dynamic => "dynamic",
            Generation::Legacy => "legacy",
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown template generation {0:?}, expected dynamic or legacy")]
pub struct UnknownGeneration(pub String);

impl FromStr for Generation {
    type Err = UnknownGeneration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dynamic" => Ok(Generation::Dynamic),
            "legacy" => Ok(Generation::Legacy),
            other => Err(UnknownGeneration(other.to_string())),
        }
    }
}

/// A transactional template.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub generation: Generation,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<TemplateVersion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Listing envelope. Only `GET /templates` wraps its payload this way.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateList {
    pub result: Vec<Template>,
}

/// One version of a transactional template.
///
/// `template_id` names the owning template. `active` is the wire flag: 1 for
/// the active version, 0 otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateVersion {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thumbnail_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub active: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub html_content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plain_content: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub generate_plain_content: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub editor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test_data: String,
}

impl TemplateVersion {
    pub fn is_active(&self) -> bool {
        self.active != 0
    }
}
