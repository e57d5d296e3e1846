//! Tagged configuration payloads stored as JSON columns.
//!
//! Brand attributes and workflow node configs are discriminated by a `type`
//! field. Known tags decode into typed variants; anything else is kept
//! verbatim in [`OpaquePayload`] so newer writers don't lose data when an
//! older client saves the row back.

use serde::{Deserialize, Serialize};

use crate::entity::Row;

/// A payload whose tag this build does not understand. Serializes back to
/// exactly the fields it was read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpaquePayload {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(flatten)]
    pub fields: Row,
}

// =============================================================================
// Workflow nodes
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnownNodeConfig {
    /// Entry point, e.g. "client_created" or "tag_added"
    Trigger { event: String },
    SendEmail {
        template_id: String,
        subject: String,
    },
    Wait { hours: u32 },
    AddTag { tag: String },
    RemoveTag { tag: String },
    /// Persisted for the editor only; nothing evaluates it.
    Condition {
        field: String,
        equals: serde_json::Value,
    },
}

/// Known variants are tried first. A known tag with fields that don't fit its
/// variant also lands in `Opaque`, which keeps the row intact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NodeConfig {
    Known(KnownNodeConfig),
    Opaque(OpaquePayload),
}

impl NodeConfig {
    pub fn type_tag(&self) -> &str {
        match self {
            NodeConfig::Known(known) => match known {
                KnownNodeConfig::Trigger { .. } => "trigger",
                KnownNodeConfig::SendEmail { .. } => "send_email",
                KnownNodeConfig::Wait { .. } => "wait",
                KnownNodeConfig::AddTag { .. } => "add_tag",
                KnownNodeConfig::RemoveTag { .. } => "remove_tag",
                KnownNodeConfig::Condition { .. } => "condition",
            },
            NodeConfig::Opaque(opaque) => &opaque.type_tag,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, NodeConfig::Known(_))
    }
}

impl From<KnownNodeConfig> for NodeConfig {
    fn from(config: KnownNodeConfig) -> Self {
        NodeConfig::Known(config)
    }
}

// =============================================================================
// Brand attributes
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnownBrandAttribute {
    Color { role: String, hex: String },
    Font { role: String, family: String },
    Logo { url: String },
    Voice {
        tone: String,
        #[serde(default)]
        keywords: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BrandAttribute {
    Known(KnownBrandAttribute),
    Opaque(OpaquePayload),
}

impl BrandAttribute {
    /// Hex value of the color attribute with the given role, if present.
    pub fn color_for<'a>(attributes: &'a [BrandAttribute], role: &str) -> Option<&'a str> {
        attributes.iter().find_map(|attr| match attr {
            BrandAttribute::Known(KnownBrandAttribute::Color { role: r, hex }) if r == role => {
                Some(hex.as_str())
            }
            _ => None,
        })
    }
}
