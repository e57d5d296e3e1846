//! Contracts for the external services the dispatchers call.
//!
//! Implementations live in `coachdeck-services` (HTTP) and
//! [`crate::testing`] (in-process fakes).

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use coachdeck_api::{BrandAttribute, Client, OwnerScope, Result};

/// Chunked response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Where the user completes payment
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, tier: &str, identity: &OwnerScope)
    -> Result<CheckoutSession>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: Some(512),
            temperature: Some(0.7),
            system: None,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub heading: Option<String>,
    pub body: String,
}

/// A document handed to the renderer. Layout is the renderer's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    #[serde(default)]
    pub sections: Vec<DocumentSection>,
    #[serde(default)]
    pub brand: Vec<BrandAttribute>,
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, document: &Document) -> Result<ByteStream>;
}

#[async_trait]
pub trait InvitationSender: Send + Sync {
    async fn send_invitation(&self, client: &Client, identity: &OwnerScope) -> Result<()>;
}
