//! HTTP implementations of the CoachDeck collaborator contracts.
//!
//! - [`supabase`]: the hosted backend as a [`coachdeck::RemoteStore`]
//! - [`stripe`]: checkout sessions and billing webhook parsing
//! - [`openai`]: text generation
//! - [`documents`]: document rendering
//! - [`invitations`]: client invitations

pub mod documents;
pub mod http;
pub mod invitations;
pub mod openai;
pub mod stripe;
pub mod supabase;

use std::sync::Arc;
use tracing::info;

use coachdeck::AppConfig;
use coachdeck::collaborators::{DocumentRenderer, InvitationSender, PaymentGateway, TextGenerator};
use coachdeck_api::Result;

pub use documents::HttpDocumentRenderer;
pub use invitations::EdgeFunctionInviter;
pub use openai::OpenAiGenerator;
pub use stripe::{StripeGateway, WebhookEvent, parse_webhook};
pub use supabase::SupabaseStore;

/// Every client the configuration can build. The store is required; the
/// collaborators are present only when their credentials are configured.
pub struct ServiceSet {
    pub store: SupabaseStore,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub renderer: Option<Arc<dyn DocumentRenderer>>,
    pub inviter: Option<Arc<dyn InvitationSender>>,
}

impl ServiceSet {
    pub fn from_config(config: &AppConfig, access_token: Option<&str>) -> Result<Self> {
        let store = SupabaseStore::from_config(config)?;
        store.set_access_token(access_token.map(str::to_string));

        let payments: Option<Arc<dyn PaymentGateway>> = match config.payments.secret_key {
            Some(_) => Some(Arc::new(StripeGateway::from_config(&config.payments)?)),
            None => None,
        };
        let generator: Option<Arc<dyn TextGenerator>> = match config.generation.api_key {
            Some(_) => Some(Arc::new(OpenAiGenerator::from_config(&config.generation)?)),
            None => None,
        };
        let renderer: Option<Arc<dyn DocumentRenderer>> = match config.documents.render_url {
            Some(_) => {
                let mut renderer = HttpDocumentRenderer::from_config(&config.documents)?;
                if let Some(token) = access_token {
                    renderer = renderer.with_bearer(token);
                }
                Some(Arc::new(renderer))
            }
            None => None,
        };
        let inviter: Option<Arc<dyn InvitationSender>> = match (access_token, &config.backend.anon_key) {
            (Some(token), Some(anon_key)) => Some(Arc::new(EdgeFunctionInviter::new(
                store.base_url(),
                anon_key,
                token,
            )?)),
            _ => None,
        };

        info!(
            "[ServiceSet] Backend {} (payments: {}, generation: {}, documents: {}, invitations: {})",
            store.base_url(),
            payments.is_some(),
            generator.is_some(),
            renderer.is_some(),
            inviter.is_some()
        );

        Ok(Self {
            store,
            payments,
            generator,
            renderer,
            inviter,
        })
    }
}
