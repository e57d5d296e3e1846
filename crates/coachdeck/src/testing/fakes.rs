//! In-process collaborators with call recording and failure injection.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use coachdeck_api::{ApiError, Client, OwnerScope, Result};

use crate::collaborators::{
    ByteStream, CheckoutSession, Document, DocumentRenderer, GenerationParams, InvitationSender,
    PaymentGateway, TextGenerator,
};

fn take_failure(slot: &Mutex<Option<ApiError>>) -> Option<ApiError> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

#[derive(Default)]
pub struct FakePaymentGateway {
    calls: Mutex<Vec<(String, String)>>,
    failure: Mutex<Option<ApiError>>,
}

impl FakePaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, err: ApiError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    /// (tier, owner) per call
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_checkout_session(
        &self,
        tier: &str,
        identity: &OwnerScope,
    ) -> Result<CheckoutSession> {
        let n = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push((tier.to_string(), identity.to_string()));
            calls.len()
        };
        if let Some(err) = take_failure(&self.failure) {
            return Err(err);
        }
        Ok(CheckoutSession {
            id: format!("cs_test_{n}"),
            redirect_url: format!("https://checkout.test/{tier}/{n}"),
        })
    }
}

#[derive(Default)]
pub struct FakeInvitationSender {
    calls: AtomicUsize,
    invited: Mutex<Vec<String>>,
    delay: Option<Duration>,
    failure: Mutex<Option<ApiError>>,
}

impl FakeInvitationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold each send open for `delay`, long enough to race a second click.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, err: ApiError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Emails of successfully invited clients
    pub fn invited(&self) -> Vec<String> {
        self.invited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl InvitationSender for FakeInvitationSender {
    async fn send_invitation(&self, client: &Client, _identity: &OwnerScope) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = take_failure(&self.failure) {
            return Err(err);
        }
        self.invited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(client.email.clone());
        Ok(())
    }
}

pub struct FakeTextGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl FakeTextGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    async fn complete(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Renders a document as plain text lines, one chunk per line.
#[derive(Default)]
pub struct FakeDocumentRenderer {
    renders: AtomicUsize,
}

impl FakeDocumentRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRenderer for FakeDocumentRenderer {
    async fn render(&self, document: &Document) -> Result<ByteStream> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        let mut lines = vec![document.title.clone()];
        for section in &document.sections {
            lines.extend(section.heading.clone());
            lines.push(section.body.clone());
        }
        let chunks: Vec<Result<Vec<u8>>> = lines
            .into_iter()
            .map(|line| Ok(format!("{line}\n").into_bytes()))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}
