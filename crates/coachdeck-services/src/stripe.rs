//! Payment provider client
//!
//! Checkout sessions are created with a form-encoded POST. Webhook payloads
//! are parsed into [`BillingEvent`]s tagged with the webhook source, which is
//! the only source the billing lifecycle accepts for granting access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use coachdeck::billing::{BillingEvent, BillingEventKind};
use coachdeck::collaborators::{CheckoutSession, PaymentGateway};
use coachdeck::config::PaymentsConfig;
use coachdeck_api::{ApiError, OwnerScope, Result};

use crate::http::{self, Upstream};

const SERVICE: &str = "payments";
const UPSTREAM: Upstream = Upstream::Collaborator(SERVICE);

pub struct StripeGateway {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
    success_url: String,
    cancel_url: String,
    prices: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

impl StripeGateway {
    pub fn from_config(config: &PaymentsConfig) -> Result<Self> {
        let secret_key = config
            .secret_key
            .clone()
            .ok_or_else(|| ApiError::invalid_input("payments.secret_key is not configured"))?;
        Ok(Self {
            client: http::build_client()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key,
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            prices: config.prices.clone(),
        })
    }

    fn checkout_form(&self, tier: &str, identity: &OwnerScope) -> Result<Vec<(String, String)>> {
        let price = self
            .prices
            .get(tier)
            .ok_or_else(|| ApiError::invalid_input(format!("Unknown subscription tier: {}", tier)))?;
        Ok(checkout_form(
            price,
            tier,
            identity,
            &self.success_url,
            &self.cancel_url,
        ))
    }
}

fn checkout_form(
    price: &str,
    tier: &str,
    identity: &OwnerScope,
    success_url: &str,
    cancel_url: &str,
) -> Vec<(String, String)> {
    [
        ("mode", "subscription"),
        ("line_items[0][price]", price),
        ("line_items[0][quantity]", "1"),
        ("success_url", success_url),
        ("cancel_url", cancel_url),
        ("client_reference_id", identity.as_str()),
        ("metadata[tier]", tier),
        ("subscription_data[metadata][user_id]", identity.as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(name = "provider.stripe.checkout", skip(self, identity))]
    async fn create_checkout_session(
        &self,
        tier: &str,
        identity: &OwnerScope,
    ) -> Result<CheckoutSession> {
        let url = format!("{}/checkout/sessions", self.api_url);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", Uuid::new_v4().to_string())
            .form(&self.checkout_form(tier, identity)?);

        let body = http::send(request, &url, "create checkout session", UPSTREAM).await?;
        let response: SessionResponse = http::parse_json(&body, &url, UPSTREAM)?;
        let redirect_url = response
            .url
            .ok_or_else(|| UPSTREAM.error("Checkout session has no redirect URL"))?;

        info!("[StripeGateway] Created checkout session {} for {}", response.id, tier);
        Ok(CheckoutSession {
            id: response.id,
            redirect_url,
        })
    }
}

/// A billing event decoded from a webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    /// Our user id, from subscription metadata or the checkout reference
    pub user_id: Option<String>,
    pub customer_ref: Option<String>,
    pub event: BillingEvent,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: Value,
}

/// Decode a webhook payload. Event types that do not move the billing
/// lifecycle yield `Ok(None)`.
pub fn parse_webhook(payload: &str) -> Result<Option<WebhookEvent>> {
    let envelope: Envelope = serde_json::from_str(payload)
        .map_err(|e| ApiError::invalid_input(format!("Malformed webhook payload: {}", e)))?;
    let object = &envelope.data.object;

    let kind = match envelope.event_type.as_str() {
        "invoice.paid" | "invoice.payment_succeeded" => Some(BillingEventKind::PaymentSucceeded),
        "invoice.payment_failed" => Some(BillingEventKind::PaymentFailed {
            grace_period_end: timestamp(object, "next_payment_attempt"),
        }),
        "customer.subscription.created" | "customer.subscription.updated" => {
            subscription_kind(object)
        }
        "customer.subscription.deleted" => Some(BillingEventKind::Canceled),
        _ => None,
    };

    Ok(kind.map(|kind| WebhookEvent {
        event_id: envelope.id.clone(),
        event_type: envelope.event_type.clone(),
        user_id: string_at(object, &["metadata", "user_id"])
            .or_else(|| string_at(object, &["subscription_details", "metadata", "user_id"]))
            .or_else(|| string_at(object, &["client_reference_id"])),
        customer_ref: string_at(object, &["customer"]),
        event: BillingEvent::from_webhook(kind),
    }))
}

fn subscription_kind(object: &Value) -> Option<BillingEventKind> {
    match object.get("status").and_then(Value::as_str)? {
        "trialing" => Some(BillingEventKind::TrialStarted),
        "active" => Some(BillingEventKind::PaymentSucceeded),
        "past_due" | "unpaid" => Some(BillingEventKind::PaymentFailed {
            grace_period_end: timestamp(object, "current_period_end"),
        }),
        "canceled" => Some(BillingEventKind::Canceled),
        _ => None,
    }
}

fn string_at(object: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(object, |value, key| value.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn timestamp(object: &Value, key: &str) -> Option<DateTime<Utc>> {
    object
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}
