use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use coachdeck::collaborators::InvitationSender;
use coachdeck_api::{Client, OwnerScope, Result};

use crate::http::{self, Upstream};

const UPSTREAM: Upstream = Upstream::Collaborator("invitations");

#[derive(Debug, Serialize)]
struct InvitationRequest<'a> {
    client_id: &'a str,
    email: &'a str,
    name: Option<&'a str>,
    coach_id: &'a str,
}

/// Sends client invitations through the backend's `send-invitation` function.
pub struct EdgeFunctionInviter {
    client: reqwest::Client,
    function_url: String,
    anon_key: String,
    access_token: String,
}

impl EdgeFunctionInviter {
    pub fn new(base_url: &str, anon_key: &str, access_token: &str) -> Result<Self> {
        Ok(Self {
            client: http::build_client()?,
            function_url: format!(
                "{}/functions/v1/send-invitation",
                base_url.trim_end_matches('/')
            ),
            anon_key: anon_key.to_string(),
            access_token: access_token.to_string(),
        })
    }
}

#[async_trait]
impl InvitationSender for EdgeFunctionInviter {
    #[tracing::instrument(name = "provider.invitations.send", skip(self, client, identity), fields(client_id = %client.id))]
    async fn send_invitation(&self, client: &Client, identity: &OwnerScope) -> Result<()> {
        let body = InvitationRequest {
            client_id: &client.id,
            email: &client.email,
            name: client.name.as_deref(),
            coach_id: identity.as_str(),
        };
        let request = self
            .client
            .post(&self.function_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
            .json(&body);

        http::send(request, &self.function_url, "send invitation", UPSTREAM).await?;
        info!("[EdgeFunctionInviter] Invitation sent to client {}", client.id);
        Ok(())
    }
}
