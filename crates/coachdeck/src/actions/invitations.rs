use chrono::Utc;
use serde_json::Value;

use coachdeck_api::{ApiError, Client, Result, Row};

use super::{ActionDispatcher, ActionKey};
use crate::collaborators::InvitationSender;
use crate::core::EntitySync;

impl ActionDispatcher {
    /// Send the client an invitation, then record `invited_at`.
    ///
    /// The mirror only sees the client row the store confirmed after the
    /// update. If sending fails nothing is written.
    pub async fn send_invitation(
        &self,
        sender: &dyn InvitationSender,
        clients: &EntitySync<Client>,
        client_id: &str,
    ) -> Result<Client> {
        let key = ActionKey::new("send_invitation", client_id);
        self.dispatch(key, async {
            let scope = clients.scope()?;
            let client = clients.get(client_id).ok_or_else(|| ApiError::NotFound {
                table: "clients".to_string(),
                id: client_id.to_string(),
            })?;

            sender.send_invitation(&client, &scope).await?;

            let mut patch = Row::new();
            patch.insert(
                "invited_at".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
            clients.update(client_id, patch).await
        })
        .await
    }
}
