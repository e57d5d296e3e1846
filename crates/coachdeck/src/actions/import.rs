use tracing::info;

use coachdeck_api::{Client, Result};

use super::{ActionDispatcher, ActionKey};
use crate::core::EntitySync;
use crate::import::{ColumnMapping, ImportSummary, parse_clients};

impl ActionDispatcher {
    /// Import clients from CSV bytes with one bulk insert.
    ///
    /// If the insert fails nothing is merged and the error is returned;
    /// skipped rows and parse errors are reported in the summary.
    pub async fn import_clients_csv(
        &self,
        clients: &EntitySync<Client>,
        bytes: &[u8],
        mapping: &ColumnMapping,
    ) -> Result<ImportSummary> {
        let scope = clients.scope()?;
        let key = ActionKey::new("import_clients_csv", scope.as_str());
        self.dispatch(key, async {
            let parsed = parse_clients(bytes, mapping)?;
            let imported = if parsed.drafts.is_empty() {
                0
            } else {
                clients.create_many(parsed.drafts.clone()).await?.len()
            };
            let summary = parsed.summary(imported);
            info!(
                "[Import] imported={} skipped={} errors={}",
                summary.imported, summary.skipped, summary.errors
            );
            Ok(summary)
        })
        .await
    }
}
