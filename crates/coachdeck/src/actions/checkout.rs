use coachdeck_api::{OwnerScope, Result};

use super::{ActionDispatcher, ActionKey};
use crate::collaborators::{CheckoutSession, PaymentGateway};

impl ActionDispatcher {
    /// Open a checkout session for `tier`.
    ///
    /// Nothing local changes: entitlement arrives later through the billing
    /// webhook and the `subscriptions` feed.
    pub async fn start_checkout(
        &self,
        gateway: &dyn PaymentGateway,
        scope: &OwnerScope,
        tier: &str,
    ) -> Result<CheckoutSession> {
        let key = ActionKey::new("start_checkout", tier);
        self.dispatch(key, gateway.create_checkout_session(tier, scope))
            .await
    }
}
