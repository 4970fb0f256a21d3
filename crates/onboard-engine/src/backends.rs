//! The remote collaborators, constructed once and injected everywhere.

use onboard_client::{ResourceServerClient, StoreClient, StoreTarget, TokenProvider};
use std::sync::Arc;

/// Shared handles to every remote system the engine talks to.
#[derive(Clone)]
pub struct Backends {
    /// Local catalogue.
    pub local: Arc<dyn StoreClient>,
    /// Central catalogue.
    pub central: Arc<dyn StoreClient>,
    /// Admin token service, used for central calls only.
    pub tokens: Arc<dyn TokenProvider>,
    /// Resource server adapter API.
    pub resource_server: Arc<dyn ResourceServerClient>,
}

impl Backends {
    /// Store client for one side.
    pub fn store(&self, target: StoreTarget) -> &dyn StoreClient {
        match target {
            StoreTarget::Local => self.local.as_ref(),
            StoreTarget::Central => self.central.as_ref(),
        }
    }
}
