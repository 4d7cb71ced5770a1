//! Shared auth state handed to handlers through an `Extension`.

use std::sync::Arc;

use super::{config::AuthConfig, session::SessionManager};
use crate::supabase::IdentityProvider;

pub struct AuthState {
    config: AuthConfig,
    identity: Arc<dyn IdentityProvider>,
    sessions: SessionManager,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        let sessions = SessionManager::new(Arc::clone(&identity), config.cookies().clone());
        Self {
            config,
            identity,
            sessions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}
