use std::sync::Arc;

use crate::db::AccountStore;
use crate::security::TokenService;
use crate::services::AccountService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub tokens: Arc<TokenService>,
    pub store: Arc<dyn AccountStore>,
    /// Hard cap applied while reading avatar parts off the wire
    pub max_avatar_bytes: usize,
}
