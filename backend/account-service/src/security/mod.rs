/// Security utilities
pub mod password;
pub mod tokens;

pub use password::PasswordHasher;
pub use tokens::{Claims, TokenError, TokenService};

use rand::distributions::Alphanumeric;
use rand::Rng;

const ACCOUNT_TOKEN_LEN: usize = 48;

/// Fresh single-use verification/reset token
pub fn generate_account_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ACCOUNT_TOKEN_LEN)
        .map(char::from)
        .collect()
}
