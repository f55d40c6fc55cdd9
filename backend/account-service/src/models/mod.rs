mod account;
mod notification;
pub mod requests;

pub use account::{Account, AccountView, NewAccount, ProfileSummary};
pub use notification::{NewNotification, ACCOUNT_DELETION};
pub use requests::{EditInput, ForgotPasswordInput, LoginInput, RegisterInput, ResetPasswordInput};
