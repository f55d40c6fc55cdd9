pub mod auth;
pub mod form;
pub mod health;
pub mod users;

pub use auth::{
    forgot_password, login, register, reset_password, reset_password_link, verify_email,
};
pub use health::{health_check, metrics_handler};
pub use users::{delete_user, edit_user};
