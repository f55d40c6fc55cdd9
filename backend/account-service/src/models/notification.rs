use super::Account;

pub const ACCOUNT_DELETION: &str = "account_deletion";

/// Notification row written alongside an account deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub kind: String,
    pub context: String,
    pub priority: i32,
    pub group_id: String,
    pub read: bool,
}

impl NewNotification {
    /// Announcement that `account` deleted itself. Fan-out to followers is left
    /// to the notification subsystem, so the record addresses the account itself.
    pub fn account_deletion(account: &Account) -> Self {
        NewNotification {
            from_user_id: account.id,
            to_user_id: account.id,
            kind: ACCOUNT_DELETION.to_string(),
            context: format!("{} has deleted their account", account.username),
            priority: 1,
            group_id: format!("deletion_{}", account.id),
            read: false,
        }
    }
}
