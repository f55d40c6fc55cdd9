//! Account lifecycle operations
//!
//! Each operation is a short pipeline: validate, optionally hand an avatar to
//! the upload rendezvous, run storage units of work through the retryable
//! transaction, then mint a session token where the flow calls for one.
//! Mail delivery and avatar cleanup are detached onto the task executor and
//! never affect the response.
use resilience::with_deadline;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use validator::Validate;

use super::background::TaskExecutor;
use super::email::{MailTemplates, Mailer, OutgoingMail};
use super::uploads::{UploadRendezvous, UploadedFile};
use crate::db::{AccountStore, RetryableTransaction, StoreError};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    Account, EditInput, ForgotPasswordInput, LoginInput, NewAccount, NewNotification,
    RegisterInput, ResetPasswordInput,
};
use crate::security::{generate_account_token, Claims, PasswordHasher, TokenService};

/// Telemetry subject for flows keyed by an opaque token
const ANONYMOUS: &str = "anonymous";

/// A signed session together with the account it was issued for
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub account: Account,
}

pub struct AccountServiceDeps {
    pub store: Arc<dyn AccountStore>,
    pub transactions: RetryableTransaction,
    pub tokens: Arc<TokenService>,
    pub passwords: PasswordHasher,
    pub uploads: UploadRendezvous,
    pub mailer: Arc<dyn Mailer>,
    pub templates: MailTemplates,
    pub tasks: TaskExecutor,
    pub register_deadline: Duration,
}

pub struct AccountService {
    store: Arc<dyn AccountStore>,
    transactions: RetryableTransaction,
    tokens: Arc<TokenService>,
    passwords: PasswordHasher,
    uploads: UploadRendezvous,
    mailer: Arc<dyn Mailer>,
    templates: MailTemplates,
    tasks: TaskExecutor,
    register_deadline: Duration,
}

fn observe<T>(operation: &'static str, started: Instant, result: &Result<T>) {
    metrics::record_operation(operation, result.is_ok(), started.elapsed());
}

/// Token-keyed lookups report a miss as a bad link, not a missing user
fn token_lookup(error: StoreError) -> AppError {
    match error {
        StoreError::NotFound => AppError::Validation("Invalid or expired token".to_string()),
        other => other.into(),
    }
}

/// Only the account owner may modify an account
pub fn authorize(claims: &Claims, id: i64) -> Result<()> {
    if claims.account_id() == Some(id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You are not authorized to modify this account".to_string(),
        ))
    }
}

impl AccountService {
    pub fn new(deps: AccountServiceDeps) -> Self {
        Self {
            store: deps.store,
            transactions: deps.transactions,
            tokens: deps.tokens,
            passwords: deps.passwords,
            uploads: deps.uploads,
            mailer: deps.mailer,
            templates: deps.templates,
            tasks: deps.tasks,
            register_deadline: deps.register_deadline,
        }
    }

    /// Create an unverified account. The whole flow, avatar upload included,
    /// runs under the registration deadline.
    pub async fn register(
        &self,
        input: RegisterInput,
        avatar: Option<UploadedFile>,
    ) -> Result<Account> {
        let started = Instant::now();
        let result = self.create_account(input, avatar, started).await;
        observe("register", started, &result);
        result
    }

    async fn create_account(
        &self,
        input: RegisterInput,
        avatar: Option<UploadedFile>,
        started: Instant,
    ) -> Result<Account> {
        input.validate()?;

        // An upload cut short here is removed by the rendezvous worker
        let avatar = with_deadline(self.register_deadline, async {
            Ok::<_, AppError>(self.uploads.resolve(avatar).await?)
        })
        .await?;

        // From here on the avatar URL is ours: any failure, deadline included,
        // must discard it
        let remaining = self.register_deadline.saturating_sub(started.elapsed());
        let account = match with_deadline(remaining, self.persist_account(input, avatar.clone())).await
        {
            Ok(account) => account,
            Err(e) => {
                self.discard_avatar(avatar);
                return Err(e);
            }
        };

        info!(user_id = account.id, "Account registered");
        self.send_mail(
            "verification_email",
            self.templates.verification(&account.email, &account.token),
        );
        Ok(account)
    }

    async fn persist_account(&self, input: RegisterInput, avatar: String) -> Result<Account> {
        let password_digest = self.passwords.hash(&input.password).await?;

        let new_account = NewAccount {
            username: input.username,
            name: input.name,
            email: input.email,
            phone: input.phone,
            password_digest,
            bio: input.bio,
            website: input.website,
            avatar,
            language: input.language,
            privacy: input.privacy,
            token: generate_account_token(),
        };

        let account = self
            .transactions
            .execute("register", &new_account.email, || {
                self.store.create(&new_account)
            })
            .await?;
        Ok(account)
    }

    /// Mark the email behind `token` verified and open a session
    pub async fn verify_email(&self, token: &str) -> Result<Session> {
        let started = Instant::now();
        let result: Result<_> = async {
            let next_token = generate_account_token();
            let account = self
                .transactions
                .execute("verify_email", ANONYMOUS, || {
                    self.store.verify_email(token, &next_token)
                })
                .await
                .map_err(token_lookup)?;

            info!(user_id = account.id, "Email verified");
            self.open_session(account)
        }
        .await;
        observe("verify_email", started, &result);
        result
    }

    pub async fn login(&self, input: LoginInput) -> Result<Session> {
        let started = Instant::now();
        let result: Result<_> = async {
            input.validate()?;

            let account = self
                .transactions
                .execute("login", &input.email, || self.store.find_by_email(&input.email))
                .await?;

            if !self
                .passwords
                .verify(&input.password, &account.password_digest)
                .await?
            {
                return Err(AppError::Unauthenticated("Invalid credentials".to_string()));
            }
            if !account.email_verified {
                return Err(AppError::Forbidden(
                    "Email address has not been verified".to_string(),
                ));
            }

            self.open_session(account)
        }
        .await;
        observe("login", started, &result);
        result
    }

    /// Issue a reset link for `input.email`. Succeeds whether or not the
    /// address belongs to an account.
    pub async fn forgot_password(&self, input: ForgotPasswordInput) -> Result<()> {
        let started = Instant::now();
        let result: Result<_> = async {
            input.validate()?;

            let next_token = generate_account_token();
            let rotated = self
                .transactions
                .execute("forgot_password", &input.email, || {
                    self.store.rotate_token_by_email(&input.email, &next_token)
                })
                .await;

            match rotated {
                Ok(account) => self.send_mail(
                    "password_reset_email",
                    self.templates.password_reset(&account.email, &account.token),
                ),
                Err(StoreError::NotFound) => debug!("Password reset requested for unknown email"),
                Err(e) => warn!(error = %e, "Password reset lookup failed"),
            }
            Ok(())
        }
        .await;
        observe("forgot_password", started, &result);
        result
    }

    /// Consume a reset token and open a session, applying `new_password`
    /// when one is supplied.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: Option<ResetPasswordInput>,
    ) -> Result<Session> {
        let started = Instant::now();
        let result: Result<_> = async {
            let digest = match new_password {
                Some(input) => {
                    input.validate()?;
                    Some(self.passwords.hash(&input.password).await?)
                }
                None => None,
            };

            let next_token = generate_account_token();
            let account = self
                .transactions
                .execute("reset_password", ANONYMOUS, || {
                    self.store
                        .consume_token(token, &next_token, digest.as_deref())
                })
                .await
                .map_err(token_lookup)?;

            if digest.is_some() {
                info!(user_id = account.id, "Password reset");
                self.tokens.invalidate_subject(account.id).await;
            }
            self.open_session(account)
        }
        .await;
        observe("reset_password", started, &result);
        result
    }

    /// Partial profile update by the account owner
    pub async fn edit_user(
        &self,
        claims: &Claims,
        id: i64,
        input: EditInput,
        avatar: Option<UploadedFile>,
    ) -> Result<Account> {
        let started = Instant::now();
        let result = self.apply_edit(claims, id, input, avatar).await;
        observe("edit_user", started, &result);
        result
    }

    async fn apply_edit(
        &self,
        claims: &Claims,
        id: i64,
        input: EditInput,
        avatar: Option<UploadedFile>,
    ) -> Result<Account> {
        authorize(claims, id)?;
        let input = input.normalized();
        input.validate()?;

        let subject = id.to_string();
        let mut account = self
            .transactions
            .execute("edit_user", &subject, || self.store.find_by_id(id))
            .await?;

        let password_digest = match &input.password {
            Some(password) => Some(self.passwords.hash(password).await?),
            None => None,
        };
        let new_avatar = match avatar {
            Some(file) => Some(self.uploads.submit(file).await?),
            None => None,
        };
        let previous_avatar = account.avatar.clone();

        if let Some(name) = input.name {
            account.name = name;
        }
        if let Some(email) = input.email {
            account.email = email;
        }
        if let Some(bio) = input.bio {
            account.bio = bio;
        }
        if let Some(website) = input.website {
            account.website = Some(website);
        }
        if let Some(phone) = input.phone {
            account.phone = phone;
        }
        if let Some(language) = input.language {
            account.language = language;
        }
        if let Some(privacy) = input.privacy {
            account.privacy = privacy;
        }
        if let Some(digest) = &password_digest {
            account.password_digest = digest.clone();
        }
        if let Some(url) = &new_avatar {
            account.avatar = url.clone();
        }

        let updated = match self
            .transactions
            .execute("edit_user", &subject, || self.store.update(&account))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(url) = new_avatar {
                    self.discard_avatar(url);
                }
                return Err(e.into());
            }
        };

        if new_avatar.is_some() {
            self.discard_avatar(previous_avatar);
        }
        if password_digest.is_some() {
            self.tokens.invalidate_subject(id).await;
        }

        info!(user_id = id, "Account updated");
        Ok(updated)
    }

    /// Remove the caller's account and everything it owns
    pub async fn delete_user(&self, claims: &Claims, id: i64) -> Result<()> {
        let started = Instant::now();
        let result: Result<_> = async {
            authorize(claims, id)?;

            let subject = id.to_string();
            let account = self
                .transactions
                .execute("delete_user", &subject, || self.store.find_by_id(id))
                .await?;

            let notice = NewNotification::account_deletion(&account);
            self.transactions
                .execute("delete_user", &subject, || {
                    self.store.delete_with_cascade(id, &notice)
                })
                .await?;

            self.tokens.invalidate_subject(id).await;
            self.discard_avatar(account.avatar);

            info!(user_id = id, "Account deleted");
            Ok(())
        }
        .await;
        observe("delete_user", started, &result);
        result
    }

    fn open_session(&self, account: Account) -> Result<Session> {
        let token = self.tokens.issue(&account)?;
        Ok(Session { token, account })
    }

    fn send_mail(&self, task: &'static str, mail: OutgoingMail) {
        let mailer = self.mailer.clone();
        self.tasks.spawn(task, async move { mailer.send(mail).await });
    }

    /// Best-effort removal of an avatar nothing references any more
    fn discard_avatar(&self, url: String) {
        if url.is_empty() || self.uploads.is_default(&url) {
            return;
        }

        let store = self.uploads.store();
        self.tasks.spawn("avatar_cleanup", async move {
            store.delete(&url).await?;
            Ok(())
        });
    }
}
