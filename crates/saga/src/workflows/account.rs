//! Account sign-up, sessions, profile and avatar edits, and deletion.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::Utc;
use common::AccountId;
use domain::media;
use domain::{Account, BlobPath, MediaKind, ProfilePatch, SessionToken};
use store::StoreError;

use super::garment::{delete_replaced_blob, register_blob_delete};
use super::{ImageUpload, Workflows, observe};
use crate::context::WorkflowContext;
use crate::error::{SagaError, WorkflowError};

/// Minimum accepted password length in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hashes a password with Argon2id and a random salt into a PHC string.
pub fn hash_password(password: &str) -> Result<String, SagaError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SagaError::PasswordHash(e.to_string()))
}

/// Checks a password against a stored PHC string.
///
/// `Ok(false)` means the password does not match; `Err` means the stored hash
/// is unusable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, SagaError> {
    let parsed = PasswordHash::new(hash).map_err(|e| SagaError::PasswordHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(SagaError::PasswordHash(e.to_string())),
    }
}

/// Input of [`Workflows::sign_up`].
#[derive(Debug, Clone)]
pub struct SignUp {
    pub login: String,
    pub nickname: String,
    pub password: String,
    pub name: String,
    pub description: String,
}

impl SignUp {
    fn validate(&self) -> Result<(), SagaError> {
        if self.login.trim().is_empty() || !self.login.contains('@') {
            return Err(SagaError::Validation("login must be an e-mail address".to_string()));
        }
        if self.nickname.trim().is_empty() {
            return Err(SagaError::Validation("nickname is required".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SagaError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        Ok(())
    }
}

impl Workflows {
    /// Registers a new account and opens its first session.
    #[tracing::instrument(skip(self, ctx, request), fields(trace_id = %ctx.trace_id(), login = %request.login))]
    pub async fn sign_up(
        &self,
        ctx: &mut WorkflowContext,
        request: SignUp,
    ) -> Result<(Account, SessionToken), WorkflowError> {
        observe("sign_up", async {
            let a = &self.adapters;
            ctx.check(request.validate()).await?;

            let existing = ctx
                .step(
                    a.accounts
                        .find_account_by_login_or_nickname(&request.login, &request.nickname),
                )
                .await?;
            if existing.is_some() {
                return Err(ctx
                    .fail(SagaError::Conflict(
                        "login or nickname already taken".to_string(),
                    ))
                    .await);
            }

            let token = self.open_session(ctx, &request.login).await?;
            let password_hash = ctx.check(hash_password(&request.password)).await?;

            let account = Account {
                id: AccountId::new(),
                login: request.login,
                nickname: request.nickname,
                password_hash,
                name: request.name,
                description: request.description,
                avatar_path: None,
                created_at: Utc::now(),
            };
            ctx.commit(a.accounts.insert_account(&account)).await?;

            tracing::info!(account_id = %account.id, "Account created");
            Ok((account, token))
        })
        .await
    }

    /// Opens a session for valid credentials.
    ///
    /// Unknown logins and wrong passwords are both reported as `Forbidden`.
    #[tracing::instrument(skip(self, ctx, password), fields(trace_id = %ctx.trace_id()))]
    pub async fn login(
        &self,
        ctx: &mut WorkflowContext,
        login: &str,
        password: &str,
    ) -> Result<(Account, SessionToken), WorkflowError> {
        observe("login", async {
            let token = self.open_session(ctx, login).await?;

            let account = ctx
                .step(self.adapters.accounts.find_account_by_login(login))
                .await?;
            let Some(account) = account else {
                return Err(ctx.fail(invalid_credentials()).await);
            };
            if !ctx.check(verify_password(password, &account.password_hash)).await? {
                return Err(ctx.fail(invalid_credentials()).await);
            }

            Ok((account, token))
        })
        .await
    }

    /// Ends a session. Unknown tokens are reported as `NotFound`.
    pub async fn logout(
        &self,
        ctx: &mut WorkflowContext,
        token: &SessionToken,
    ) -> Result<(), WorkflowError> {
        ctx.commit(self.adapters.sessions.remove(token)).await
    }

    /// Deletes the caller's account and ends the session it used.
    ///
    /// If the row deletion fails the same token is put back with a fresh expiry.
    /// An uploaded avatar file is deleted last.
    #[tracing::instrument(skip(self, ctx, caller, token), fields(trace_id = %ctx.trace_id(), account_id = %caller.id))]
    pub async fn delete_account(
        &self,
        ctx: &mut WorkflowContext,
        caller: &Account,
        token: &SessionToken,
    ) -> Result<Account, WorkflowError> {
        observe("delete_account", async {
            let a = &self.adapters;

            ctx.commit(a.sessions.remove(token)).await?;
            {
                let sessions = a.sessions.clone();
                let token = token.clone();
                let login = caller.login.clone();
                let ttl = self.settings.session_ttl;
                ctx.register(format!("restore session of {login}"), move || async move {
                    sessions.put(&token, &login, ttl).await.map_err(SagaError::from)
                });
            }

            let row = ctx.commit(a.accounts.delete_account(caller.id)).await?;
            if let Some(avatar) = &row.avatar_path {
                {
                    let accounts = a.accounts.clone();
                    let row = row.clone();
                    ctx.register(format!("restore account row {}", row.id), move || async move {
                        accounts.insert_account(&row).await.map_err(SagaError::from)
                    });
                }
                delete_replaced_blob(ctx, self, "avatar", avatar).await?;
            }

            tracing::info!(account_id = %row.id, "Account deleted");
            Ok(row)
        })
        .await
    }

    /// Applies profile edits to the caller's account.
    #[tracing::instrument(skip(self, ctx, caller, patch), fields(trace_id = %ctx.trace_id(), account_id = %caller.id))]
    pub async fn update_profile(
        &self,
        ctx: &mut WorkflowContext,
        caller: &Account,
        patch: ProfilePatch,
    ) -> Result<Account, WorkflowError> {
        observe("update_profile", async {
            let a = &self.adapters;

            if let Some(nickname) = &patch.nickname {
                if nickname.trim().is_empty() {
                    return Err(ctx
                        .fail(SagaError::Validation("nickname is required".to_string()))
                        .await);
                }
                let holder = ctx.step(a.accounts.find_account_by_nickname(nickname)).await?;
                if holder.is_some_and(|other| other.id != caller.id) {
                    return Err(ctx
                        .fail(SagaError::Conflict("nickname already taken".to_string()))
                        .await);
                }
            }

            self.replace_account_row(ctx, caller, caller.patched(&patch)).await
        })
        .await
    }

    /// Replaces the caller's avatar with an uploaded image.
    ///
    /// The new file is written and the row updated before the old file is
    /// deleted. That delete is irreversible, so it runs last.
    #[tracing::instrument(skip(self, ctx, caller, image), fields(trace_id = %ctx.trace_id(), account_id = %caller.id))]
    pub async fn update_avatar(
        &self,
        ctx: &mut WorkflowContext,
        caller: &Account,
        image: ImageUpload,
    ) -> Result<Account, WorkflowError> {
        observe("update_avatar", async {
            let ext = ctx.check(media::validate_image_name(&image.file_name)).await?;
            ctx.check(media::validate_size(image.bytes.len(), self.settings.max_upload_bytes))
                .await?;

            let path = BlobPath::join(
                MediaKind::Avatars,
                &media::account_folder(&caller.login),
                &media::generate_file_name("avatar", &ext, Utc::now()),
            );
            ctx.commit(self.adapters.blobs.write(&path, &image.bytes)).await?;
            register_blob_delete(ctx, self, "avatar", path.clone());

            let next = Account {
                avatar_path: Some(path),
                ..caller.clone()
            };
            let updated = self.replace_account_row(ctx, caller, next).await?;

            if let Some(old) = &caller.avatar_path {
                delete_replaced_blob(ctx, self, "avatar", old).await?;
            }
            tracing::info!("Avatar updated");
            Ok(updated)
        })
        .await
    }

    /// Resets the caller's avatar to the default one and deletes the uploaded file.
    #[tracing::instrument(skip(self, ctx, caller), fields(trace_id = %ctx.trace_id(), account_id = %caller.id))]
    pub async fn delete_avatar(
        &self,
        ctx: &mut WorkflowContext,
        caller: &Account,
    ) -> Result<Account, WorkflowError> {
        observe("delete_avatar", async {
            let Some(old) = &caller.avatar_path else {
                return Ok(caller.clone());
            };

            let next = Account {
                avatar_path: None,
                ..caller.clone()
            };
            let updated = self.replace_account_row(ctx, caller, next).await?;
            delete_replaced_blob(ctx, self, "avatar", old).await?;
            Ok(updated)
        })
        .await
    }

    /// Public profile lookup.
    pub async fn get_account_by_nickname(
        &self,
        ctx: &mut WorkflowContext,
        nickname: &str,
    ) -> Result<Account, WorkflowError> {
        match ctx
            .step(self.adapters.accounts.find_account_by_nickname(nickname))
            .await?
        {
            Some(account) => Ok(account),
            None => Err(ctx.fail(StoreError::not_found("account", nickname)).await),
        }
    }

    /// Writes `next` over the caller's row and registers restoring `previous`.
    async fn replace_account_row(
        &self,
        ctx: &mut WorkflowContext,
        previous: &Account,
        next: Account,
    ) -> Result<Account, WorkflowError> {
        let accounts = self.adapters.accounts.clone();
        let updated = ctx.commit(accounts.update_account(&next)).await?;

        let previous = previous.clone();
        ctx.register(format!("restore account row {}", previous.id), move || async move {
            accounts.update_account(&previous).await.map(|_| ()).map_err(SagaError::from)
        });
        Ok(updated)
    }

    /// Resolves the account behind a live session token.
    pub async fn current_account(
        &self,
        ctx: &mut WorkflowContext,
        token: &SessionToken,
    ) -> Result<Account, WorkflowError> {
        let a = &self.adapters;
        let Some(login) = ctx.step(a.sessions.get(token)).await? else {
            return Err(ctx
                .fail(SagaError::Forbidden("not authorized".to_string()))
                .await);
        };
        match ctx.step(a.accounts.find_account_by_login(&login)).await? {
            Some(account) => Ok(account),
            None => Err(ctx.fail(StoreError::not_found("account", login)).await),
        }
    }

    /// Stores a fresh token for `login` and registers its removal.
    async fn open_session(
        &self,
        ctx: &mut WorkflowContext,
        login: &str,
    ) -> Result<SessionToken, WorkflowError> {
        let sessions = self.adapters.sessions.clone();
        let token = SessionToken::generate();

        ctx.commit(sessions.put(&token, login, self.settings.session_ttl))
            .await?;
        {
            let token = token.clone();
            ctx.register(format!("remove session token of {login}"), move || async move {
                sessions.remove(&token).await.map_err(SagaError::from)
            });
        }
        Ok(token)
    }
}

fn invalid_credentials() -> SagaError {
    SagaError::Forbidden("invalid login or password".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-horse", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("x", "not-a-phc-string"),
            Err(SagaError::PasswordHash(_))
        ));
    }

    #[test]
    fn test_sign_up_validation() {
        let valid = SignUp {
            login: "a@example.com".to_string(),
            nickname: "a".to_string(),
            password: "long-enough".to_string(),
            name: String::new(),
            description: String::new(),
        };
        assert!(valid.validate().is_ok());

        let bad_login = SignUp {
            login: "nope".to_string(),
            ..valid.clone()
        };
        assert!(matches!(bad_login.validate(), Err(SagaError::Validation(_))));

        let short_password = SignUp {
            password: "short".to_string(),
            ..valid
        };
        assert!(matches!(short_password.validate(), Err(SagaError::Validation(_))));
    }
}
