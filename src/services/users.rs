//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use validator::Validate;

use crate::{
    config::{AuthConfig, BootstrapAdmin},
    error::{AppError, AppResult, ErrorCode},
    models::user::{NewUser, RegisterUser, Role, UpdatePassword, User},
    repository::DynStore,
};

#[derive(Clone)]
pub struct UsersService {
    store: DynStore,
    argon2: Argon2<'static>,
}

impl UsersService {
    pub fn new(store: DynStore, config: &AuthConfig) -> AppResult<Self> {
        let params = Params::new(config.argon2_memory_kib, config.argon2_iterations, 1, None)
            .map_err(|e| AppError::Internal(format!("Invalid argon2 parameters: {}", e)))?;
        Ok(Self {
            store,
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Check a login/password pair within one role partition.
    ///
    /// Unknown handles and wrong passwords are distinct outcomes; both are
    /// reported as authentication failures.
    pub async fn authenticate(&self, login: &str, password: &str, role: Role) -> AppResult<User> {
        let user = self
            .store
            .find_user_by_login(login.trim(), role)
            .await?
            .ok_or_else(|| {
                AppError::Authentication(ErrorCode::UserNotFound, "Unknown login".to_string())
            })?;

        if !self.verify_password(&user.password, password)? {
            tracing::info!("Failed {} login for '{}'", role, user.login);
            return Err(AppError::Authentication(
                ErrorCode::BadCredentials,
                "Invalid login or password".to_string(),
            ));
        }

        Ok(user)
    }

    pub async fn authenticate_user(&self, login: &str, password: &str) -> AppResult<User> {
        self.authenticate(login, password, Role::User).await
    }

    pub async fn authenticate_admin(&self, login: &str, password: &str) -> AppResult<User> {
        self.authenticate(login, password, Role::Admin).await
    }

    /// Self-service registration; always creates a `user` role account
    pub async fn register(&self, request: RegisterUser) -> AppResult<User> {
        request.validate()?;

        let login = request.login.trim().to_string();
        if login.len() < 3 {
            return Err(AppError::Validation("Login must be 3 to 64 characters".to_string()));
        }

        let new_user = NewUser {
            login,
            password_hash: self.hash_password(&request.password)?,
            email: request.email,
            role: Role::User,
        };

        let mut tx = self.store.begin().await?;
        let user = tx.insert_user(&new_user).await?;
        tx.commit().await?;

        tracing::info!("Registered user '{}' (id {})", user.login, user.id);
        Ok(user)
    }

    /// Change the caller's password after checking the old one
    pub async fn update_password(&self, user_id: i32, request: UpdatePassword) -> AppResult<()> {
        request.validate()?;

        // Argon2 runs before the transaction; the stored hash must not have
        // changed in between.
        let user = self.get_by_id(user_id).await?;
        if !self.verify_password(&user.password, &request.old_password)? {
            return Err(bad_old_password());
        }
        let hash = self.hash_password(&request.new_password)?;

        let mut tx = self.store.begin().await?;
        let current = tx
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::user_not_found(user_id))?;
        if current.password != user.password {
            return Err(bad_old_password());
        }
        tx.update_password(user_id, &hash).await?;
        tx.commit().await?;

        tracing::info!("Password changed for user id {}", user_id);
        Ok(())
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::user_not_found(id))
    }

    /// Create the configured administrator unless an account with that login exists
    pub async fn ensure_admin(&self, admin: &BootstrapAdmin) -> AppResult<()> {
        if self
            .store
            .find_user_by_login(&admin.login, Role::Admin)
            .await?
            .is_some()
        {
            tracing::debug!("Administrator '{}' already exists", admin.login);
            return Ok(());
        }

        let new_user = NewUser {
            login: admin.login.trim().to_string(),
            password_hash: self.hash_password(&admin.password)?,
            email: admin.email.clone(),
            role: Role::Admin,
        };

        let mut tx = self.store.begin().await?;
        match tx.insert_user(&new_user).await {
            Ok(user) => {
                tx.commit().await?;
                tracing::info!("Created administrator '{}' (id {})", user.login, user.id);
                Ok(())
            }
            Err(AppError::Conflict(ErrorCode::DuplicateHandle, _)) => {
                tracing::warn!(
                    "Cannot create administrator '{}': login is taken by a user account",
                    admin.login
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Hash a password using Argon2id
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Check a password against a stored PHC hash. The parameters embedded in
    /// the hash win over the configured ones.
    pub fn verify_password(&self, hash: &str, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

fn bad_old_password() -> AppError {
    AppError::Authentication(
        ErrorCode::BadOldPassword,
        "Old password does not match".to_string(),
    )
}
