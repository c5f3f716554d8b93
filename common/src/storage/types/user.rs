use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use async_trait::async_trait;
use axum_session_auth::Authentication;
use surrealdb::{engine::any::Any, Surreal};
use uuid::Uuid;

/// The single administrative principal backing the password login.
pub const ADMIN_USERNAME: &str = "admin";

stored_object!(User, "user", {
    username: String,
    password: String,
    anonymous: bool,
    admin: bool
});

#[async_trait]
impl Authentication<User, String, Surreal<Any>> for User {
    async fn load_user(userid: String, db: Option<&Surreal<Any>>) -> Result<User, anyhow::Error> {
        let db = db.ok_or_else(|| anyhow::anyhow!("no database handle for session auth"))?;
        let user: Option<User> = db.select((Self::table_name(), userid.as_str())).await?;
        user.ok_or_else(|| anyhow::anyhow!("session user {userid} not found"))
    }

    fn is_authenticated(&self) -> bool {
        !self.anonymous
    }

    fn is_active(&self) -> bool {
        !self.anonymous
    }

    fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

impl User {
    /// Create the admin user at boot, or refresh its password when the
    /// configured one changed. Idempotent.
    pub async fn ensure_admin(password: &str, db: &SurrealDbClient) -> Result<User, AppError> {
        if let Some(existing) = Self::find_by_username(ADMIN_USERNAME, db).await? {
            db.client
                .query(
                    "UPDATE type::thing('user', $id) SET
                         password = crypto::argon2::generate($password),
                         updated_at = time::now()",
                )
                .bind(("id", existing.id.clone()))
                .bind(("password", password.to_owned()))
                .await?
                .check()?;
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        let user: Option<User> = db
            .client
            .query(
                "CREATE type::thing('user', $id) SET
                     username = $username,
                     password = crypto::argon2::generate($password),
                     admin = true,
                     anonymous = false,
                     created_at = time::now(),
                     updated_at = time::now()",
            )
            .bind(("id", id))
            .bind(("username", ADMIN_USERNAME.to_owned()))
            .bind(("password", password.to_owned()))
            .await?
            .take(0)?;

        user.ok_or(AppError::Auth("Admin user failed to create".into()))
    }

    pub async fn authenticate(
        username: &str,
        password: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let user: Option<User> = db
            .client
            .query(
                "SELECT * FROM user
                WHERE username = $username
                AND crypto::argon2::compare(password, $password)",
            )
            .bind(("username", username.to_owned()))
            .bind(("password", password.to_owned()))
            .await?
            .take(0)?;
        user.ok_or(AppError::Auth("Invalid credentials".into()))
    }

    pub async fn find_by_username(
        username: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let user: Option<User> = db
            .client
            .query("SELECT * FROM user WHERE username = $username LIMIT 1")
            .bind(("username", username.to_string()))
            .await?
            .take(0)?;

        Ok(user)
    }
}
