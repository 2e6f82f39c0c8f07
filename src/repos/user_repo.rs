/*
 * Responsibility
 * - SQLx operations on the users / user_refresh_tokens tables
 * - UserStore trait so services and handlers can run against an in-memory store in tests
 * - Every mutation is a single statement (no read-modify-write in application memory)
 */
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use crate::domain::{AccountStatus, GroupMembership, LocalUser, NewUser};
use crate::repos::error::{RepoError, RepoResult};

/// A refresh token lookup hit: the owner plus that token's expiry.
#[derive(Debug, Clone)]
pub struct RefreshTokenMatch {
    pub user: LocalUser,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<LocalUser>>;

    async fn find_by_linked_email(&self, email: &str) -> RepoResult<Option<LocalUser>>;

    /// Look up the user owning a refresh token, by the token's SHA-256 hash.
    async fn find_by_refresh_token(&self, token_hash: &[u8]) -> RepoResult<Option<RefreshTokenMatch>>;

    /// Append a refresh token. Existing tokens of the user are kept.
    async fn push_refresh_token(
        &self,
        user_id: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()>;

    /// Remove one refresh token of one user. Returns the number of rows removed.
    async fn remove_refresh_token(&self, user_id: &str, token_hash: &[u8]) -> RepoResult<u64>;

    /// Insert a new user. Duplicate id or linked email yields `RepoError::Conflict`.
    async fn create(&self, user: &NewUser) -> RepoResult<LocalUser>;

    async fn delete(&self, id: &str) -> RepoResult<bool>;
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    role: Vec<String>,
    username: String,
    linked_email: String,
    fullname: Option<String>,
    status: String,
    organization: String,
    groups: Json<Vec<GroupMembership>>,
}

#[derive(Debug, FromRow)]
struct RefreshTokenRow {
    #[sqlx(flatten)]
    user: UserRow,
    expires_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for LocalUser {
    type Error = RepoError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AccountStatus>()
            .map_err(RepoError::Corrupt)?;

        Ok(LocalUser {
            id: row.id,
            role: row.role,
            username: row.username,
            linked_email: row.linked_email,
            fullname: row.fullname,
            status,
            organization: row.organization,
            groups: row.groups.0,
        })
    }
}

const USER_COLUMNS: &str = "u.id, u.role, u.username, u.linked_email, u.fullname, u.status, u.organization, u.groups";

#[derive(Clone, Debug)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserRepo {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<LocalUser>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(LocalUser::try_from).transpose()
    }

    async fn find_by_linked_email(&self, email: &str) -> RepoResult<Option<LocalUser>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.linked_email = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        row.map(LocalUser::try_from).transpose()
    }

    async fn find_by_refresh_token(&self, token_hash: &[u8]) -> RepoResult<Option<RefreshTokenMatch>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}, t.expires_at
            FROM user_refresh_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.token_hash = $1
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, RefreshTokenRow>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.db)
            .await?;

        row.map(|r| {
            Ok(RefreshTokenMatch {
                user: LocalUser::try_from(r.user)?,
                expires_at: r.expires_at,
            })
        })
        .transpose()
    }

    async fn push_refresh_token(
        &self,
        user_id: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(RepoError::from_sqlx)?;

        Ok(())
    }

    async fn remove_refresh_token(&self, user_id: &str, token_hash: &[u8]) -> RepoResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_refresh_tokens
            WHERE user_id = $1 AND token_hash = $2
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn create(&self, user: &NewUser) -> RepoResult<LocalUser> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, username, linked_email, fullname, role, status, organization, groups, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, 'active', $6, '[]'::jsonb, $7, $7)
            RETURNING id, role, username, linked_email, fullname, status, organization, groups
            "#,
        )
        .bind(user.id())
        .bind(&user.username)
        .bind(&user.linked_email)
        .bind(user.fullname.as_deref())
        .bind(&user.role)
        .bind(&user.organization)
        .bind(&user.created_by)
        .fetch_one(&self.db)
        .await
        .map_err(RepoError::from_sqlx)?;

        LocalUser::try_from(row)
    }

    async fn delete(&self, id: &str) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
