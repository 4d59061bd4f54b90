//! Database repository for users.

use crate::types::{UserId, abbrev_uuid};
use crate::{
    api::models::users::Role,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub active_only: bool,
}

impl UserFilter {
    /// Active trainers, the pool batches are staffed from.
    pub fn active_trainers() -> Self {
        Self {
            role: Some(Role::Trainer),
            active_only: true,
        }
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub refresh_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserDBResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: user.is_active,
            refresh_token_hash: user.refresh_token_hash,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

const USER_COLUMNS: &str = "id, full_name, email, password_hash, role, is_active, refresh_token_hash, created_at, updated_at";

pub struct Users<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(email = %request.email, role = ?request.role), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, email, password_hash, role, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(request.full_name.trim())
        .bind(request.email.trim().to_lowercase())
        .bind(&request.password_hash)
        .bind(request.role)
        .bind(request.is_active)
        .bind(now)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(user_id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(UserDBResponse::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<UserId>) -> Result<HashMap<Self::Id, UserDBResponse>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let users = query.build_query_as::<User>().fetch_all(&mut *self.db).await?;

        Ok(users.into_iter().map(|u| (u.id, UserDBResponse::from(u))).collect())
    }

    #[instrument(skip(self, filter), fields(role = ?filter.role, active_only = filter.active_only), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1 = 1"));
        if let Some(role) = filter.role {
            query.push(" AND role = ").push_bind(role);
        }
        if filter.active_only {
            query.push(" AND is_active = 1");
        }
        query.push(" ORDER BY full_name COLLATE NOCASE ASC, id ASC");

        let users = query.build_query_as::<User>().fetch_all(&mut *self.db).await?;

        Ok(users.into_iter().map(UserDBResponse::from).collect())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                full_name = COALESCE(?, full_name),
                password_hash = COALESCE(?, password_hash),
                role = COALESCE(?, role),
                is_active = COALESCE(?, is_active),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(request.full_name.as_deref().map(str::trim))
        .bind(request.password_hash.as_deref())
        .bind(request.role)
        .bind(request.is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Look up an account by email, ignoring case.
    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE"))
            .bind(email.trim().to_lowercase())
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(UserDBResponse::from))
    }

    /// Store (or with `None`, forget) the hash of the user's live refresh token.
    #[instrument(skip(self, hash), fields(user_id = %abbrev_uuid(&id), clearing = hash.is_none()), err)]
    pub async fn set_refresh_token_hash(&mut self, id: UserId, hash: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE users SET refresh_token_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestDb;

    fn request(full_name: &str, email: &str, role: Role) -> UserCreateDBRequest {
        UserCreateDBRequest {
            full_name: full_name.to_string(),
            email: email.to_string(),
            password_hash: "not-a-real-hash".to_string(),
            role,
            is_active: true,
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_create_user_normalizes_email() {
        let db = TestDb::new().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&request("  Asha Rao ", "Asha@Example.COM", Role::Trainer)).await.unwrap();

        assert_eq!(user.full_name, "Asha Rao");
        assert_eq!(user.email, "asha@example.com");
        assert_eq!(user.role, Role::Trainer);
        assert!(user.is_active);
        assert!(user.refresh_token_hash.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_duplicate_email_is_unique_violation() {
        let db = TestDb::new().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&request("First One", "dup@example.com", Role::Trainer)).await.unwrap();
        let err = repo.create(&request("Second One", "DUP@example.com", Role::Admin)).await.unwrap_err();

        match err {
            DbError::UniqueViolation { table, .. } => assert_eq!(table.as_deref(), Some("users")),
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_get_user_by_email_is_case_insensitive() {
        let db = TestDb::new().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&request("Ravi Kumar", "ravi@example.com", Role::Trainer)).await.unwrap();

        let found = repo.get_user_by_email("RAVI@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(repo.get_user_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_list_active_trainers_sorted_by_name() {
        let db = TestDb::new().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&request("Zara Trainer", "zara@example.com", Role::Trainer)).await.unwrap();
        repo.create(&request("Amit Trainer", "amit@example.com", Role::Trainer)).await.unwrap();
        repo.create(&request("Admin Person", "admin@example.com", Role::Admin)).await.unwrap();
        let inactive = repo.create(&request("Bela Trainer", "bela@example.com", Role::Trainer)).await.unwrap();
        repo.update(
            inactive.id,
            &UserUpdateDBRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let trainers = repo.list(&UserFilter::active_trainers()).await.unwrap();
        let names: Vec<_> = trainers.iter().map(|u| u.full_name.as_str()).collect();
        assert_eq!(names, vec!["Amit Trainer", "Zara Trainer"]);

        let everyone = repo.list(&UserFilter::default()).await.unwrap();
        assert_eq!(everyone.len(), 4);
    }

    #[test_log::test(tokio::test)]
    async fn test_get_bulk_and_missing_ids() {
        let db = TestDb::new().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let a = repo.create(&request("Trainer A", "a@example.com", Role::Trainer)).await.unwrap();
        let b = repo.create(&request("Trainer B", "b@example.com", Role::Trainer)).await.unwrap();

        let found = repo.get_bulk(vec![a.id, b.id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&a.id].email, "a@example.com");
        assert!(repo.get_bulk(vec![]).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_refresh_token_hash_set_and_clear() {
        let db = TestDb::new().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&request("Token Holder", "tokens@example.com", Role::Trainer)).await.unwrap();

        repo.set_refresh_token_hash(user.id, Some("hash-1")).await.unwrap();
        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("hash-1"));

        repo.set_refresh_token_hash(user.id, None).await.unwrap();
        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.refresh_token_hash.is_none());

        assert!(matches!(
            repo.set_refresh_token_hash(Uuid::new_v4(), None).await,
            Err(DbError::NotFound)
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_update_missing_user_is_not_found() {
        let db = TestDb::new().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let result = repo.update(Uuid::new_v4(), &UserUpdateDBRequest::default()).await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }
}
