//! Database repository for training batches and their trainer assignments.

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::batches::{
            AssignedTrainer, BatchCreateDBRequest, BatchDBResponse, BatchScope, BatchUpdateDBRequest, CredentialsChange, LabCredentials,
            ScheduledSlot,
        },
    },
    schedule::window::TimeWindow,
    types::{BatchId, UserId, abbrev_uuid},
};
use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing batches
#[derive(Debug, Clone)]
pub struct BatchFilter {
    pub scope: BatchScope,
}

impl BatchFilter {
    pub fn new(scope: BatchScope) -> Self {
        Self { scope }
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Batch {
    pub id: BatchId,
    pub batch_name: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_cancelled: bool,
    pub lab_login_url: Option<String>,
    pub lab_username: Option<String>,
    pub lab_password: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct TrainerAssignment {
    pub batch_id: BatchId,
    pub id: UserId,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, FromRow)]
struct SlotRow {
    pub batch_id: BatchId,
    pub trainer_id: UserId,
    pub trainer_name: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl From<(Vec<AssignedTrainer>, Batch)> for BatchDBResponse {
    fn from((trainers, batch): (Vec<AssignedTrainer>, Batch)) -> Self {
        let lab_credentials = match (batch.lab_login_url, batch.lab_username, batch.lab_password) {
            (Some(login_url), Some(username), Some(password)) => Some(LabCredentials {
                login_url,
                username,
                password,
            }),
            _ => None,
        };

        Self {
            id: batch.id,
            batch_name: batch.batch_name,
            trainers,
            start_at: batch.start_at,
            end_at: batch.end_at,
            is_cancelled: batch.is_cancelled,
            lab_credentials,
            created_by: batch.created_by,
            created_at: batch.created_at,
            updated_at: batch.updated_at,
        }
    }
}

const BATCH_COLUMNS: &str = "id, batch_name, start_at, end_at, is_cancelled, lab_login_url, lab_username, lab_password, created_by, created_at, updated_at";

pub struct Batches<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Batches<'c> {
    type CreateRequest = BatchCreateDBRequest;
    type UpdateRequest = BatchUpdateDBRequest;
    type Response = BatchDBResponse;
    type Id = BatchId;
    type Filter = BatchFilter;

    #[instrument(skip(self, request), fields(batch_name = %request.batch_name, trainers = request.trainer_ids.len()), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let batch_id = Uuid::new_v4();
        let now = Utc::now();
        let (login_url, username, password) = match &request.lab_credentials {
            Some(c) => (Some(c.login_url.as_str()), Some(c.username.as_str()), Some(c.password.as_str())),
            None => (None, None, None),
        };

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO batches (id, batch_name, start_at, end_at, is_cancelled, lab_login_url, lab_username, lab_password, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch_id)
        .bind(&request.batch_name)
        .bind(request.start_at)
        .bind(request.end_at)
        .bind(login_url)
        .bind(username)
        .bind(password)
        .bind(request.created_by)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_trainers(&mut tx, batch_id, &request.trainer_ids).await?;

        tx.commit().await?;

        self.get_by_id(batch_id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(batch_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let batch = sqlx::query_as::<_, Batch>(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        match batch {
            Some(batch) => Ok(self.with_trainers(vec![batch]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<BatchId>) -> Result<HashMap<Self::Id, BatchDBResponse>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let batches = query.build_query_as::<Batch>().fetch_all(&mut *self.db).await?;
        let batches = self.with_trainers(batches).await?;

        Ok(batches.into_iter().map(|b| (b.id, b)).collect())
    }

    #[instrument(skip(self, filter), fields(scope = ?filter.scope), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {BATCH_COLUMNS} FROM batches"));
        if let BatchScope::AssignedTo(trainer_id) = filter.scope {
            query
                .push(" WHERE id IN (SELECT batch_id FROM batch_trainers WHERE trainer_id = ")
                .push_bind(trainer_id)
                .push(")");
        }
        query.push(" ORDER BY start_at ASC, id ASC");

        let batches = query.build_query_as::<Batch>().fetch_all(&mut *self.db).await?;

        self.with_trainers(batches).await
    }

    #[instrument(skip(self), fields(batch_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        // batch_trainers rows go with the batch (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM batches WHERE id = ?").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(batch_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE batches SET batch_name = COALESCE(");
        query
            .push_bind(request.batch_name.as_deref())
            .push(", batch_name), start_at = COALESCE(")
            .push_bind(request.start_at)
            .push(", start_at), end_at = COALESCE(")
            .push_bind(request.end_at)
            .push(", end_at)");
        match &request.lab_credentials {
            CredentialsChange::Keep => {}
            CredentialsChange::Set(credentials) => {
                query
                    .push(", lab_login_url = ")
                    .push_bind(credentials.login_url.clone())
                    .push(", lab_username = ")
                    .push_bind(credentials.username.clone())
                    .push(", lab_password = ")
                    .push_bind(credentials.password.clone());
            }
            CredentialsChange::Clear => {
                query.push(", lab_login_url = NULL, lab_username = NULL, lab_password = NULL");
            }
        }
        query.push(", updated_at = ").push_bind(Utc::now());
        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        if let Some(trainer_ids) = &request.trainer_ids {
            sqlx::query("DELETE FROM batch_trainers WHERE batch_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_trainers(&mut tx, id, trainer_ids).await?;
        }

        tx.commit().await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Batches<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Soft-cancel a batch. Cancelling an already cancelled batch leaves it untouched.
    ///
    /// Returns `None` when no batch has this id.
    #[instrument(skip(self), fields(batch_id = %abbrev_uuid(&id)), err)]
    pub async fn cancel(&mut self, id: BatchId) -> Result<Option<BatchDBResponse>> {
        sqlx::query("UPDATE batches SET is_cancelled = 1, updated_at = ? WHERE id = ? AND is_cancelled = 0")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        self.get_by_id(id).await
    }

    /// Bookings of the given trainers in non-cancelled batches whose window intersects `window`.
    ///
    /// The SQL range test is a prefilter; callers decide conflicts with [`TimeWindow::overlaps`].
    #[instrument(skip(self, trainer_ids), fields(trainers = trainer_ids.len(), exclude = ?exclude.map(|id| abbrev_uuid(&id))), err)]
    pub async fn scheduled_slots(&mut self, trainer_ids: &[UserId], window: TimeWindow, exclude: Option<BatchId>) -> Result<Vec<ScheduledSlot>> {
        if trainer_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT b.id AS batch_id, bt.trainer_id, u.full_name AS trainer_name, b.start_at, b.end_at
            FROM batch_trainers bt
            JOIN batches b ON b.id = bt.batch_id
            JOIN users u ON u.id = bt.trainer_id
            WHERE b.is_cancelled = 0 AND bt.trainer_id IN ("#,
        );
        let mut separated = query.separated(", ");
        for id in trainer_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        query.push(" AND b.start_at < ").push_bind(window.end_at);
        query.push(" AND b.end_at > ").push_bind(window.start_at);
        if let Some(exclude) = exclude {
            query.push(" AND b.id != ").push_bind(exclude);
        }
        query.push(" ORDER BY b.start_at ASC, b.id ASC, bt.position ASC");

        let rows = query.build_query_as::<SlotRow>().fetch_all(&mut *self.db).await?;

        Ok(rows
            .into_iter()
            .map(|row| ScheduledSlot {
                batch_id: row.batch_id,
                trainer_id: row.trainer_id,
                trainer_name: row.trainer_name,
                window: TimeWindow::new(row.start_at, row.end_at),
            })
            .collect())
    }

    /// Attach assigned trainers (in position order) to each batch, preserving batch order.
    async fn with_trainers(&mut self, batches: Vec<Batch>) -> Result<Vec<BatchDBResponse>> {
        if batches.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT bt.batch_id, u.id, u.full_name, u.email
            FROM batch_trainers bt
            JOIN users u ON u.id = bt.trainer_id
            WHERE bt.batch_id IN ("#,
        );
        let mut separated = query.separated(", ");
        for batch in &batches {
            separated.push_bind(batch.id);
        }
        separated.push_unseparated(") ORDER BY bt.batch_id, bt.position ASC");

        let assignments = query.build_query_as::<TrainerAssignment>().fetch_all(&mut *self.db).await?;

        let mut by_batch: HashMap<BatchId, Vec<AssignedTrainer>> = HashMap::new();
        for a in assignments {
            by_batch.entry(a.batch_id).or_default().push(AssignedTrainer {
                id: a.id,
                full_name: a.full_name,
                email: a.email,
            });
        }

        Ok(batches
            .into_iter()
            .map(|batch| {
                let trainers = by_batch.remove(&batch.id).unwrap_or_default();
                BatchDBResponse::from((trainers, batch))
            })
            .collect())
    }
}

async fn insert_trainers(conn: &mut SqliteConnection, batch_id: BatchId, trainer_ids: &[UserId]) -> Result<()> {
    for (position, trainer_id) in trainer_ids.iter().enumerate() {
        sqlx::query("INSERT INTO batch_trainers (batch_id, trainer_id, position) VALUES (?, ?, ?)")
            .bind(batch_id)
            .bind(trainer_id)
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
