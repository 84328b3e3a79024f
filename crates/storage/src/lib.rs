use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, Row, SqlitePool};
use thiserror::Error;

use linehook_core::MESSAGES_COLLECTION;

/// SQLite extended result codes raised when a key already exists.
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Top-level database handle that owns the SQLite connection pool.
///
/// Cloning is cheap and clones share the pool, so one handle can be handed to
/// every concurrent write.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle on the collection message records are written to.
    pub fn messages(&self) -> DocumentRepository {
        self.collection(MESSAGES_COLLECTION)
    }

    /// Returns a handle on an arbitrary document collection.
    pub fn collection(&self, name: &'static str) -> DocumentRepository {
        DocumentRepository {
            pool: self.pool.clone(),
            collection: name,
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

/// Repository over one named collection of JSON documents keyed by id.
#[derive(Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
    collection: &'static str,
}

impl DocumentRepository {
    pub fn collection(&self) -> &'static str {
        self.collection
    }

    /// Creates the document `id`. Fails with [`DocumentError::AlreadyExists`]
    /// when a document with that id is already present; nothing is overwritten.
    pub async fn create<T: Serialize>(
        &self,
        id: &str,
        data: &T,
    ) -> Result<WriteResult, DocumentError> {
        let data_json = serde_json::to_string(data).map_err(DocumentError::Encode)?;
        let update_time = Utc::now();

        let result = sqlx::query(
            "INSERT INTO documents (collection, id, data_json, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(self.collection)
        .bind(id)
        .bind(&data_json)
        .bind(to_rfc3339(update_time))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(WriteResult { update_time }),
            Err(sqlx::Error::Database(db_err)) => {
                if let Some(code) = db_err.code() {
                    if code == Cow::Borrowed(SQLITE_CONSTRAINT_PRIMARYKEY)
                        || code == Cow::Borrowed(SQLITE_CONSTRAINT_UNIQUE)
                    {
                        return Err(DocumentError::AlreadyExists {
                            collection: self.collection,
                            id: id.to_string(),
                        });
                    }
                }

                Err(DocumentError::Database(sqlx::Error::Database(db_err)))
            }
            Err(err) => Err(DocumentError::Database(err)),
        }
    }

    /// Loads the document `id`, if present.
    pub async fn get(&self, id: &str) -> Result<Option<StoredDocument>, DocumentError> {
        let row = sqlx::query(
            "SELECT id, data_json, created_at FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data_json: String = row.get("data_json");
        let created_at: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| DocumentError::CorruptTimestamp(created_at.clone()))?
            .with_timezone(&Utc);

        Ok(Some(StoredDocument {
            id: row.get("id"),
            data: serde_json::from_str(&data_json).map_err(DocumentError::Decode)?,
            created_at,
        }))
    }

    /// Deletes the document `id`. Returns `true` when a document was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, DocumentError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(self.collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Counts the documents in the collection.
    pub async fn count(&self) -> Result<u64, DocumentError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

/// Acknowledgement of a successful create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub update_time: DateTime<Utc>,
}

/// Document as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

/// Error type for operations on a document collection.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document {collection}/{id} already exists")]
    AlreadyExists {
        collection: &'static str,
        id: String,
    },
    #[error("failed to encode document: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode stored document: {0}")]
    Decode(serde_json::Error),
    #[error("stored document has an invalid timestamp: {0}")]
    CorruptTimestamp(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DocumentError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "already_exists",
            Self::Encode(_) => "encode",
            Self::Decode(_) => "decode",
            Self::CorruptTimestamp(_) => "corrupt_timestamp",
            Self::Database(_) => "database",
        }
    }
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
