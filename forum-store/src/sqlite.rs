//! SQLite storage backend for forum-sync.

use async_trait::async_trait;
use forum_client::{MessageStore, StoreError};
use forum_types::{
    Message, MessageId, MessageQuery, NewMessage, RoleTag, Timestamp, UserId, Visibility,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;

const COLUMNS: &str = "id, author_id, author_name, author_role, body, created_at, is_private, \
     recipient_id, recipient_name, reply_to_id, reply_to_name, mentions, images, flagged";

/// SQLite-based message store.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a message database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        tracing::debug!(path = %path.display(), "Message store opened");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:").map_err(database)?;

        // A single connection that never expires keeps the database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                author_name TEXT NOT NULL,
                author_role TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER,
                is_private INTEGER NOT NULL,
                recipient_id TEXT,
                recipient_name TEXT,
                reply_to_id TEXT,
                reply_to_name TEXT,
                mentions TEXT NOT NULL DEFAULT '[]',
                images TEXT NOT NULL DEFAULT '[]',
                flagged INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS store_clock (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_ms INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_messages_public ON messages(is_private, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages(recipient_id, created_at)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Message store migration failed: {}", e);
                    database(e)
                })?;
        }

        Ok(())
    }

    /// Number of stored messages.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await
            .map_err(database)?;
        Ok(count as u64)
    }

    /// Look up a single message.
    pub async fn get(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        let sql = format!("SELECT {} FROM messages WHERE id = ?1", COLUMNS);
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;

        row.map(Message::try_from).transpose()
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn query(&self, query: &MessageQuery) -> Result<Vec<Message>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM messages WHERE ", COLUMNS));

        match &query.visibility {
            Visibility::Public => {
                builder.push("is_private = 0");
            }
            Visibility::PrivateTo(user) => {
                builder
                    .push("is_private = 1 AND recipient_id = ")
                    .push_bind(user.as_str().to_string());
            }
        }
        if let Some(after) = query.after {
            builder.push(" AND created_at > ").push_bind(after.as_millis());
        }
        if let Some(before) = query.before {
            builder.push(" AND created_at < ").push_bind(before.as_millis());
        }
        // NULL timestamps sort last in descending order
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(query.limit));

        let rows = builder
            .build_query_as::<MessageRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mentions = serde_json::to_string(&message.mentions)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let images = serde_json::to_string(&message.images)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let id = MessageId::random();

        let mut tx = self.pool.begin().await.map_err(database)?;

        // Strictly increasing: wall clock, or one past the last value handed out
        let created_at: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO store_clock (id, last_ms)
            VALUES (1, ?1)
            ON CONFLICT(id) DO UPDATE SET last_ms = MAX(excluded.last_ms, last_ms + 1)
            RETURNING last_ms
            "#,
        )
        .bind(Timestamp::now().as_millis())
        .fetch_one(&mut *tx)
        .await
        .map_err(database)?;

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, author_id, author_name, author_role, body, created_at, is_private,
                recipient_id, recipient_name, reply_to_id, reply_to_name, mentions, images
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(id.as_str())
        .bind(message.author_id.as_str())
        .bind(&message.author_name)
        .bind(message.author_role.as_str())
        .bind(&message.body)
        .bind(created_at)
        .bind(message.is_private())
        .bind(message.recipient_id.as_ref().map(|r| r.as_str().to_string()))
        .bind(&message.recipient_name)
        .bind(message.reply_to_id.as_ref().map(|r| r.as_str().to_string()))
        .bind(&message.reply_to_name)
        .bind(mentions)
        .bind(images)
        .execute(&mut *tx)
        .await
        .map_err(database)?;

        tx.commit().await.map_err(database)?;

        Ok(Message::from_new(
            id,
            Timestamp::from_millis(created_at),
            message,
        ))
    }

    async fn set_flagged(&self, id: &MessageId, flagged: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE messages SET flagged = ?1 WHERE id = ?2")
            .bind(flagged)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn delete(&self, id: &MessageId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}

/// Map a sqlx error onto the store error taxonomy.
fn database(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    author_id: String,
    author_name: String,
    author_role: String,
    body: String,
    created_at: Option<i64>,
    is_private: bool,
    recipient_id: Option<String>,
    recipient_name: Option<String>,
    reply_to_id: Option<String>,
    reply_to_name: Option<String>,
    mentions: String,
    images: String,
    flagged: bool,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let mentions = serde_json::from_str(&row.mentions)
            .map_err(|e| StoreError::Corrupt(format!("mentions of {}: {}", row.id, e)))?;
        let images = serde_json::from_str(&row.images)
            .map_err(|e| StoreError::Corrupt(format!("images of {}: {}", row.id, e)))?;

        Ok(Message {
            id: MessageId::new(row.id),
            author_id: UserId::new(row.author_id),
            author_name: row.author_name,
            author_role: RoleTag::parse_lossy(&row.author_role),
            body: row.body,
            created_at: row.created_at.map(Timestamp::from_millis),
            is_private: row.is_private,
            recipient_id: row.recipient_id.map(UserId::new),
            recipient_name: row.recipient_name,
            reply_to_id: row.reply_to_id.map(MessageId::new),
            reply_to_name: row.reply_to_name,
            mentions,
            images,
            flagged: row.flagged,
        })
    }
}
