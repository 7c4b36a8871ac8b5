//! Embedded SQLite fallback store.
//!
//! Records are kept as their JSON encoding next to the indexed columns used for ordering and
//! filtering, so a round trip through this store is field-exact.

use super::types::{StorageBackend, StorageError};
use crate::model::{Category, Message, UploadedFile};
use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
    PRAGMA journal_mode=WAL;

    CREATE TABLE IF NOT EXISTS files (
        id TEXT PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        category TEXT NOT NULL,
        record TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_files_timestamp ON files(timestamp);
    CREATE INDEX IF NOT EXISTS idx_files_category ON files(category);

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        record TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
";

/// Local catalog and transcript store backed by a single SQLite connection.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Open (or create) the database at `path`, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::with_connection(Connection::open(path)?)?;
        tracing::debug!(path = %path.display(), "Opened local store");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Return the files filed under `category`, oldest first.
    pub fn files_by_category(&self, category: Category) -> Result<Vec<UploadedFile>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT record FROM files WHERE category = ?1 ORDER BY timestamp ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![category.label()], |row| row.get::<_, String>(0))?;
            decode_rows(rows)
        })
    }

    fn with_conn<T>(
        &self,
        work: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        work(&conn)
    }
}

#[async_trait]
impl StorageBackend for LocalStore {
    async fn list_files(&self) -> Result<Vec<UploadedFile>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT record FROM files ORDER BY timestamp ASC, rowid ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            decode_rows(rows)
        })
    }

    async fn add_file(&self, file: &UploadedFile) -> Result<(), StorageError> {
        let record = serde_json::to_string(file)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (id, timestamp, category, record) VALUES (?1, ?2, ?3, ?4)",
                params![file.id, file.timestamp, file.metadata.category.label(), record],
            )?;
            Ok(())
        })?;
        tracing::debug!(id = %file.id, name = %file.name, "File stored locally");
        Ok(())
    }

    async fn delete_file(&self, id: &str) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    async fn list_messages(&self) -> Result<Vec<Message>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT record FROM messages ORDER BY timestamp ASC, rowid ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            decode_rows(rows)
        })
    }

    async fn add_message(&self, message: &Message) -> Result<(), StorageError> {
        let record = serde_json::to_string(message)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, timestamp, record) VALUES (?1, ?2, ?3)",
                params![message.id, message.timestamp, record],
            )?;
            Ok(())
        })
    }
}

fn decode_rows<T, I>(rows: I) -> Result<Vec<T>, StorageError>
where
    T: serde::de::DeserializeOwned,
    I: Iterator<Item = rusqlite::Result<String>>,
{
    rows.map(|row| Ok(serde_json::from_str(&row?)?)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChartData, ContentKind, FileMetadata, Role};
    use serde_json::json;

    fn file(name: &str, timestamp: i64, category: Category) -> UploadedFile {
        UploadedFile {
            id: format!("id-{name}"),
            name: name.to_string(),
            kind: ContentKind::PlainText,
            content: format!("content of {name}"),
            timestamp,
            metadata: FileMetadata {
                description: Some("desc".into()),
                source: Some("DATASUS".into()),
                period: None,
                case_name: Some("Dengue".into()),
                category,
            },
        }
    }

    fn message(id: &str, timestamp: i64) -> Message {
        Message {
            id: id.to_string(),
            role: Role::User,
            text: format!("message {id}"),
            timestamp,
            pending: false,
            chart_data: None,
        }
    }

    #[tokio::test]
    async fn file_round_trip_is_field_exact() {
        let store = LocalStore::in_memory().expect("store");
        let stored = file("casos.txt", 5, Category::Health);
        store.add_file(&stored).await.expect("add");

        let listed = store.list_files().await.expect("list");
        assert_eq!(listed, vec![stored]);
    }

    #[tokio::test]
    async fn messages_come_back_in_timestamp_order() {
        let store = LocalStore::in_memory().expect("store");
        for (id, timestamp) in [("c", 30), ("a", 10), ("d", 40), ("b", 20)] {
            store.add_message(&message(id, timestamp)).await.expect("add");
        }

        let ids: Vec<_> = store
            .list_messages()
            .await
            .expect("list")
            .into_iter()
            .map(|message| message.id)
            .collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn chart_payload_survives_storage() {
        let store = LocalStore::in_memory().expect("store");
        let mut reply = message("r", 1);
        reply.role = Role::Assistant;
        reply.chart_data = Some(ChartData::new(json!({
            "type": "line",
            "data": [{"label": "Jan", "value": 3}],
            "colors": ["#0a0"]
        })));
        store.add_message(&reply).await.expect("add");

        assert_eq!(store.list_messages().await.expect("list"), vec![reply]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_and_deletes_are_idempotent() {
        let store = LocalStore::in_memory().expect("store");
        let stored = file("a.txt", 1, Category::General);
        store.add_file(&stored).await.expect("add");
        assert!(matches!(
            store.add_file(&stored).await,
            Err(StorageError::Sqlite(_))
        ));

        store.delete_file(&stored.id).await.expect("delete");
        store.delete_file(&stored.id).await.expect("delete again");
        assert!(store.list_files().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn category_index_filters_files() {
        let store = LocalStore::in_memory().expect("store");
        store.add_file(&file("s1.txt", 2, Category::Health)).await.expect("s1");
        store.add_file(&file("e1.txt", 1, Category::Education)).await.expect("e1");
        store.add_file(&file("s0.txt", 1, Category::Health)).await.expect("s0");

        let names: Vec<_> = store
            .files_by_category(Category::Health)
            .expect("health")
            .into_iter()
            .map(|file| file.name)
            .collect();
        assert_eq!(names, ["s0.txt", "s1.txt"]);
    }

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let root = std::env::temp_dir().join(format!("indicator-desk-{}", uuid::Uuid::new_v4()));
        let path = root.join("nested").join("local.sqlite3");
        {
            let store = LocalStore::open(&path).expect("open");
            store.add_message(&message("m", 1)).await.expect("add");
        }
        let reopened = LocalStore::open(&path).expect("reopen");
        assert_eq!(reopened.list_messages().await.expect("list").len(), 1);
        std::fs::remove_dir_all(root).ok();
    }
}
