use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};

/// One uploaded image and its caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub id: i64,
    pub image_path: String,
    pub caption: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entry {0} not found")]
    NotFound(i64),
    #[error("failed to create database directory: {0}")]
    Directory(#[from] std::io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

fn row_to_entry(row: &Row) -> rusqlite::Result<ImageEntry> {
    Ok(ImageEntry {
        id: row.get("id")?,
        image_path: row.get("image_path")?,
        caption: row.get("caption")?,
    })
}

/// Repository over the `image_entry` table.
///
/// Every call commits on its own. The single connection is shared behind a
/// mutex and driven from the blocking pool.
#[derive(Clone)]
pub struct EntryStore {
    conn: Arc<Mutex<Connection>>,
}

impl EntryStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        info!("database opened at {}", db_path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS image_entry (
                id          INTEGER PRIMARY KEY,
                image_path  VARCHAR(150) NOT NULL,
                caption     VARCHAR(300) NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn execute<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = match conn.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            task(&guard)
        })
        .await?
    }

    pub async fn create(&self, image_path: String, caption: String) -> Result<i64> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO image_entry (image_path, caption) VALUES (?1, ?2)",
                params![image_path, caption],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<ImageEntry> {
        self.execute(move |conn| {
            conn.query_row(
                "SELECT id, image_path, caption FROM image_entry WHERE id = ?1",
                params![id],
                row_to_entry,
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))
        })
        .await
    }

    /// Overwrites the fields that are `Some`; `None` keeps the stored value.
    pub async fn update(
        &self,
        id: i64,
        image_path: Option<String>,
        caption: Option<String>,
    ) -> Result<()> {
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE image_entry
                 SET image_path = COALESCE(?2, image_path),
                     caption = COALESCE(?3, caption)
                 WHERE id = ?1",
                params![id, image_path, caption],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    /// All entries in primary-key order.
    pub async fn list_all(&self) -> Result<Vec<ImageEntry>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, image_path, caption FROM image_entry ORDER BY id ASC")?;
            let entries = stmt
                .query_map([], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }
}
