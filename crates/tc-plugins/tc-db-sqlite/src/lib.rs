//! # tc-db-sqlite
//!
//! Implements `CapsuleRepo` on SQLite. Timestamps are stored as epoch
//! milliseconds and ids as 16-byte blobs.

use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tc_core::models::{Capsule, CapsuleFile, CapsuleWithFiles};
use tc_core::traits::CapsuleRepo;
use tracing::info;
use uuid::Uuid;

const CAPSULE_COLUMNS: &str = "id, title, owner, message, unlock_date, created_at, is_unlocked";

pub struct SqliteCapsuleRepo {
    pool: SqlitePool,
}

impl SqliteCapsuleRepo {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    ///
    /// In-memory databases are pinned to one long-lived connection, since each
    /// SQLite connection would otherwise see its own empty database.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let repo = Self::from_pool(pool_options.connect_with(options).await?);
        repo.migrate().await?;
        info!(url, "database ready");
        Ok(repo)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct CapsuleRow {
    id: Uuid,
    title: String,
    owner: String,
    message: String,
    unlock_date: i64,
    created_at: i64,
    is_unlocked: bool,
}

impl TryFrom<CapsuleRow> for Capsule {
    type Error = anyhow::Error;

    fn try_from(row: CapsuleRow) -> anyhow::Result<Self> {
        Ok(Capsule {
            id: row.id,
            title: row.title,
            owner: row.owner,
            message: row.message,
            unlock_date: from_millis(row.unlock_date)?,
            created_at: from_millis(row.created_at)?,
            is_unlocked: row.is_unlocked,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    capsule_id: Uuid,
    original_name: String,
    storage_ref: String,
    mimetype: String,
}

impl From<FileRow> for CapsuleFile {
    fn from(row: FileRow) -> Self {
        CapsuleFile {
            id: row.id,
            capsule_id: row.capsule_id,
            original_name: row.original_name,
            storage_ref: row.storage_ref,
            mimetype: row.mimetype,
        }
    }
}

fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

fn into_capsules(rows: Vec<CapsuleRow>) -> anyhow::Result<Vec<Capsule>> {
    rows.into_iter().map(Capsule::try_from).collect()
}

#[async_trait]
impl CapsuleRepo for SqliteCapsuleRepo {
    /// Capsule and file rows go in one transaction.
    async fn create_capsule(&self, capsule: &Capsule, files: &[CapsuleFile]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO capsules (id, title, owner, message, unlock_date, created_at, is_unlocked) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(capsule.id)
        .bind(&capsule.title)
        .bind(&capsule.owner)
        .bind(&capsule.message)
        .bind(capsule.unlock_date.timestamp_millis())
        .bind(capsule.created_at.timestamp_millis())
        .bind(capsule.is_unlocked)
        .execute(&mut *tx)
        .await?;

        for file in files {
            sqlx::query(
                "INSERT INTO capsule_files (id, capsule_id, original_name, storage_ref, mimetype) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(file.id)
            .bind(file.capsule_id)
            .bind(&file.original_name)
            .bind(&file.storage_ref)
            .bind(&file.mimetype)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_capsule(&self, id: Uuid) -> anyhow::Result<Option<CapsuleWithFiles>> {
        let row = sqlx::query_as::<_, CapsuleRow>(&format!(
            "SELECT {CAPSULE_COLUMNS} FROM capsules WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let files = sqlx::query_as::<_, FileRow>(
            "SELECT id, capsule_id, original_name, storage_ref, mimetype \
             FROM capsule_files WHERE capsule_id = ? ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CapsuleFile::from)
        .collect();

        Ok(Some(CapsuleWithFiles {
            capsule: row.try_into()?,
            files,
        }))
    }

    async fn list_capsules(&self, owner: &str) -> anyhow::Result<Vec<Capsule>> {
        let rows = sqlx::query_as::<_, CapsuleRow>(&format!(
            "SELECT {CAPSULE_COLUMNS} FROM capsules WHERE owner = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        into_capsules(rows)
    }

    async fn unlock_capsule(&self, id: Uuid) -> anyhow::Result<Option<Capsule>> {
        let row = sqlx::query_as::<_, CapsuleRow>(&format!(
            "UPDATE capsules SET is_unlocked = 1 WHERE id = ? RETURNING {CAPSULE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Capsule::try_from).transpose()
    }

    async fn unlock_due(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Capsule>> {
        let rows = sqlx::query_as::<_, CapsuleRow>(&format!(
            "UPDATE capsules SET is_unlocked = 1 \
             WHERE is_unlocked = 0 AND unlock_date <= ? \
             RETURNING {CAPSULE_COLUMNS}"
        ))
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        into_capsules(rows)
    }

    async fn delete_capsule(&self, id: Uuid) -> anyhow::Result<Option<Vec<CapsuleFile>>> {
        let mut tx = self.pool.begin().await?;

        let files: Vec<CapsuleFile> = sqlx::query_as::<_, FileRow>(
            "SELECT id, capsule_id, original_name, storage_ref, mimetype \
             FROM capsule_files WHERE capsule_id = ? ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(CapsuleFile::from)
        .collect();

        let deleted = sqlx::query("DELETE FROM capsules WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tc_core::models::now_millis;

    async fn repo() -> SqliteCapsuleRepo {
        SqliteCapsuleRepo::connect("sqlite::memory:", 1).await.unwrap()
    }

    fn capsule(owner: &str, unlock_in: ChronoDuration) -> Capsule {
        let now = now_millis();
        Capsule {
            id: Uuid::now_v7(),
            title: "Letter to 2030".into(),
            owner: owner.into(),
            message: "hello from the past".into(),
            unlock_date: now + unlock_in,
            created_at: now,
            is_unlocked: false,
        }
    }

    fn file(capsule_id: Uuid, name: &str) -> CapsuleFile {
        CapsuleFile {
            id: Uuid::now_v7(),
            capsule_id,
            original_name: name.into(),
            storage_ref: format!("./uploads/{capsule_id}/{name}"),
            mimetype: "text/plain".into(),
        }
    }

    #[tokio::test]
    async fn create_and_get_capsule_with_files() {
        let repo = repo().await;
        let c = capsule("alice@example.com", ChronoDuration::days(30));
        let files = vec![file(c.id, "a.txt"), file(c.id, "b.txt")];

        repo.create_capsule(&c, &files).await.expect("Failed to create capsule");

        let fetched = repo.get_capsule(c.id).await.unwrap().unwrap();
        assert_eq!(fetched.capsule, c);
        assert_eq!(fetched.files, files);
        assert!(fetched.files.iter().all(|f| f.capsule_id == c.id));
    }

    #[tokio::test]
    async fn get_unknown_capsule_is_none() {
        let repo = repo().await;
        assert!(repo.get_capsule(Uuid::now_v7()).await.unwrap().is_none());
        assert!(repo.unlock_capsule(Uuid::now_v7()).await.unwrap().is_none());
        assert!(repo.delete_capsule(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner_and_newest_first() {
        let repo = repo().await;
        let mut older = capsule("alice", ChronoDuration::days(1));
        older.created_at -= ChronoDuration::minutes(5);
        let newer = capsule("alice", ChronoDuration::days(1));
        let other = capsule("bob", ChronoDuration::days(1));
        for c in [&older, &newer, &other] {
            repo.create_capsule(c, &[]).await.unwrap();
        }

        let listed: Vec<Uuid> = repo
            .list_capsules("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(listed, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn unlock_due_only_touches_locked_past_capsules() {
        let repo = repo().await;
        let past = capsule("o", ChronoDuration::days(-1));
        let future = capsule("o", ChronoDuration::days(1));
        repo.create_capsule(&past, &[]).await.unwrap();
        repo.create_capsule(&future, &[]).await.unwrap();

        let unlocked = repo.unlock_due(Utc::now()).await.unwrap();
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].id, past.id);
        assert!(unlocked[0].is_unlocked);

        // Already unlocked rows are not reported twice.
        assert!(repo.unlock_due(Utc::now()).await.unwrap().is_empty());
        let future_row = repo.get_capsule(future.id).await.unwrap().unwrap();
        assert!(!future_row.capsule.is_unlocked);
    }

    #[tokio::test]
    async fn unlock_due_includes_the_exact_unlock_instant() {
        let repo = repo().await;
        let c = capsule("o", ChronoDuration::hours(1));
        repo.create_capsule(&c, &[]).await.unwrap();

        let just_before = c.unlock_date - ChronoDuration::milliseconds(1);
        assert!(repo.unlock_due(just_before).await.unwrap().is_empty());

        let unlocked = repo.unlock_due(c.unlock_date).await.unwrap();
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].id, c.id);
    }

    #[tokio::test]
    async fn unlock_capsule_is_idempotent() {
        let repo = repo().await;
        let c = capsule("o", ChronoDuration::days(365));
        repo.create_capsule(&c, &[]).await.unwrap();

        let first = repo.unlock_capsule(c.id).await.unwrap().unwrap();
        let second = repo.unlock_capsule(c.id).await.unwrap().unwrap();
        assert!(first.is_unlocked);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn delete_cascades_to_files() {
        let repo = repo().await;
        let c = capsule("o", ChronoDuration::days(1));
        let files = vec![file(c.id, "a.txt")];
        repo.create_capsule(&c, &files).await.unwrap();

        let removed = repo.delete_capsule(c.id).await.unwrap().unwrap();
        assert_eq!(removed, files);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM capsule_files WHERE capsule_id = ?")
            .bind(c.id)
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(repo.get_capsule(c.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_file_insert_rolls_back_capsule() {
        let repo = repo().await;
        let c = capsule("o", ChronoDuration::days(1));
        let dup = file(c.id, "a.txt");

        // Same primary key twice violates the constraint on the second insert.
        let result = repo.create_capsule(&c, &[dup.clone(), dup]).await;
        assert!(result.is_err());
        assert!(repo.get_capsule(c.id).await.unwrap().is_none());
    }
}
