//! Capture-file storage and the SQLite record store for crag.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use crag_core::{AscentRecord, PageKind, UserId, UserProfile};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const CRATE_NAME: &str = "crag-storage";

/// Outcome of a capture write. Captures are immutable: a second write for
/// the same identifier and page kind keeps the file already on disk.
#[derive(Debug, Clone)]
pub struct StoredCapture {
    pub path: PathBuf,
    pub byte_size: usize,
    pub already_present: bool,
}

/// Filesystem convention mapping an identifier to its two page captures,
/// `{id}_user.html` and `{id}_boulders.html` under one directory.
#[derive(Debug, Clone)]
pub struct CaptureStore {
    root: PathBuf,
}

impl CaptureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating capture directory {}", self.root.display()))
    }

    pub fn capture_path(&self, user_id: UserId, kind: PageKind) -> PathBuf {
        self.root.join(kind.capture_file_name(user_id))
    }

    /// Both expected captures exist on disk. This is the resume check: a
    /// complete pair is proof the identifier was fetched by an earlier run.
    pub async fn is_complete(&self, user_id: UserId) -> bool {
        let profile = self.capture_path(user_id, PageKind::Profile);
        let ascents = self.capture_path(user_id, PageKind::AscentList);
        fs::try_exists(&profile).await.unwrap_or(false)
            && fs::try_exists(&ascents).await.unwrap_or(false)
    }

    /// Store one capture via an atomic temp-file rename. An existing capture
    /// is never rewritten.
    pub async fn write(
        &self,
        user_id: UserId,
        kind: PageKind,
        html: &str,
    ) -> anyhow::Result<StoredCapture> {
        let path = self.capture_path(user_id, kind);

        if fs::try_exists(&path)
            .await
            .with_context(|| format!("checking capture path {}", path.display()))?
        {
            return Ok(StoredCapture {
                path,
                byte_size: html.len(),
                already_present: true,
            });
        }

        // Truncate-on-exists: a temp file orphaned by a crashed run must
        // not block this identifier forever.
        let temp_path = self
            .root
            .join(format!(".{}.tmp", kind.capture_file_name(user_id)));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp capture file {}", temp_path.display()))?;
        file.write_all(html.as_bytes())
            .await
            .with_context(|| format!("writing temp capture file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp capture file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming temp capture {} -> {}",
                    temp_path.display(),
                    path.display()
                )
            });
        }
        debug!(user_id, path = %path.display(), "capture stored");
        Ok(StoredCapture {
            path,
            byte_size: html.len(),
            already_present: false,
        })
    }

    pub async fn read(&self, file_name: &str) -> anyhow::Result<String> {
        let path = self.root.join(file_name);
        fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading capture {}", path.display()))
    }
}

/// Classify a capture file name by its suffix, returning the page kind and
/// the identifier prefix (the segment before the first underscore). Returns
/// `None` for names matching neither convention.
pub fn classify_capture_name(file_name: &str) -> Option<(PageKind, &str)> {
    let kind = if file_name.ends_with(PageKind::Profile.file_suffix()) {
        PageKind::Profile
    } else if file_name.ends_with(PageKind::AscentList.file_suffix()) {
        PageKind::AscentList
    } else {
        return None;
    };
    let prefix = file_name.split('_').next().unwrap_or(file_name);
    Some((kind, prefix))
}

/// Destination SQLite database holding the `Users`, `Boulders` and
/// `ScrapeExceptions` tables. The pool is capped at one connection so every
/// write path is serialized at the store boundary.
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("opening database {}", path.as_ref().display()))?;
        Ok(Self { pool })
    }

    /// In-memory store, used by tests.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("opening in-memory database")?;
        Ok(Self { pool })
    }

    /// Create the destination tables when absent. Column order here is the
    /// declared insert order; the positional inserts below depend on it.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Users (
                user_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                height TEXT,
                weight TEXT,
                country TEXT,
                city TEXT,
                birth_date TEXT,
                started_climbing TEXT,
                occupation TEXT,
                other_interests TEXT,
                best_comp_result TEXT,
                best_climbing_area TEXT,
                guide_areas TEXT,
                sponsor TEXT,
                presentation_visits TEXT,
                routes_visits TEXT,
                boulders_visits TEXT,
                blog_visits TEXT,
                total_visits TEXT,
                r_country_score TEXT,
                r_country_ranking TEXT,
                r_world_ranking TEXT,
                r_all_time_country_score TEXT,
                r_all_time_country_ranking TEXT,
                r_all_time_world_ranking TEXT,
                b_country_score TEXT,
                b_country_ranking TEXT,
                b_world_ranking TEXT,
                b_all_time_country_score TEXT,
                b_all_time_country_ranking TEXT,
                b_all_time_world_ranking TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating Users table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Boulders (
                user_id INTEGER NOT NULL,
                name TEXT,
                grade TEXT,
                date TEXT,
                style TEXT,
                recommended INTEGER,
                area TEXT,
                tags TEXT,
                comment TEXT,
                stars INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating Boulders table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ScrapeExceptions (
                user_id INTEGER NOT NULL,
                reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating ScrapeExceptions table")?;

        Ok(())
    }

    /// Every identifier already present in `Users`. Loaded once per run and
    /// consulted as a membership set.
    pub async fn user_ids(&self) -> anyhow::Result<HashSet<UserId>> {
        let rows: Vec<i64> = sqlx::query_scalar("SELECT user_id FROM Users")
            .fetch_all(&self.pool)
            .await
            .context("loading user ids")?;
        Ok(rows
            .into_iter()
            .filter_map(|id| UserId::try_from(id).ok())
            .collect())
    }

    /// Every identifier in the exception ledger. Loaded once per scrape run;
    /// a ledgered identifier is never retried automatically.
    pub async fn exception_ids(&self) -> anyhow::Result<HashSet<UserId>> {
        let rows: Vec<i64> = sqlx::query_scalar("SELECT user_id FROM ScrapeExceptions")
            .fetch_all(&self.pool)
            .await
            .context("loading exception ids")?;
        Ok(rows
            .into_iter()
            .filter_map(|id| UserId::try_from(id).ok())
            .collect())
    }

    pub async fn insert_exception(&self, user_id: UserId, reason: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO ScrapeExceptions VALUES (?, ?)")
            .bind(i64::from(user_id))
            .bind(reason)
            .execute(&self.pool)
            .await
            .with_context(|| format!("recording exception for user {user_id}"))?;
        Ok(())
    }

    /// Positional insert; the bind order matches the declared column order
    /// of the `Users` table exactly.
    pub async fn insert_user(&self, profile: &UserProfile) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO Users VALUES \
             (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
              ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(i64::from(profile.user_id))
        .bind(&profile.name)
        .bind(&profile.height)
        .bind(&profile.weight)
        .bind(&profile.country)
        .bind(&profile.city)
        .bind(profile.birth_date)
        .bind(&profile.started_climbing)
        .bind(&profile.occupation)
        .bind(&profile.other_interests)
        .bind(&profile.best_comp_result)
        .bind(&profile.best_climbing_area)
        .bind(&profile.guide_areas)
        .bind(&profile.sponsor)
        .bind(&profile.presentation_visits)
        .bind(&profile.routes_visits)
        .bind(&profile.boulders_visits)
        .bind(&profile.blog_visits)
        .bind(&profile.total_visits)
        .bind(&profile.routes.country_score)
        .bind(&profile.routes.country_ranking)
        .bind(&profile.routes.world_ranking)
        .bind(&profile.routes.all_time_country_score)
        .bind(&profile.routes.all_time_country_ranking)
        .bind(&profile.routes.all_time_world_ranking)
        .bind(&profile.boulders.country_score)
        .bind(&profile.boulders.country_ranking)
        .bind(&profile.boulders.world_ranking)
        .bind(&profile.boulders.all_time_country_score)
        .bind(&profile.boulders.all_time_country_ranking)
        .bind(&profile.boulders.all_time_world_ranking)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting user {}", profile.user_id))?;
        Ok(())
    }

    /// Insert every ascent of one capture file in a single transaction,
    /// preserving slice order.
    pub async fn insert_ascents(&self, records: &[AscentRecord]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("starting transaction")?;
        for record in records {
            sqlx::query("INSERT INTO Boulders VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)")
                .bind(i64::from(record.user_id))
                .bind(&record.name)
                .bind(&record.grade)
                .bind(record.date)
                .bind(record.style.as_str())
                .bind(record.recommended)
                .bind(&record.area)
                .bind(&record.tags)
                .bind(&record.comment)
                .bind(i64::from(record.stars))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("inserting ascent for user {}", record.user_id))?;
        }
        tx.commit().await.context("committing ascents")?;
        Ok(())
    }

    pub async fn ascent_count(&self, user_id: UserId) -> anyhow::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM Boulders WHERE user_id = ?")
            .bind(i64::from(user_id))
            .fetch_one(&self.pool)
            .await
            .context("counting ascents")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crag_core::AscentStyle;
    use tempfile::tempdir;

    fn profile(user_id: UserId) -> UserProfile {
        UserProfile {
            user_id,
            name: "Jane Doe".into(),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 12),
            ..UserProfile::default()
        }
    }

    #[tokio::test]
    async fn capture_writes_are_immutable() {
        let dir = tempdir().expect("tempdir");
        let store = CaptureStore::new(dir.path());
        store.ensure_root().await.expect("root");

        let first = store
            .write(7, PageKind::Profile, "<html>first</html>")
            .await
            .expect("first write");
        let second = store
            .write(7, PageKind::Profile, "<html>second</html>")
            .await
            .expect("second write");

        assert!(!first.already_present);
        assert!(second.already_present);
        let kept = std::fs::read_to_string(&first.path).expect("read back");
        assert_eq!(kept, "<html>first</html>");
    }

    #[tokio::test]
    async fn stale_temp_file_does_not_block_a_write() {
        let dir = tempdir().expect("tempdir");
        let store = CaptureStore::new(dir.path());
        store.ensure_root().await.expect("root");

        // Leftover from an interrupted run.
        let temp_path = dir.path().join(".8_user.html.tmp");
        std::fs::write(&temp_path, "<html>half written</html>").expect("seed temp");

        let stored = store
            .write(8, PageKind::Profile, "<html>fresh</html>")
            .await
            .expect("write succeeds despite stale temp");

        assert!(!stored.already_present);
        let kept = std::fs::read_to_string(&stored.path).expect("read back");
        assert_eq!(kept, "<html>fresh</html>");
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn completeness_requires_both_captures() {
        let dir = tempdir().expect("tempdir");
        let store = CaptureStore::new(dir.path());
        store.ensure_root().await.expect("root");

        assert!(!store.is_complete(3).await);
        store
            .write(3, PageKind::Profile, "<html/>")
            .await
            .expect("profile write");
        assert!(!store.is_complete(3).await);
        store
            .write(3, PageKind::AscentList, "<html/>")
            .await
            .expect("ascents write");
        assert!(store.is_complete(3).await);
    }

    #[test]
    fn capture_names_classify_by_suffix() {
        assert_eq!(
            classify_capture_name("42_user.html"),
            Some((PageKind::Profile, "42"))
        );
        assert_eq!(
            classify_capture_name("42_boulders.html"),
            Some((PageKind::AscentList, "42"))
        );
        assert_eq!(classify_capture_name("notes.txt"), None);
        assert_eq!(classify_capture_name("42_user.html.bak"), None);
    }

    #[tokio::test]
    async fn user_ids_reflect_inserts() {
        let store = RecordStore::in_memory().await.expect("store");
        store.ensure_schema().await.expect("schema");

        assert!(store.user_ids().await.expect("ids").is_empty());
        store.insert_user(&profile(5)).await.expect("insert");
        let ids = store.user_ids().await.expect("ids");
        assert!(ids.contains(&5));
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn exception_ledger_round_trips() {
        let store = RecordStore::in_memory().await.expect("store");
        store.ensure_schema().await.expect("schema");

        store
            .insert_exception(11, "no such element: frame main")
            .await
            .expect("insert");
        let ids = store.exception_ids().await.expect("ids");
        assert!(ids.contains(&11));
    }

    #[tokio::test]
    async fn ascent_inserts_commit_per_batch() {
        let store = RecordStore::in_memory().await.expect("store");
        store.ensure_schema().await.expect("schema");

        let record = AscentRecord {
            user_id: 9,
            name: "Midnight Lightning".into(),
            grade: "7b".into(),
            date: NaiveDate::from_ymd_opt(2007, 3, 12).expect("date"),
            style: AscentStyle::Flash,
            recommended: true,
            area: "Yosemite".into(),
            tags: "highball".into(),
            comment: "classic".into(),
            stars: 3,
        };
        store
            .insert_ascents(&[record.clone(), AscentRecord { stars: 0, ..record }])
            .await
            .expect("insert");
        assert_eq!(store.ascent_count(9).await.expect("count"), 2);
    }
}
