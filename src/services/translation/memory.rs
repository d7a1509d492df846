// Translation memory: persistent source → translation store backed by SQLite
//
// Connections are thread-confined. Each thread that touches a store lazily
// opens its own handle and keeps it in a thread-local registry keyed by the
// store's id, so a worker thread and the controller thread never share one.

use crate::core::errors::{CacheError, CacheResult};
use crate::core::types::TranslationEntry;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Quality score written by a manual correction
pub const REVIEWED_QUALITY: i64 = 10;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS translations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_text TEXT NOT NULL UNIQUE,
    translated_text TEXT NOT NULL,
    quality_score INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CONNECTIONS: RefCell<HashMap<u64, Connection>> = RefCell::new(HashMap::new());
}

/// Handle to a translation memory file.
///
/// Cheap to clone and safe to send between threads: the handle carries only
/// the path, every thread gets its own connection on first use.
#[derive(Clone)]
pub struct TranslationMemory {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    id: u64,
    path: PathBuf,
}

impl Drop for MemoryInner {
    fn drop(&mut self) {
        // Other threads' handles close when those threads exit
        let _ = CONNECTIONS.try_with(|cell| {
            if let Ok(mut connections) = cell.try_borrow_mut() {
                connections.remove(&self.id);
            }
        });
    }
}

impl TranslationMemory {
    /// Open (or create) the store and make sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let memory = Self {
            inner: Arc::new(MemoryInner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                path: path.as_ref().to_path_buf(),
            }),
        };

        memory.with_conn(|conn| conn.execute_batch(SCHEMA))?;
        info!("✓ Translation memory ready at {}", memory.path().display());
        Ok(memory)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Accepted translation for `source_text`.
    ///
    /// Only reviewed rows (quality > 0) count as hits; unreviewed machine
    /// output stays invisible here. Store errors are logged and read as a miss.
    pub fn lookup(&self, source_text: &str) -> Option<String> {
        let result = self.with_conn(|conn| {
            conn.query_row(
                "SELECT translated_text FROM translations WHERE source_text = ?1 AND quality_score > 0",
                params![source_text],
                |row| row.get::<_, String>(0),
            )
            .optional()
        });

        match result {
            Ok(found) => found,
            Err(e) => {
                warn!("Translation memory lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Insert an unreviewed row unless `source_text` is already present.
    /// An existing row of any quality is left untouched.
    pub fn add_translation(&self, source_text: &str, translated_text: &str) -> CacheResult<()> {
        let inserted = self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO translations (source_text, translated_text, quality_score) VALUES (?1, ?2, 0)",
                params![source_text, translated_text],
            )
        })?;
        debug!("add_translation: {} row(s) inserted", inserted);
        Ok(())
    }

    /// Replace the translation of an existing row and mark it reviewed.
    ///
    /// Returns `false` (and changes nothing) when `source_text` is absent.
    pub fn update_translation(&self, source_text: &str, new_text: &str) -> CacheResult<bool> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE translations SET translated_text = ?1, quality_score = ?2 WHERE source_text = ?3",
                params![new_text, REVIEWED_QUALITY, source_text],
            )
        })?;
        Ok(updated > 0)
    }

    /// Remove a row. Returns whether anything was deleted.
    pub fn delete_entry(&self, source_text: &str) -> CacheResult<bool> {
        let deleted = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM translations WHERE source_text = ?1",
                params![source_text],
            )
        })?;
        Ok(deleted > 0)
    }

    /// All rows, newest first. A non-empty `search_term` keeps rows whose
    /// source or translation contains it (case-sensitive).
    pub fn fetch_all_entries(&self, search_term: &str) -> CacheResult<Vec<TranslationEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, source_text, translated_text, quality_score, created_at
                 FROM translations
                 WHERE ?1 = '' OR instr(source_text, ?1) > 0 OR instr(translated_text, ?1) > 0
                 ORDER BY id DESC",
            )?;
            let entries = stmt
                .query_map(params![search_term], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    pub fn count_entries(&self) -> CacheResult<usize> {
        let count = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM translations", [], |row| {
                row.get::<_, i64>(0)
            })
        })?;
        Ok(count as usize)
    }

    /// Delete every row and reset the id sequence so the next insert gets id 1
    pub fn flush_all(&self) -> CacheResult<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM translations", [])?;
            tx.execute("DELETE FROM sqlite_sequence WHERE name = 'translations'", [])?;
            tx.commit()
        })?;
        info!("Translation memory flushed");
        Ok(())
    }

    /// Close this thread's connection. The next call on this thread reopens it.
    pub fn close(&self) {
        let closed = CONNECTIONS.with(|cell| cell.borrow_mut().remove(&self.inner.id));
        if closed.is_some() {
            debug!("Closed translation memory connection on {:?}", std::thread::current().id());
        }
    }

    /// Run `f` against this thread's connection, opening it on first use
    fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        CONNECTIONS.with(|cell| {
            let mut connections = cell.borrow_mut();
            let conn = match connections.entry(self.inner.id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(open_connection(&self.inner.path)?),
            };
            Ok(f(conn)?)
        })
    }
}

fn open_connection(path: &Path) -> CacheResult<Connection> {
    let open_failed = |source| CacheError::OpenFailed {
        path: path.to_path_buf(),
        source,
    };

    let conn = Connection::open(path).map_err(open_failed)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(open_failed)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;",
    )
    .map_err(open_failed)?;

    debug!(
        "Opened translation memory connection on {:?}",
        std::thread::current().id()
    );
    Ok(conn)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<TranslationEntry> {
    Ok(TranslationEntry {
        id: row.get(0)?,
        source_text: row.get(1)?,
        translated_text: row.get(2)?,
        quality_score: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, TranslationMemory) {
        let dir = TempDir::new().unwrap();
        let memory = TranslationMemory::open(dir.path().join("tm.db")).unwrap();
        (dir, memory)
    }

    #[test]
    fn test_unreviewed_rows_are_hidden_until_updated() {
        let (_dir, memory) = open_temp();

        memory.add_translation("こんにちは", "Hello").unwrap();
        assert_eq!(memory.lookup("こんにちは"), None);
        assert_eq!(memory.count_entries().unwrap(), 1);

        assert!(memory.update_translation("こんにちは", "Hi there").unwrap());
        assert_eq!(memory.lookup("こんにちは").as_deref(), Some("Hi there"));

        let entries = memory.fetch_all_entries("").unwrap();
        assert_eq!(entries[0].quality_score, REVIEWED_QUALITY);
        assert!(entries[0].is_reviewed());
    }

    #[test]
    fn test_add_translation_first_writer_wins() {
        let (_dir, memory) = open_temp();

        memory.add_translation("猫", "cat").unwrap();
        memory.add_translation("猫", "kitty").unwrap();

        let entries = memory.fetch_all_entries("").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].translated_text, "cat");

        // A reviewed row is not downgraded either
        memory.update_translation("猫", "Cat").unwrap();
        memory.add_translation("猫", "kitty").unwrap();
        assert_eq!(memory.lookup("猫").as_deref(), Some("Cat"));
    }

    #[test]
    fn test_update_absent_key_is_noop() {
        let (_dir, memory) = open_temp();

        assert!(!memory.update_translation("missing", "x").unwrap());
        assert_eq!(memory.count_entries().unwrap(), 0);
    }

    #[test]
    fn test_delete_entry() {
        let (_dir, memory) = open_temp();

        memory.add_translation("a", "b").unwrap();
        assert!(memory.delete_entry("a").unwrap());
        assert!(!memory.delete_entry("a").unwrap());
        assert_eq!(memory.count_entries().unwrap(), 0);
    }

    #[test]
    fn test_fetch_orders_newest_first_and_filters() {
        let (_dir, memory) = open_temp();

        memory.add_translation("一", "one").unwrap();
        memory.add_translation("二", "two").unwrap();
        memory.add_translation("三", "three").unwrap();

        let all = memory.fetch_all_entries("").unwrap();
        let sources: Vec<&str> = all.iter().map(|e| e.source_text.as_str()).collect();
        assert_eq!(sources, vec!["三", "二", "一"]);
        assert!(all.windows(2).all(|w| w[0].id > w[1].id));

        let matches = memory.fetch_all_entries("t").unwrap();
        let sources: Vec<&str> = matches.iter().map(|e| e.source_text.as_str()).collect();
        assert_eq!(sources, vec!["三", "二"]);

        assert_eq!(memory.fetch_all_entries("二").unwrap().len(), 1);
        // Case-sensitive
        assert!(memory.fetch_all_entries("ONE").unwrap().is_empty());
    }

    #[test]
    fn test_flush_resets_ids() {
        let (_dir, memory) = open_temp();

        memory.add_translation("a", "1").unwrap();
        memory.add_translation("b", "2").unwrap();
        memory.flush_all().unwrap();
        assert_eq!(memory.count_entries().unwrap(), 0);

        memory.add_translation("c", "3").unwrap();
        let entries = memory.fetch_all_entries("").unwrap();
        assert_eq!(entries[0].id, 1);
    }

    #[test]
    fn test_ids_never_reused_after_delete() {
        let (_dir, memory) = open_temp();

        memory.add_translation("a", "1").unwrap();
        memory.add_translation("b", "2").unwrap();
        memory.delete_entry("b").unwrap();
        memory.add_translation("c", "3").unwrap();

        assert_eq!(memory.fetch_all_entries("").unwrap()[0].id, 3);
    }

    #[test]
    fn test_each_thread_gets_its_own_connection() {
        let (_dir, memory) = open_temp();
        memory.add_translation("main", "from main").unwrap();

        let worker = memory.clone();
        std::thread::spawn(move || {
            worker.add_translation("worker", "from worker").unwrap();
            worker.update_translation("main", "reviewed on worker").unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(memory.count_entries().unwrap(), 2);
        assert_eq!(memory.lookup("main").as_deref(), Some("reviewed on worker"));
    }

    #[test]
    fn test_close_then_reopen_on_next_call() {
        let (_dir, memory) = open_temp();
        memory.add_translation("a", "b").unwrap();

        memory.close();
        memory.close();
        assert_eq!(memory.count_entries().unwrap(), 1);
    }

    #[test]
    fn test_open_fails_for_unusable_path() {
        let dir = TempDir::new().unwrap();
        let result = TranslationMemory::open(dir.path().join("missing").join("tm.db"));
        assert!(matches!(result, Err(CacheError::OpenFailed { .. })));
    }

    #[test]
    fn test_created_at_is_populated() {
        let (_dir, memory) = open_temp();
        memory.add_translation("a", "b").unwrap();

        let entry = &memory.fetch_all_entries("").unwrap()[0];
        let age = chrono::Utc::now().naive_utc() - entry.created_at;
        assert!(age.num_minutes().abs() < 5);
    }
}
