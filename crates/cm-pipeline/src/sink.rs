//! Output buffering and the single-transaction commit

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, ToSql, Transaction};

use crate::aggregate::OutputRecord;
use crate::error::{Error, Result};
use crate::source::RequestKind;

// =============================================================================
// Batch buffer
// =============================================================================

/// In-memory buffer of kept records, shared by both stream drains.
#[derive(Debug, Default)]
pub struct BatchSink {
    pending: Mutex<Vec<OutputRecord>>,
}

impl BatchSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: OutputRecord) {
        self.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<OutputRecord> {
        // A poisoned buffer still holds every record pushed before the panic
        self.pending.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OutputRecord>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Output store
// =============================================================================

fn table_name(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::HttpRequest => "http_requests_abp",
        RequestKind::Javascript => "javascripts_abp",
    }
}

/// Columns between `site_url` and the flag columns.
fn url_columns(kind: RequestKind) -> &'static [&'static str] {
    match kind {
        RequestKind::HttpRequest => &["url", "top_level_url"],
        RequestKind::Javascript => &["script_url", "document_url", "top_level_url"],
    }
}

/// Rows written by one commit, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub http_requests: usize,
    pub javascripts: usize,
}

/// Writable output database.
pub struct OutputStore {
    path: PathBuf,
    conn: Connection,
    /// Block list flag columns, in configuration order
    flag_columns: Vec<String>,
    exception_column: String,
}

impl OutputStore {
    /// Open (or create) the output database. Column names must already be
    /// validated identifiers.
    pub fn open(path: &Path, flag_columns: Vec<String>, exception_column: String) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| Error::OutputOpen {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("connected to output database {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            conn,
            flag_columns,
            exception_column,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flag_column_defs(&self) -> String {
        self.flag_columns
            .iter()
            .chain(std::iter::once(&self.exception_column))
            .map(|c| format!(", {} INTEGER", c))
            .collect()
    }

    /// Create both output tables if they do not exist yet.
    pub fn ensure_schema(&self) -> Result<()> {
        let flags = self.flag_column_defs();
        for kind in RequestKind::ALL {
            let urls: String = url_columns(kind).iter().map(|c| format!(", {} TEXT", c)).collect();
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, visit_id INTEGER, site_url TEXT{}{})",
                table_name(kind),
                urls,
                flags
            );
            self.conn.execute(&sql, []).map_err(|source| Error::OutputOpen {
                path: self.path.clone(),
                source,
            })?;
            log::debug!("table {} ready", table_name(kind));
        }
        Ok(())
    }

    fn insert_sql(&self, kind: RequestKind) -> String {
        let columns: Vec<&str> = ["id", "visit_id", "site_url"]
            .into_iter()
            .chain(url_columns(kind).iter().copied())
            .chain(self.flag_columns.iter().map(String::as_str))
            .chain(std::iter::once(self.exception_column.as_str()))
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table_name(kind),
            columns.join(", "),
            placeholders
        )
    }

    /// Write every record in one transaction.
    ///
    /// On any failure the transaction is rolled back and nothing is written.
    pub fn commit(&mut self, records: &[OutputRecord]) -> Result<CommitStats> {
        let http_sql = self.insert_sql(RequestKind::HttpRequest);
        let js_sql = self.insert_sql(RequestKind::Javascript);

        let tx = self.conn.transaction().map_err(Error::SinkTransaction)?;
        match insert_all(&tx, records, &http_sql, &js_sql) {
            Ok(stats) => {
                tx.commit().map_err(Error::SinkTransaction)?;
                log::info!(
                    "committed {} http request and {} script records",
                    stats.http_requests,
                    stats.javascripts
                );
                Ok(stats)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::warn!("rollback failed: {}", rollback_err);
                }
                Err(Error::SinkTransaction(e))
            }
        }
    }
}

fn insert_all(
    tx: &Transaction<'_>,
    records: &[OutputRecord],
    http_sql: &str,
    js_sql: &str,
) -> rusqlite::Result<CommitStats> {
    let mut http_stmt = tx.prepare(http_sql)?;
    let mut js_stmt = tx.prepare(js_sql)?;
    let mut stats = CommitStats::default();

    for record in records {
        let mut params: Vec<&dyn ToSql> = vec![&record.id, &record.visit_id, &record.site_url, &record.target_url];
        if record.kind == RequestKind::Javascript {
            params.push(&record.document_url);
        }
        params.push(&record.top_level_url);
        params.extend(record.blocked.iter().map(|b| b as &dyn ToSql));
        params.push(&record.exception);

        match record.kind {
            RequestKind::HttpRequest => {
                http_stmt.execute(params.as_slice())?;
                stats.http_requests += 1;
            }
            RequestKind::Javascript => {
                js_stmt.execute(params.as_slice())?;
                stats.javascripts += 1;
            }
        }
    }

    Ok(stats)
}
