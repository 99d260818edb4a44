//! Crawl store reader
//!
//! Both request queries run on one read-only SQLite connection owned by a
//! blocking thread. The thread steps the two cursors in turn, one row each,
//! and forwards rows into bounded channels, so the two streams advance
//! together and a slow consumer throttles the reader.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, Row, Rows};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use cm_core::RequestType;

use crate::error::{Error, Result};

const HTTP_REQUESTS_QUERY: &str = "SELECT hr.id, sv.visit_id, sv.site_url, hr.url, hr.top_level_url \
     FROM site_visits sv INNER JOIN http_requests hr ON sv.visit_id = hr.visit_id";

const JAVASCRIPTS_QUERY: &str = "SELECT js.id, sv.visit_id, sv.site_url, js.script_url, js.document_url, js.top_level_url \
     FROM site_visits sv INNER JOIN javascript js ON sv.visit_id = js.visit_id";

// =============================================================================
// Records
// =============================================================================

/// Which crawl table a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    HttpRequest,
    Javascript,
}

impl RequestKind {
    pub const ALL: [RequestKind; 2] = [RequestKind::HttpRequest, RequestKind::Javascript];

    /// Name of the source query, used in errors and logs.
    pub fn query_name(self) -> &'static str {
        match self {
            RequestKind::HttpRequest => "http_requests",
            RequestKind::Javascript => "javascripts",
        }
    }

    fn query(self) -> &'static str {
        match self {
            RequestKind::HttpRequest => HTTP_REQUESTS_QUERY,
            RequestKind::Javascript => JAVASCRIPTS_QUERY,
        }
    }

    /// Resource type the request is checked as.
    ///
    /// Crawled HTTP requests carry no reliable type, so they are checked as
    /// generic `xmlhttprequest` sub-resources.
    pub fn request_type(self) -> RequestType {
        match self {
            RequestKind::HttpRequest => RequestType::XMLHTTPREQUEST,
            RequestKind::Javascript => RequestType::SCRIPT,
        }
    }

    fn read_row(self, row: &Row<'_>) -> rusqlite::Result<RequestRecord> {
        let text = |idx: usize| -> rusqlite::Result<String> {
            Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
        };

        Ok(match self {
            RequestKind::HttpRequest => RequestRecord {
                id: row.get(0)?,
                visit_id: row.get(1)?,
                site_url: text(2)?,
                target_url: text(3)?,
                top_level_url: text(4)?,
                document_url: None,
                kind: self,
            },
            RequestKind::Javascript => RequestRecord {
                id: row.get(0)?,
                visit_id: row.get(1)?,
                site_url: text(2)?,
                target_url: text(3)?,
                document_url: row.get(4)?,
                top_level_url: text(5)?,
                kind: self,
            },
        })
    }
}

/// One crawled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub id: i64,
    pub visit_id: i64,
    pub site_url: String,
    /// Request URL, or script URL for script loads
    pub target_url: String,
    pub top_level_url: String,
    /// Script loads only
    pub document_url: Option<String>,
    pub kind: RequestKind,
}

// =============================================================================
// Source
// =============================================================================

/// Read-only crawl store.
pub struct RequestSource {
    path: PathBuf,
    conn: Connection,
}

impl RequestSource {
    /// Open the crawl store and check that both queries can be prepared.
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |source| Error::SourceOpen {
            path: path.to_path_buf(),
            source,
        };

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;
        for kind in RequestKind::ALL {
            conn.prepare(kind.query()).map_err(open_err)?;
        }

        log::info!("connected to crawl database {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows both queries will produce.
    pub fn count_rows(&self) -> Result<u64> {
        let mut total = 0u64;
        for kind in RequestKind::ALL {
            let sql = format!("SELECT COUNT(*) FROM ({})", kind.query());
            let count: i64 = self
                .conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(|source| Error::SourceStream {
                    query: kind.query_name(),
                    source,
                })?;
            total += count as u64;
        }
        Ok(total)
    }

    /// Start streaming both queries.
    ///
    /// Must be called from within a tokio runtime.
    pub fn stream(self, capacity: usize) -> RequestStreams {
        let (http_tx, http_rx) = mpsc::channel(capacity);
        let (js_tx, js_rx) = mpsc::channel(capacity);

        let conn = self.conn;
        let reader = tokio::task::spawn_blocking(move || run_reader(conn, http_tx, js_tx));

        RequestStreams {
            http_requests: RowStream::new(RequestKind::HttpRequest, http_rx),
            javascripts: RowStream::new(RequestKind::Javascript, js_rx),
            reader,
        }
    }
}

// =============================================================================
// Streams
// =============================================================================

type RowItem = Result<RequestRecord>;

/// A single-pass stream of rows from one query.
pub struct RowStream {
    kind: RequestKind,
    rx: mpsc::Receiver<RowItem>,
}

impl RowStream {
    fn new(kind: RequestKind, rx: mpsc::Receiver<RowItem>) -> Self {
        Self { kind, rx }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Next row; `None` once the query is exhausted.
    pub async fn next(&mut self) -> Option<RowItem> {
        self.rx.recv().await
    }
}

/// The two request streams and the reader feeding them.
pub struct RequestStreams {
    pub http_requests: RowStream,
    pub javascripts: RowStream,
    pub reader: JoinHandle<()>,
}

impl RequestStreams {
    /// Wait for the reader thread to exit.
    pub async fn join_reader(reader: JoinHandle<()>) -> Result<()> {
        reader.await.map_err(|e| Error::Reader(e.to_string()))
    }
}

// =============================================================================
// Reader thread
// =============================================================================

/// One query cursor and the channel it feeds.
struct Feed<'stmt> {
    kind: RequestKind,
    rows: Rows<'stmt>,
    tx: mpsc::Sender<RowItem>,
    sent: u64,
}

impl Feed<'_> {
    /// Forward one row. Returns `false` once the feed is finished: the query
    /// is exhausted, failed, or nobody is listening any more.
    fn pump(&mut self) -> bool {
        let item = match self.rows.next() {
            Ok(Some(row)) => self.kind.read_row(row),
            Ok(None) => {
                log::debug!("{}: {} rows read", self.kind.query_name(), self.sent);
                return false;
            }
            Err(e) => Err(e),
        };

        match item {
            Ok(record) => {
                if record.target_url.is_empty() {
                    log::warn!("{} row {} has no URL", self.kind.query_name(), record.id);
                }
                self.sent += 1;
                self.tx.blocking_send(Ok(record)).is_ok()
            }
            Err(source) => {
                let err = Error::SourceStream {
                    query: self.kind.query_name(),
                    source,
                };
                // Either way this feed is done
                let _ = self.tx.blocking_send(Err(err));
                false
            }
        }
    }
}

fn fail(tx: &mpsc::Sender<RowItem>, kind: RequestKind, source: rusqlite::Error) {
    let _ = tx.blocking_send(Err(Error::SourceStream {
        query: kind.query_name(),
        source,
    }));
}

fn run_reader(conn: Connection, http_tx: mpsc::Sender<RowItem>, js_tx: mpsc::Sender<RowItem>) {
    let mut http_stmt = match conn.prepare(RequestKind::HttpRequest.query()) {
        Ok(stmt) => stmt,
        Err(e) => return fail(&http_tx, RequestKind::HttpRequest, e),
    };
    let mut js_stmt = match conn.prepare(RequestKind::Javascript.query()) {
        Ok(stmt) => stmt,
        Err(e) => return fail(&js_tx, RequestKind::Javascript, e),
    };

    let http_rows = match http_stmt.query([]) {
        Ok(rows) => rows,
        Err(e) => return fail(&http_tx, RequestKind::HttpRequest, e),
    };
    let js_rows = match js_stmt.query([]) {
        Ok(rows) => rows,
        Err(e) => return fail(&js_tx, RequestKind::Javascript, e),
    };

    let mut feeds = vec![
        Feed {
            kind: RequestKind::HttpRequest,
            rows: http_rows,
            tx: http_tx,
            sent: 0,
        },
        Feed {
            kind: RequestKind::Javascript,
            rows: js_rows,
            tx: js_tx,
            sent: 0,
        },
    ];

    // Round-robin until every feed is finished; dropping a feed closes its
    // channel.
    while !feeds.is_empty() {
        feeds.retain_mut(|feed| feed.pump());
    }
}
