use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rusqlite::Connection;
use tempfile::TempDir;

use cm_pipeline::{
    Error, NoProgress, Pipeline, PipelineConfig, ProgressReporter, RuleSetConfig, RunSummary,
};

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_list(&self, file: &str, text: &str) -> PathBuf {
        let path = self.path(file);
        std::fs::write(&path, text).unwrap();
        path
    }

    /// Crawl store with one visit and the given requests and scripts.
    fn crawl_db(&self, requests: &[(i64, &str, &str)], scripts: &[(i64, &str, &str)]) -> PathBuf {
        let path = self.path("crawl.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE site_visits (visit_id INTEGER PRIMARY KEY, site_url TEXT);
             CREATE TABLE http_requests (id INTEGER PRIMARY KEY, visit_id INTEGER, url TEXT, top_level_url TEXT);
             CREATE TABLE javascript (id INTEGER PRIMARY KEY, visit_id INTEGER, script_url TEXT, document_url TEXT, top_level_url TEXT);
             INSERT INTO site_visits VALUES (1, 'http://example.com');",
        )
        .unwrap();
        for (id, url, page) in requests {
            conn.execute(
                "INSERT INTO http_requests VALUES (?1, 1, ?2, ?3)",
                rusqlite::params![id, url, page],
            )
            .unwrap();
        }
        for (id, url, page) in scripts {
            conn.execute(
                "INSERT INTO javascript VALUES (?1, 1, ?2, ?3, ?3)",
                rusqlite::params![id, url, page],
            )
            .unwrap();
        }
        path
    }

    fn config(&self, crawl_db: PathBuf, output: &str, block_lists: Vec<RuleSetConfig>, exceptions: &str) -> PipelineConfig {
        PipelineConfig {
            crawl_db,
            output_db: self.path(output),
            block_lists,
            exception_list: RuleSetConfig::new("exceptionlist", self.write_list("exceptionrules.txt", exceptions)),
            progress_interval: 1,
            channel_capacity: 2,
            expected_total: None,
        }
    }

    fn default_lists(&self, easylist: &str, easyprivacy: &str) -> Vec<RuleSetConfig> {
        vec![
            RuleSetConfig::new("easylist", self.write_list("easylist.txt", easylist)),
            RuleSetConfig::new("easyprivacy", self.write_list("easyprivacy.txt", easyprivacy)),
        ]
    }
}

async fn run(config: PipelineConfig) -> Result<RunSummary, Error> {
    Pipeline::from_config(config)?.with_reporter(NoProgress).run().await
}

/// `(id, flags...)` rows of an output table, ordered by id.
fn rows(db: &Path, table: &str, columns: &[&str]) -> Vec<Vec<i64>> {
    let conn = Connection::open(db).unwrap();
    let sql = format!("SELECT id, {} FROM {} ORDER BY id", columns.join(", "), table);
    let mut stmt = conn.prepare(&sql).unwrap();
    let width = columns.len() + 1;
    stmt.query_map([], |row| (0..width).map(|i| row.get(i)).collect::<rusqlite::Result<Vec<i64>>>())
        .unwrap()
        .collect::<rusqlite::Result<Vec<Vec<i64>>>>()
        .unwrap()
}

const FLAGS: &[&str] = &["easylist", "easyprivacy", "exceptionlist"];

#[tokio::test]
async fn exception_scenarios() {
    let fx = Fixture::new();
    let crawl = fx.crawl_db(
        &[
            (1, "http://ads.example.com", "http://example.com/helloworld"),
            (2, "http://ads.example.com", "http://facebook.com"),
            (3, "http://clean.org/index.html", "http://example.com/helloworld"),
        ],
        &[],
    );
    let config = fx.config(crawl, "out.sqlite", fx.default_lists("ads.example.com\n", ""), "@@example.com^\n");
    let output = config.output_db.clone();

    let summary = run(config).await.unwrap();
    assert_eq!(summary.http_requests, 3);
    assert_eq!(summary.kept_http_requests, 2);

    assert_eq!(
        rows(&output, "http_requests_abp", FLAGS),
        vec![vec![1, 1, 0, 1], vec![2, 1, 0, 0]]
    );
}

#[tokio::test]
async fn one_record_per_matched_request() {
    let fx = Fixture::new();
    let crawl = fx.crawl_db(
        &[(1, "https://tracker.net/p.gif", "https://news.com/")],
        &[
            (10, "https://cdn.ads.net/ad.js", "https://news.com/"),
            (11, "https://news.com/app.js", "https://news.com/"),
        ],
    );
    let config = fx.config(
        crawl,
        "out.sqlite",
        fx.default_lists("||ads.net^\n", "||tracker.net^\n||ads.net^$script\n"),
        "",
    );
    let output = config.output_db.clone();

    let summary = run(config).await.unwrap();
    assert_eq!(
        summary,
        RunSummary {
            http_requests: 1,
            javascripts: 2,
            kept_http_requests: 1,
            kept_javascripts: 1,
        }
    );

    assert_eq!(rows(&output, "http_requests_abp", FLAGS), vec![vec![1, 0, 1, 0]]);
    assert_eq!(rows(&output, "javascripts_abp", FLAGS), vec![vec![10, 1, 1, 0]]);

    let conn = Connection::open(&output).unwrap();
    let (script_url, document_url): (String, String) = conn
        .query_row("SELECT script_url, document_url FROM javascripts_abp", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(script_url, "https://cdn.ads.net/ad.js");
    assert_eq!(document_url, "https://news.com/");
}

#[tokio::test]
async fn no_match_writes_nothing() {
    let fx = Fixture::new();
    let crawl = fx.crawl_db(&[(1, "https://site.com/a.png", "https://site.com/")], &[]);
    let config = fx.config(crawl, "out.sqlite", fx.default_lists("||ads.net^\n", "||tracker.net^\n"), "@@site.com^\n");
    let output = config.output_db.clone();

    let summary = run(config).await.unwrap();
    assert_eq!(summary.kept_http_requests, 0);
    assert!(rows(&output, "http_requests_abp", FLAGS).is_empty());
}

#[tokio::test]
async fn exception_flag_is_or_across_many_lists() {
    let fx = Fixture::new();
    let crawl = fx.crawl_db(
        &[
            (1, "https://ads.example.com/banner.gif", "https://example.com/"),
            (2, "https://ads.example.com/banner.gif", "https://other.com/"),
        ],
        &[],
    );
    let lists = vec![
        RuleSetConfig::new("list_a", fx.write_list("a.txt", "||ads.example.com^\n")),
        RuleSetConfig::new("list_b", fx.write_list("b.txt", "/banner.$important\n")),
        RuleSetConfig::new("list_c", fx.write_list("c.txt", "||unrelated.com^\n")),
    ];
    let config = fx.config(crawl, "out.sqlite", lists, "@@||ads.example.com^$xhr,domain=example.com\n");
    let output = config.output_db.clone();

    run(config).await.unwrap();

    // list_b's important block cannot be excepted, list_a's can
    assert_eq!(
        rows(&output, "http_requests_abp", &["list_a", "list_b", "list_c", "exceptionlist"]),
        vec![vec![1, 1, 1, 0, 1], vec![2, 1, 1, 0, 0]]
    );
}

#[tokio::test]
async fn runs_are_idempotent() {
    let fx = Fixture::new();
    let requests: Vec<(i64, String, &str)> = (0..50)
        .map(|i| {
            let host = if i % 3 == 0 { "ads.example.com" } else { "static.example.com" };
            (i, format!("http://{host}/r{i}.js"), "http://example.com/")
        })
        .collect();
    let borrowed: Vec<(i64, &str, &str)> = requests.iter().map(|(i, u, p)| (*i, u.as_str(), *p)).collect();
    let crawl = fx.crawl_db(&borrowed, &borrowed);
    let lists = fx.default_lists("||ads.example.com^\n", "/r1*.js\n");

    let first = fx.config(crawl.clone(), "first.sqlite", lists.clone(), "@@||ads.example.com/r3*$script\n");
    let second = fx.config(crawl, "second.sqlite", lists, "@@||ads.example.com/r3*$script\n");
    let (first_out, second_out) = (first.output_db.clone(), second.output_db.clone());

    let a = run(first).await.unwrap();
    let b = run(second).await.unwrap();
    assert_eq!(a, b);

    for table in ["http_requests_abp", "javascripts_abp"] {
        let left: BTreeSet<Vec<i64>> = rows(&first_out, table, FLAGS).into_iter().collect();
        let right: BTreeSet<Vec<i64>> = rows(&second_out, table, FLAGS).into_iter().collect();
        assert!(!left.is_empty());
        assert_eq!(left, right);
    }
}

#[tokio::test]
async fn failed_commit_is_rolled_back() {
    let fx = Fixture::new();
    let crawl = fx.crawl_db(
        &[
            (1, "http://ads.example.com/1", "http://site.com/"),
            (2, "http://ads.example.com/2", "http://site.com/"),
        ],
        &[],
    );
    let config = fx.config(crawl, "out.sqlite", fx.default_lists("||ads.example.com^\n", ""), "");
    let output = config.output_db.clone();

    // A leftover row makes the second insert hit the primary key
    {
        let pipeline = Pipeline::from_config(config.clone()).unwrap();
        let store = pipeline.open_output().unwrap();
        drop(store);
        let conn = Connection::open(&output).unwrap();
        conn.execute(
            "INSERT INTO http_requests_abp (id, url, easylist, easyprivacy, exceptionlist) VALUES (2, 'x', 0, 0, 0)",
            [],
        )
        .unwrap();
    }

    let err = run(config).await.unwrap_err();
    assert!(matches!(err, Error::SinkTransaction(_)));
    assert_eq!(rows(&output, "http_requests_abp", FLAGS), vec![vec![2, 0, 0, 0]]);
}

#[tokio::test]
async fn compile_error_stops_before_classification() {
    let fx = Fixture::new();
    let crawl = fx.crawl_db(&[(1, "http://ads.example.com", "http://site.com/")], &[]);
    let config = fx.config(crawl, "out.sqlite", fx.default_lists("||ads.example.com^\n", "/(oops/\n"), "");
    let output = config.output_db.clone();

    match run(config).await {
        Err(Error::RuleCompile { name, source }) => {
            assert_eq!(name, "easyprivacy");
            assert_eq!(source.line, 1);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!output.exists());
}

#[tokio::test]
async fn missing_crawl_store_is_source_error() {
    let fx = Fixture::new();
    let config = fx.config(fx.path("missing.sqlite"), "out.sqlite", fx.default_lists("", ""), "");

    assert!(matches!(run(config).await, Err(Error::SourceOpen { .. })));
}

#[tokio::test]
async fn unreadable_row_aborts_the_run() {
    let fx = Fixture::new();
    let crawl = fx.path("crawl.sqlite");
    let conn = Connection::open(&crawl).unwrap();
    conn.execute_batch(
        "CREATE TABLE site_visits (visit_id INTEGER PRIMARY KEY, site_url TEXT);
         CREATE TABLE http_requests (id, visit_id INTEGER, url TEXT, top_level_url TEXT);
         CREATE TABLE javascript (id INTEGER PRIMARY KEY, visit_id INTEGER, script_url TEXT, document_url TEXT, top_level_url TEXT);
         INSERT INTO site_visits VALUES (1, 'http://example.com');
         INSERT INTO http_requests VALUES (1, 1, 'https://ads.net/a.js', 'http://example.com/');
         INSERT INTO http_requests VALUES (2, 1, 'https://ads.net/b.js', 'http://example.com/');
         INSERT INTO http_requests VALUES ('third', 1, 'https://ads.net/c.js', 'http://example.com/');
         INSERT INTO javascript VALUES (1, 1, 'https://ads.net/d.js', 'http://example.com/', 'http://example.com/');",
    )
    .unwrap();
    drop(conn);

    let config = fx.config(crawl, "out.sqlite", fx.default_lists("||ads.net^\n", ""), "");
    let output = config.output_db.clone();

    match run(config).await {
        Err(Error::SourceStream { query, source }) => {
            assert_eq!(query, "http_requests");
            assert!(matches!(source, rusqlite::Error::InvalidColumnType(0, ..)), "{source:?}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    // nothing was written, not even the tables
    assert!(!output.exists());
}

#[derive(Default)]
struct Counts {
    calls: AtomicU64,
    last: AtomicU64,
    finished: AtomicU64,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Counts>);

impl ProgressReporter for Recorder {
    fn report(&self, processed: u64, expected_total: Option<u64>) {
        assert_eq!(expected_total, Some(10));
        self.0.calls.fetch_add(1, Ordering::Relaxed);
        self.0.last.store(processed, Ordering::Relaxed);
    }

    fn finish(&self, processed: u64) {
        self.0.finished.store(processed, Ordering::Relaxed);
    }
}

#[tokio::test]
async fn progress_is_reported_per_interval() {
    let fx = Fixture::new();
    let requests: Vec<(i64, String)> = (0..6).map(|i| (i, format!("http://a.com/{i}"))).collect();
    let scripts: Vec<(i64, String)> = (0..4).map(|i| (i, format!("http://a.com/{i}.js"))).collect();
    let crawl = fx.crawl_db(
        &requests.iter().map(|(i, u)| (*i, u.as_str(), "http://a.com/")).collect::<Vec<_>>(),
        &scripts.iter().map(|(i, u)| (*i, u.as_str(), "http://a.com/")).collect::<Vec<_>>(),
    );
    let mut config = fx.config(crawl, "out.sqlite", fx.default_lists("", ""), "");
    config.progress_interval = 3;

    let recorder = Recorder::default();
    Pipeline::from_config(config)
        .unwrap()
        .with_reporter(recorder.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(recorder.0.calls.load(Ordering::Relaxed), 3);
    assert_eq!(recorder.0.last.load(Ordering::Relaxed), 9);
    assert_eq!(recorder.0.finished.load(Ordering::Relaxed), 10);
}
