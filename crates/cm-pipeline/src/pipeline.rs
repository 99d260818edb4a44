//! Pipeline driver
//!
//! Streams both request queries concurrently, classifies every row against
//! all engine pairs, buffers matches and commits them in one transaction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::aggregate::{aggregate, OutputRecord};
use crate::classify::classify;
use crate::config::PipelineConfig;
use crate::engines::{build_engines, EnginePair};
use crate::error::{Error, Result};
use crate::progress::{LogProgress, ProgressReporter};
use crate::rules::RuleSources;
use crate::sink::{BatchSink, OutputStore};
use crate::source::{RequestKind, RequestSource, RequestStreams, RowStream};

/// Counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows read per query
    pub http_requests: u64,
    pub javascripts: u64,
    /// Records written per table
    pub kept_http_requests: usize,
    pub kept_javascripts: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    engines: Vec<EnginePair>,
    reporter: Box<dyn ProgressReporter>,
}

impl Pipeline {
    /// Use already built engines, one per entry of `config.block_lists`
    /// and in the same order.
    pub fn new(config: PipelineConfig, engines: Vec<EnginePair>) -> Result<Self> {
        let expected = config.block_lists.iter().map(|list| list.name.as_str());
        if !expected.eq(engines.iter().map(|pair| pair.name.as_str())) {
            return Err(Error::Config(format!(
                "engines [{}] do not match block lists [{}]",
                engines.iter().map(|pair| pair.name.as_str()).collect::<Vec<_>>().join(", "),
                config.block_lists.iter().map(|list| list.name.as_str()).collect::<Vec<_>>().join(", "),
            )));
        }

        Ok(Self {
            config,
            engines,
            reporter: Box::new(LogProgress),
        })
    }

    /// Validate the config, read every rule list and build the engines.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let sources = RuleSources::load(&config)?;
        let engines = build_engines(&sources)?;
        Self::new(config, engines)
    }

    pub fn with_reporter(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engines(&self) -> &[EnginePair] {
        &self.engines
    }

    /// Open the output store and create its tables.
    pub fn open_output(&self) -> Result<OutputStore> {
        let store = OutputStore::open(
            &self.config.output_db,
            self.config.block_lists.iter().map(|list| list.name.clone()).collect(),
            self.config.exception_list.name.clone(),
        )?;
        store.ensure_schema()?;
        Ok(store)
    }

    /// Classify the crawl store and commit all matches.
    pub async fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        log::info!("starting classification with {} block lists", self.engines.len());

        let source = RequestSource::open(&self.config.crawl_db)?;

        let expected_total = match self.config.expected_total {
            Some(total) => total,
            None => source.count_rows()?,
        };
        log::info!("{} rows to classify", expected_total);

        let sink = BatchSink::new();
        let (http_requests, javascripts) = self.classify_source(source, &sink, Some(expected_total)).await?;

        // the output store is only touched once both streams completed
        let store = self.open_output()?;
        let records = sink.into_records();
        let stats = commit(store, records).await?;

        let summary = RunSummary {
            http_requests,
            javascripts,
            kept_http_requests: stats.http_requests,
            kept_javascripts: stats.javascripts,
        };
        log::info!("run finished in {:.2?}: {:?}", start.elapsed(), summary);
        Ok(summary)
    }

    /// Drain both streams into `sink`, returning the rows read per query.
    ///
    /// The first stream error aborts both streams.
    pub async fn classify_source(
        &self,
        source: RequestSource,
        sink: &BatchSink,
        expected_total: Option<u64>,
    ) -> Result<(u64, u64)> {
        let RequestStreams {
            http_requests,
            javascripts,
            reader,
        } = source.stream(self.config.channel_capacity);
        let processed = AtomicU64::new(0);

        let (http_rows, js_rows) = tokio::try_join!(
            self.drain(http_requests, sink, &processed, expected_total),
            self.drain(javascripts, sink, &processed, expected_total),
        )?;

        RequestStreams::join_reader(reader).await?;
        self.reporter.finish(processed.load(Ordering::Relaxed));
        Ok((http_rows, js_rows))
    }

    async fn drain(
        &self,
        mut stream: RowStream,
        sink: &BatchSink,
        processed: &AtomicU64,
        expected_total: Option<u64>,
    ) -> Result<u64> {
        let interval = self.config.progress_interval;
        let mut rows = 0u64;

        while let Some(item) = stream.next().await {
            let request = item?;
            let result = classify(&request, &self.engines);
            if let Some(record) = aggregate(request, &result) {
                sink.push(record);
            }

            rows += 1;
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            if interval > 0 && done % interval == 0 {
                self.reporter.report(done, expected_total);
            }
        }

        log::debug!("{} stream drained: {} rows", stream.kind().query_name(), rows);
        Ok(rows)
    }
}

async fn commit(mut store: OutputStore, records: Vec<OutputRecord>) -> Result<crate::sink::CommitStats> {
    let kept = records.len();
    log::info!(
        "committing {} records ({} scripts)",
        kept,
        records.iter().filter(|r| r.kind == RequestKind::Javascript).count()
    );
    tokio::task::spawn_blocking(move || store.commit(&records))
        .await
        .map_err(|e| Error::CommitTask(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSetConfig;
    use crate::rules::RuleSet;

    fn engines(names: &[&str]) -> Vec<EnginePair> {
        let sources = RuleSources {
            block_lists: names.iter().map(|name| RuleSet::new(*name, "||ads.example.com^")).collect(),
            exception_list: RuleSet::new("exceptionlist", "@@example.com^"),
        };
        build_engines(&sources).unwrap()
    }

    fn config(names: &[&str]) -> PipelineConfig {
        PipelineConfig {
            block_lists: names.iter().map(|name| RuleSetConfig::new(*name, format!("{name}.txt"))).collect(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn engines_must_follow_block_lists() {
        assert!(Pipeline::new(config(&["easylist", "easyprivacy"]), engines(&["easylist", "easyprivacy"])).is_ok());

        let renamed = Pipeline::new(config(&["easylist", "easyprivacy"]), engines(&["easylist", "other"]));
        assert!(matches!(renamed, Err(Error::Config(_))));

        let reordered = Pipeline::new(config(&["easylist", "easyprivacy"]), engines(&["easyprivacy", "easylist"]));
        assert!(matches!(reordered, Err(Error::Config(_))));

        let missing = Pipeline::new(config(&["easylist", "easyprivacy"]), engines(&["easylist"]));
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
