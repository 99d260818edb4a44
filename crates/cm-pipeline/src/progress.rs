/// Receives periodic progress from a run.
pub trait ProgressReporter: Send + Sync {
    /// Called every `progress_interval` rows with the rows processed so far.
    fn report(&self, processed: u64, expected_total: Option<u64>);

    /// Called once after both streams are drained.
    fn finish(&self, _processed: u64) {}
}

/// Logs progress as a percentage of the expected total.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, processed: u64, expected_total: Option<u64>) {
        match percent(processed, expected_total) {
            Some(pct) => log::info!("Progress: {}%", pct),
            None => log::info!("Progress: {} rows", processed),
        }
    }

    fn finish(&self, processed: u64) {
        log::info!("classified {} rows", processed);
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _processed: u64, _expected_total: Option<u64>) {}
}

fn percent(processed: u64, expected_total: Option<u64>) -> Option<u64> {
    match expected_total {
        Some(total) if total > 0 => Some(((processed as f64 * 100.0) / total as f64).round() as u64),
        _ => None,
    }
}
