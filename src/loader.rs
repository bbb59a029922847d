//! Batched, idempotent loading of normalized records.
//!
//! Each batch is first attempted with multi-row `INSERT OR IGNORE`
//! statements. A statement carries at most [`schema::MAX_ROWS_PER_INSERT`]
//! rows so its parameters stay within the store's per-query limit. Existing
//! rows are never overwritten: the first write for a key wins. When a bulk
//! statement fails for any reason, the records it carried and every later
//! record of the batch are replayed one by one with a conditional insert.
//! Each record's failure is counted without stopping the rest. Batches run
//! strictly in order and nothing is rolled back across batches.
//!
//! ## Attribution on the bulk path
//!
//! The store only reports an aggregate `changes` count for a bulk statement.
//! Inserted rows are taken to be that count and the remainder of the
//! statement's rows are counted as skipped. Which rows were skipped, and why,
//! is not known.

use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use log::{info, warn};
use serde::Serialize;

use crate::{
    client::QueryExecutor,
    data::Param,
    error::WbsError,
    normalize::WbsRecord,
    schema::{self, TableName},
};

pub const DEFAULT_BATCH_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordOutcome {
    Inserted,
    SkippedExisting,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub index: usize,
    pub size: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub fell_back: bool,
}

impl BatchReport {
    fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Inserted => self.inserted += 1,
            RecordOutcome::SkippedExisting => self.skipped += 1,
            RecordOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStatistics {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub batches_run: usize,
    pub fallback_batches: usize,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

impl LoadStatistics {
    pub fn processed(&self) -> usize {
        self.inserted + self.skipped + self.failed
    }

    /// Inserted records per second; zero when nothing was inserted.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if self.inserted == 0 || secs <= 0.0 {
            0.0
        } else {
            self.inserted as f64 / secs
        }
    }

    fn absorb(&mut self, report: &BatchReport) {
        self.inserted += report.inserted;
        self.skipped += report.skipped;
        self.failed += report.failed;
        self.batches_run += 1;
        if report.fell_back {
            self.fallback_batches += 1;
        }
    }
}

/// Average time per finished batch times the batches still to run.
fn estimate_remaining(elapsed: Duration, done: usize, total: usize) -> Duration {
    if done == 0 {
        return Duration::ZERO;
    }
    let secs = elapsed.as_secs_f64() / done as f64 * total.saturating_sub(done) as f64;
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

pub struct BatchLoader<E> {
    executor: E,
    table: TableName,
}

impl<E: QueryExecutor> BatchLoader<E> {
    pub fn new(executor: E, table: TableName) -> Self {
        Self { executor, table }
    }

    pub fn load(&self, records: &[WbsRecord], batch_size: NonZeroUsize) -> LoadStatistics {
        let mut stats = LoadStatistics::default();
        if records.is_empty() {
            info!("No records to load");
            return stats;
        }

        let batch_size = batch_size.get();
        let total_batches = records.len().div_ceil(batch_size);
        info!(
            "Loading {} record(s) into {} in {} batch(es) of up to {}",
            records.len(),
            self.table,
            total_batches,
            batch_size
        );

        let started = Instant::now();
        for (idx, batch) in records.chunks(batch_size).enumerate() {
            let first = idx * batch_size + 1;
            info!(
                "Processing batch {}/{} (records {}-{})",
                idx + 1,
                total_batches,
                first,
                first + batch.len() - 1
            );
            let mut report = self.load_batch(batch);
            report.index = idx;
            stats.absorb(&report);

            let elapsed = started.elapsed();
            let remaining = estimate_remaining(elapsed, stats.batches_run, total_batches);
            info!(
                "Batch {} done: {} inserted, {} skipped, {} failed ({:.1}s elapsed, ~{:.1}s remaining)",
                idx + 1,
                report.inserted,
                report.skipped,
                report.failed,
                elapsed.as_secs_f64(),
                remaining.as_secs_f64()
            );
        }
        stats.elapsed = started.elapsed();

        info!(
            "Load complete: {} inserted, {} skipped, {} failed in {:.2}s ({:.0} records/s)",
            stats.inserted,
            stats.skipped,
            stats.failed,
            stats.elapsed.as_secs_f64(),
            stats.throughput()
        );
        stats
    }

    /// Runs one batch: bulk first, per-record fallback from the first bulk statement that fails.
    pub fn load_batch(&self, batch: &[WbsRecord]) -> BatchReport {
        let mut report = BatchReport {
            size: batch.len(),
            ..BatchReport::default()
        };
        if batch.is_empty() {
            return report;
        }

        let mut committed = 0;
        let mut failure = None;
        for chunk in batch.chunks(schema::MAX_ROWS_PER_INSERT) {
            match self.bulk_upsert(chunk) {
                Ok(changes) => {
                    let inserted = changes.min(chunk.len());
                    report.inserted += inserted;
                    report.skipped += chunk.len() - inserted;
                    committed += chunk.len();
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = failure {
            let rest = &batch[committed..];
            warn!(
                "Bulk insert failed after {committed} of {} record(s), retrying {} individually: {err}",
                batch.len(),
                rest.len()
            );
            report.fell_back = true;
            for (offset, record) in rest.iter().enumerate() {
                let outcome = self.upsert_one(record).unwrap_or_else(|err| {
                    warn!(
                        "Record {} ({}) failed: {err}",
                        committed + offset + 1,
                        record.key().unwrap_or("<no key>")
                    );
                    RecordOutcome::Failed
                });
                report.record(outcome);
            }
            if report.failed < rest.len() {
                info!(
                    "Individual inserts: {}/{} succeeded",
                    rest.len() - report.failed,
                    rest.len()
                );
            }
        }
        report
    }

    fn bulk_upsert(&self, rows: &[WbsRecord]) -> Result<usize, WbsError> {
        let sql = schema::insert_or_ignore_sql(&self.table, rows.len());
        let params = rows.iter().flat_map(WbsRecord::params).collect::<Vec<_>>();
        let envelope = self.executor.query(&sql, &params)?;
        Ok(usize::try_from(envelope.changes()).unwrap_or(usize::MAX))
    }

    /// Inserts one record only if no row with its key exists yet.
    pub fn upsert_one(&self, record: &WbsRecord) -> Result<RecordOutcome, WbsError> {
        let sql = schema::insert_if_absent_sql(&self.table);
        let mut params = record.params().collect::<Vec<_>>();
        params.push(Param::from(record.values()[schema::KEY_INDEX].as_ref()));
        let envelope = self.executor.query(&sql, &params)?;
        Ok(if envelope.changes() > 0 {
            RecordOutcome::Inserted
        } else {
            RecordOutcome::SkippedExisting
        })
    }
}
