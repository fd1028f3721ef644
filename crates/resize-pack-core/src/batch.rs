use std::collections::{BTreeMap, HashSet};
use std::sync::mpsc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::archive::{entry_name, ArchiveBuilder};
use crate::cancel::{CancellationToken, CancelledError};
use crate::error::{ArchiveError, PackError, TranscodeError, ValidationError};
use crate::plan::{self, PlannedDimensions, ResizeRequest};
use crate::transcode::{self, TranscodeResult};
use crate::{Progress, ProgressCallback};

/// Most images a single batch may hold.
pub const MAX_BATCH_SIZE: usize = 30;

/// One image admitted to a batch.
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Unique display name, usually the file name
    pub identifier: String,
    /// Raw encoded bytes as supplied by the caller
    pub bytes: Vec<u8>,
    pub original_width: u32,
    pub original_height: u32,
}

impl SourceImage {
    pub fn new(
        identifier: impl Into<String>,
        bytes: Vec<u8>,
        original_width: u32,
        original_height: u32,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            bytes,
            original_width,
            original_height,
        }
    }
}

/// An image that could not be transcoded. The batch keeps going without it.
#[derive(Debug)]
pub struct ItemFailure {
    pub identifier: String,
    pub error: TranscodeError,
}

pub type ItemOutcome = Result<TranscodeResult, ItemFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Everything a finished batch produced, in submission order.
#[derive(Debug)]
pub struct BatchState {
    pub total: usize,
    pub completed: usize,
    pub results: Vec<TranscodeResult>,
    pub failures: Vec<ItemFailure>,
    pub status: BatchStatus,
}

impl BatchState {
    pub fn failed_identifiers(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.identifier.clone()).collect()
    }

    /// Package the successful results, in order, into a finished zip.
    ///
    /// The results are consumed either way; if the archive cannot be built
    /// the batch ends up `Failed`.
    pub fn archive(&mut self) -> Result<Vec<u8>, ArchiveError> {
        let results = std::mem::take(&mut self.results);
        build_archive(results).inspect_err(|_| self.status = BatchStatus::Failed)
    }
}

fn build_archive(results: Vec<TranscodeResult>) -> Result<Vec<u8>, ArchiveError> {
    let mut builder = ArchiveBuilder::new();
    for result in results {
        builder.add(entry_name(&result.identifier), result.bytes)?;
    }
    builder.finalize()?;
    Ok(builder.into_bytes().unwrap_or_default())
}

/// A single pass over a batch of images.
///
/// Iterating yields one outcome per image in input order and reports
/// progress after each one. The run cannot be restarted once exhausted.
pub struct BatchRun<'a> {
    items: &'a [SourceImage],
    plans: Vec<PlannedDimensions>,
    progress: &'a ProgressCallback<'a>,
    cancel: Option<&'a CancellationToken>,
    completed: usize,
    status: BatchStatus,
}

impl<'a> BatchRun<'a> {
    /// Validate the request and every item up front. Nothing is transcoded
    /// unless the whole batch is acceptable.
    pub fn new(
        items: &'a [SourceImage],
        request: &ResizeRequest,
        progress: &'a ProgressCallback<'a>,
        cancel: Option<&'a CancellationToken>,
    ) -> Result<Self, ValidationError> {
        request.validate()?;
        if items.len() > MAX_BATCH_SIZE {
            return Err(ValidationError::BatchTooLarge {
                count: items.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        let mut seen = HashSet::with_capacity(items.len());
        for item in items {
            if !seen.insert(item.identifier.as_str()) {
                return Err(ValidationError::DuplicateIdentifier(item.identifier.clone()));
            }
        }

        let plans = items
            .iter()
            .map(|item| {
                plan::plan(item.original_width, item.original_height, request)
                    .map_err(|e| ValidationError::for_item(&item.identifier, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            items,
            plans,
            progress,
            cancel,
            completed: 0,
            status: BatchStatus::Idle,
        })
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// Run every remaining image one at a time and collect the results.
    pub fn finish(mut self) -> Result<BatchState, CancelledError> {
        let mut results = Vec::with_capacity(self.items.len());
        let mut failures = Vec::new();
        for outcome in self.by_ref() {
            match outcome? {
                Ok(result) => results.push(result),
                Err(failure) => failures.push(failure),
            }
        }
        Ok(self.into_state(results, failures))
    }

    /// Transcode on a pool of `threads` workers (0 = one per CPU).
    ///
    /// Outcomes are put back into submission order before progress is
    /// reported, so callers observe the same sequence as [`finish`](Self::finish).
    pub fn finish_parallel(mut self, threads: usize) -> Result<BatchState, PackError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        self.start();

        let items = self.items;
        let plans = std::mem::take(&mut self.plans);
        let cancel = self.cancel;
        let (tx, rx) = mpsc::channel::<(usize, Option<ItemOutcome>)>();

        let mut results = Vec::with_capacity(items.len());
        let mut failures = Vec::new();
        let mut pending: BTreeMap<usize, Option<ItemOutcome>> = BTreeMap::new();
        let mut cancelled = false;

        std::thread::scope(|s| {
            let pool = &pool;
            let plans = &plans;
            s.spawn(move || {
                pool.install(|| {
                    items
                        .par_iter()
                        .zip(plans.par_iter())
                        .enumerate()
                        .for_each_with(tx, |tx, (index, (item, planned))| {
                            // None marks an item skipped because of cancellation
                            let outcome = match cancel {
                                Some(token) if token.is_cancelled() => None,
                                _ => Some(transcode_item(item, *planned)),
                            };
                            let _ = tx.send((index, outcome));
                        });
                });
            });

            // Release outcomes only once every earlier one has been reported
            for (index, outcome) in rx {
                if cancelled {
                    continue;
                }
                pending.insert(index, outcome);
                while let Some(next) = pending.remove(&self.completed) {
                    let Some(outcome) = next else {
                        cancelled = true;
                        break;
                    };
                    self.record(outcome_identifier(&outcome));
                    match outcome {
                        Ok(result) => results.push(result),
                        Err(failure) => failures.push(failure),
                    }
                }
            }
        });

        if cancelled {
            self.status = BatchStatus::Cancelled;
            info!(completed = self.completed, total = self.total(), "batch cancelled");
            return Err(CancelledError.into());
        }
        self.complete();
        Ok(self.into_state(results, failures))
    }

    fn start(&mut self) {
        if self.status == BatchStatus::Idle {
            self.status = BatchStatus::Running;
            debug!(total = self.total(), "batch started");
        }
    }

    fn record(&mut self, identifier: &str) {
        self.completed += 1;
        (self.progress)(&Progress {
            completed: self.completed,
            total: self.total(),
            identifier: Some(identifier.to_string()),
        });
    }

    fn complete(&mut self) {
        if self.items.is_empty() {
            (self.progress)(&Progress {
                completed: 0,
                total: 0,
                identifier: None,
            });
        }
        self.status = BatchStatus::Completed;
        info!(total = self.total(), "batch completed");
    }

    fn into_state(self, results: Vec<TranscodeResult>, failures: Vec<ItemFailure>) -> BatchState {
        BatchState {
            total: self.items.len(),
            completed: self.completed,
            results,
            failures,
            status: self.status,
        }
    }
}

impl Iterator for BatchRun<'_> {
    type Item = Result<ItemOutcome, CancelledError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.status {
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled => return None,
            BatchStatus::Idle => self.start(),
            BatchStatus::Running => {}
        }

        let items = self.items;
        let Some(item) = items.get(self.completed) else {
            self.complete();
            return None;
        };

        if let Some(token) = self.cancel {
            if let Err(err) = token.check() {
                self.status = BatchStatus::Cancelled;
                info!(completed = self.completed, total = self.total(), "batch cancelled");
                return Some(Err(err));
            }
        }

        let outcome = transcode_item(item, self.plans[self.completed]);
        self.record(&item.identifier);
        Some(Ok(outcome))
    }
}

fn outcome_identifier(outcome: &ItemOutcome) -> &str {
    match outcome {
        Ok(result) => &result.identifier,
        Err(failure) => &failure.identifier,
    }
}

fn transcode_item(item: &SourceImage, planned: PlannedDimensions) -> ItemOutcome {
    debug!(
        identifier = %item.identifier,
        width = planned.width,
        height = planned.height,
        "transcoding image"
    );
    match transcode::transcode(&item.bytes, planned) {
        Ok(bytes) => Ok(TranscodeResult {
            identifier: item.identifier.clone(),
            bytes,
        }),
        Err(error) => {
            warn!(identifier = %item.identifier, %error, "skipping image");
            Err(ItemFailure {
                identifier: item.identifier.clone(),
                error,
            })
        }
    }
}
