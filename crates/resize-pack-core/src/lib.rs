pub mod archive;
pub mod batch;
pub mod cancel;
pub mod error;
pub mod plan;
pub mod transcode;

#[cfg(test)]
mod testutil;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub use archive::{entry_name, ArchiveBuilder, ARCHIVE_FILENAME, ENTRY_PREFIX};
pub use batch::{BatchRun, BatchState, BatchStatus, SourceImage, MAX_BATCH_SIZE};
pub use cancel::{CancellationToken, CancelledError};
pub use error::{ArchiveError, PackError, Result, TranscodeError, ValidationError};
pub use plan::{plan, PlannedDimensions, ResizeRequest, MAX_DIMENSION, MIN_DIMENSION};
pub use transcode::{transcode, SourceFormat, TranscodeResult, OUTPUT_QUALITY};

/// Progress after one image has been handled.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// The image just handled; `None` for the single event of an empty batch
    pub identifier: Option<String>,
}

impl Progress {
    /// Fraction of the batch done, in `[0, 1]`. An empty batch counts as done.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Type alias for progress callback. The callback may borrow from the caller.
pub type ProgressCallback<'a> = dyn Fn(&Progress) + Send + Sync + 'a;

/// Tally handed back with the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSummary {
    pub succeeded: u64,
    pub failed: u64,
    #[serde(default)]
    pub failed_identifiers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Finished zip archive
    pub archive: Vec<u8>,
    pub summary: PackSummary,
}

/// How images are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Execution {
    /// One image at a time on the calling thread.
    #[default]
    Sequential,
    /// A bounded worker pool; 0 threads means one per CPU.
    Parallel { threads: usize },
}

/// Control options for process execution (scheduling, cancellation).
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    pub execution: Execution,
    /// Cancellation token, checked between images.
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    /// Create a new ProcessControl with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Create ProcessControl with a cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Resize every image and package the results, reporting progress per image.
pub fn process(
    items: &[SourceImage],
    request: &ResizeRequest,
    progress_callback: &ProgressCallback<'_>,
) -> Result<ProcessResult> {
    process_with_control(items, request, &ProcessControl::default(), progress_callback)
}

/// Run the full pipeline with progress reporting and control options.
///
/// Either returns a complete archive with the success/failure tally, or a
/// single fatal error and no archive at all.
pub fn process_with_control(
    items: &[SourceImage],
    request: &ResizeRequest,
    control: &ProcessControl,
    progress_callback: &ProgressCallback<'_>,
) -> Result<ProcessResult> {
    let run = BatchRun::new(items, request, progress_callback, control.cancel_token.as_ref())?;

    let mut state = match control.execution {
        Execution::Sequential => run.finish()?,
        Execution::Parallel { threads } => run.finish_parallel(threads)?,
    };

    let failed_identifiers = state.failed_identifiers();
    let archive = match state.archive() {
        Ok(archive) => archive,
        Err(err) => {
            error!(error = %err, status = ?state.status, "failed to build archive");
            return Err(err.into());
        }
    };

    let summary = PackSummary {
        succeeded: (state.total - failed_identifiers.len()) as u64,
        failed: failed_identifiers.len() as u64,
        failed_identifiers,
    };
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        bytes = archive.len(),
        "archive ready"
    );

    Ok(ProcessResult { archive, summary })
}
