// Background batch worker: runs the pipeline on its own thread so the caller
// stays responsive, streaming logs and progress back over a channel

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

use super::page_pipeline::PagePipeline;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::{BatchProgress, BatchSummary};

/// What the worker reports back while a batch runs
#[derive(Debug)]
pub enum WorkerEvent {
    Log(String),
    Progress(BatchProgress),
    /// Always the last event sent
    Finished(PipelineResult<BatchSummary>),
}

/// Handle to a batch running on a dedicated thread.
///
/// Dropping the handle requests cancellation but does not wait for the
/// thread; use [`BatchWorker::join`] for that.
pub struct BatchWorker {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BatchWorker {
    /// Start processing `pages` into `output_dir`.
    ///
    /// The pipeline is built by `factory` on the worker thread, so model
    /// loading does not block the caller. A factory error is delivered as
    /// the `Finished` event.
    pub fn spawn<F>(
        factory: F,
        pages: Vec<PathBuf>,
        output_dir: PathBuf,
    ) -> std::io::Result<(Self, UnboundedReceiver<WorkerEvent>)>
    where
        F: FnOnce() -> PipelineResult<PagePipeline> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        let handle = std::thread::Builder::new()
            .name("batch-worker".to_string())
            .spawn(move || {
                let result = run(factory, &pages, &output_dir, &tx, &flag);
                if let Err(e) = &result {
                    error!("Batch aborted: {}", e);
                }
                // Receiver may be gone already
                let _ = tx.send(WorkerEvent::Finished(result));
            })?;

        info!("Batch worker started");
        Ok((
            Self {
                cancel,
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// Ask the worker to stop before its next page
    pub fn cancel(&self) {
        debug!("Cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Wait for the worker thread to exit
    pub fn join(mut self) -> Result<(), PipelineError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| PipelineError::Batch("batch worker panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for BatchWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.store(true, Ordering::SeqCst);
        }
    }
}

fn run<F>(
    factory: F,
    pages: &[PathBuf],
    output_dir: &std::path::Path,
    tx: &UnboundedSender<WorkerEvent>,
    cancel: &AtomicBool,
) -> PipelineResult<BatchSummary>
where
    F: FnOnce() -> PipelineResult<PagePipeline>,
{
    let mut pipeline = factory()?;
    pipeline.process_batch(
        pages,
        output_dir,
        |progress| {
            let _ = tx.send(WorkerEvent::Progress(progress));
        },
        |line| {
            let _ = tx.send(WorkerEvent::Log(line.to_string()));
        },
        || cancel.load(Ordering::SeqCst),
    )
}
