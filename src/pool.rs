//! Bounded-concurrency fan-out of many seed contexts through one shared
//! [`Pipeline`].
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{PipelineError, Result};
use crate::interpreter::Interpreter;
use crate::pipeline::Pipeline;
use crate::settlement::Settlement;

/// Default worker-pool concurrency.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Feeds many seed contexts through a shared, immutable [`Pipeline`] with at
/// most `N` in-flight runs at a time.
pub struct WorkerPool;

impl WorkerPool {
    /// Runs `pipeline` once per item in `items`, at most `max_concurrent` at
    /// a time, returning settlement records in the original input order.
    /// Invokes the pipeline's hook source `setup`/`cleanup` once each, at
    /// the start and end of the whole call.
    pub async fn pipe<C>(
        pipeline: Arc<Pipeline<C>>,
        items: Vec<C>,
        max_concurrent: usize,
    ) -> Result<Vec<Settlement<C>>>
    where
        C: Clone + Send + 'static,
    {
        Self::run(pipeline, items, max_concurrent, true).await
    }

    /// As [`Self::pipe`], but skips `setup`/`cleanup` — used when `SPLIT`
    /// fans a nested pipeline out over sub-contexts, where lifecycle hooks
    /// belong to the outer run.
    pub(crate) async fn pipe_for_split<C>(
        pipeline: Arc<Pipeline<C>>,
        items: Vec<C>,
        max_concurrent: usize,
    ) -> Result<Vec<Settlement<C>>>
    where
        C: Clone + Send + 'static,
    {
        Self::run(pipeline, items, max_concurrent, false).await
    }

    #[tracing::instrument(skip(pipeline, items), fields(pipeline = %pipeline.id, item_count = items.len(), max_concurrent))]
    async fn run<C>(
        pipeline: Arc<Pipeline<C>>,
        items: Vec<C>,
        max_concurrent: usize,
        with_lifecycle: bool,
    ) -> Result<Vec<Settlement<C>>>
    where
        C: Clone + Send + 'static,
    {
        let total = items.len();

        if with_lifecycle && let Some(hooks) = pipeline.hook_source() {
            tracing::debug!(pipeline = %pipeline.id, item_count = total, "Running pool setup hook");
            hooks
                .setup(total)
                .await
                .map_err(|e| PipelineError::SetupFailure(Box::new(e)))?;
        }

        let worker_count = max_concurrent.max(1).min(total.max(1));
        let worker_count = if total == 0 { 0 } else { worker_count.max(1) };
        tracing::debug!(pipeline = %pipeline.id, worker_count, item_count = total, "Spawning pool workers");

        let next_index = Arc::new(AtomicUsize::new(0));
        let items = Arc::new(items);
        let slots: Arc<Mutex<Vec<Option<Settlement<C>>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));

        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let pipeline = pipeline.clone();
            let next_index = next_index.clone();
            let items = items.clone();
            let slots = slots.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let idx = next_index.fetch_add(1, Ordering::SeqCst);
                    if idx >= items.len() {
                        break;
                    }
                    let seed = items[idx].clone();
                    let settlement = match Interpreter::run(&pipeline, seed).await {
                        Ok(value) => Settlement::Fulfilled(value),
                        Err(e) => Settlement::Rejected(e),
                    };
                    slots.lock().await[idx] = Some(settlement);
                }
            }));
        }

        // Wait out every worker before touching cleanup, even if one of them
        // panicked — cleanup must still run after the last worker returns or
        // faults. Hold on to the first join error and surface it afterward.
        let mut join_error = None;
        for worker in workers {
            if let Err(e) = worker.await
                && join_error.is_none()
            {
                join_error = Some(PipelineError::User(anyhow::anyhow!("worker task panicked: {e}")));
            }
        }

        if with_lifecycle && let Some(hooks) = pipeline.hook_source() {
            tracing::debug!(pipeline = %pipeline.id, "Running pool cleanup hook");
            hooks
                .cleanup()
                .await
                .map_err(|e| PipelineError::CleanupFailure(Box::new(e)))?;
        }

        if let Some(e) = join_error {
            return Err(e);
        }

        let slots = Arc::try_unwrap(slots)
            .expect("every worker has joined and dropped its clone of the slot table")
            .into_inner();

        Ok(slots
            .into_iter()
            .map(|slot| slot.expect("every index is claimed by exactly one worker"))
            .collect())
    }
}
