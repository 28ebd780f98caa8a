use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};

use mimic_processing::AvatarPipeline;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct RenderJob {
    pub task_id: String,
    pub image_path: PathBuf,
    pub audio_path: PathBuf,
    pub expression_scale: f64,
    pub output_path: PathBuf,
}

/// Ids of jobs that are queued or running.
type ActiveSet = Arc<Mutex<HashSet<String>>>;

/// Bounded render queue in front of a fixed-size worker pool.
#[derive(Clone)]
pub struct RenderQueue {
    tx: mpsc::Sender<RenderJob>,
    active: ActiveSet,
}

impl RenderQueue {
    /// Create the queue and spawn its dispatcher on the current runtime.
    ///
    /// At most `workers` renders run at once. Further jobs wait in a channel of
    /// `capacity` slots; when it is full `enqueue()` returns [`ServiceError::QueueFull`].
    pub fn new(pipeline: AvatarPipeline, workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let active: ActiveSet = Arc::new(Mutex::new(HashSet::new()));

        let pool_active = active.clone();
        tokio::spawn(async move {
            Self::worker_pool(rx, pipeline, workers, pool_active).await;
        });

        tracing::info!(
            queue_size = capacity,
            max_concurrent = workers,
            "Render queue initialized"
        );

        Self { tx, active }
    }

    #[tracing::instrument(skip(self, job), fields(task_id = %job.task_id, job.type = "render"))]
    pub fn enqueue(&self, job: RenderJob) -> ServiceResult<()> {
        let task_id = job.task_id.clone();
        {
            let mut active = self.lock_active();
            if !active.insert(task_id.clone()) {
                tracing::warn!("Render already active for task, rejecting duplicate");
                return Err(ServiceError::Conflict(task_id));
            }
        }

        match self.tx.try_send(job) {
            Ok(()) => {
                tracing::info!("Render job enqueued");
                Ok(())
            }
            Err(e) => {
                self.lock_active().remove(&task_id);
                match e {
                    TrySendError::Full(_) => {
                        tracing::warn!("Render queue is full, rejecting job");
                        Err(ServiceError::QueueFull)
                    }
                    TrySendError::Closed(_) => Err(ServiceError::InvalidRequest(
                        "Render queue is shut down".to_string(),
                    )),
                }
            }
        }
    }

    /// Whether `task_id` is queued or rendering.
    pub fn is_active(&self, task_id: &str) -> bool {
        self.lock_active().contains(task_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock_active().len()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        lock(&self.active)
    }

    async fn worker_pool(
        mut rx: mpsc::Receiver<RenderJob>,
        pipeline: AvatarPipeline,
        max_concurrent: usize,
        active: ActiveSet,
    ) {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));

        while let Some(job) = rx.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let pipeline = pipeline.clone();
            let active = active.clone();

            tokio::spawn(async move {
                let _permit = permit;
                Self::process_job(&pipeline, &job).await;
                lock(&active).remove(&job.task_id);
            });
        }
    }

    #[tracing::instrument(skip_all, fields(task_id = %job.task_id, job.status = tracing::field::Empty))]
    async fn process_job(pipeline: &AvatarPipeline, job: &RenderJob) {
        let start = std::time::Instant::now();
        tracing::info!("Starting render job");

        let result = pipeline
            .generate(
                &job.image_path,
                &job.audio_path,
                &job.task_id,
                job.expression_scale,
                &job.output_path,
            )
            .await;

        let elapsed = start.elapsed();
        match result {
            Ok(outcome) => {
                tracing::Span::current().record("job.status", "success");
                tracing::info!(
                    frames = outcome.frame_count,
                    with_audio = outcome.mux.has_audio(),
                    duration_ms = elapsed.as_millis(),
                    "Render completed"
                );
            }
            Err(e) => {
                // The pipeline has already recorded the failure on the task.
                tracing::Span::current().record("job.status", "failed");
                tracing::error!(error = %e, duration_ms = elapsed.as_millis(), "Render failed");
            }
        }
    }
}

fn lock(active: &ActiveSet) -> std::sync::MutexGuard<'_, HashSet<String>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
