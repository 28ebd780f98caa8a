use chrono::{DateTime, Utc};
use mimic_processing::GenerationTaskTracker;
use mimic_storage::LocalFileStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::chat::ChatService;
use crate::error::ServiceResult;
use crate::uploads::UploadService;

/// Counts from one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub tasks: usize,
    pub conversations: usize,
    pub uploads: usize,
    pub files: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.tasks + self.conversations + self.uploads + self.files
    }
}

/// Periodically drops records and media files older than the retention window.
///
/// Tasks that are still processing are never evicted.
pub struct RetentionSweeper {
    tracker: GenerationTaskTracker,
    chat: Arc<ChatService>,
    uploads: Arc<UploadService>,
    outputs: LocalFileStore,
    retention: Duration,
    every: Duration,
}

impl RetentionSweeper {
    pub fn new(
        tracker: GenerationTaskTracker,
        chat: Arc<ChatService>,
        uploads: Arc<UploadService>,
        outputs: LocalFileStore,
        retention: Duration,
        every: Duration,
    ) -> Self {
        Self {
            tracker,
            chat,
            uploads,
            outputs,
            retention,
            every,
        }
    }

    /// Start the background sweep loop. Returns a JoinHandle for graceful shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.every);

            loop {
                sweep_interval.tick().await;
                tracing::debug!("Starting scheduled retention sweep");
                self.sweep_once().await;
            }
        })
    }

    /// Run one pass. Failures in one category are logged and counted as zero.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "expire_all"))]
    pub async fn sweep_once(&self) -> SweepReport {
        let cutoff = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let tasks = logged("tasks", self.tracker.evict_terminal_before(cutoff).await.map_err(Into::into));
        let conversations = logged("conversations", self.chat.evict_before(cutoff).await);
        let uploads = logged("uploads", self.uploads.evict_before(cutoff).await);

        let upload_files = logged(
            "upload files",
            self.uploads
                .files()
                .sweep_older_than(self.retention)
                .await
                .map_err(Into::into),
        );
        let output_files = logged(
            "output files",
            self.outputs
                .sweep_older_than(self.retention)
                .await
                .map_err(Into::into),
        );

        let report = SweepReport {
            tasks,
            conversations,
            uploads,
            files: upload_files + output_files,
        };

        tracing::info!(
            tasks = report.tasks,
            conversations = report.conversations,
            uploads = report.uploads,
            files = report.files,
            total_deleted = report.total(),
            "Retention sweep completed"
        );
        report
    }
}

fn logged(category: &'static str, result: ServiceResult<usize>) -> usize {
    match result {
        Ok(count) => count,
        Err(e) => {
            tracing::error!(category = category, error = %e, "Retention sweep failed for category");
            0
        }
    }
}
