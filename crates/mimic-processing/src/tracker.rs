//! Generation task tracker
//!
//! Canonical state of every video generation request. A task moves from
//! `Processing` to exactly one of `Completed` or `Failed`; both are terminal and
//! later writes are ignored rather than rejected, so duplicate completion
//! signals are harmless.

use chrono::{DateTime, Utc};
use mimic_core::constants::SYNTHESIS_PROGRESS_CEILING;
use mimic_core::{GenerationTask, ProcessingStatus, TaskStatusView};
use mimic_storage::{MemoryStore, Store, StorageResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Highest progress value a task can hold before it completes.
const MAX_IN_FLIGHT_PROGRESS: u8 = 99;

/// What a tracker write did to the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The write matched the current state (e.g. a repeated completion with the same path).
    Unchanged,
    /// A completed task's output path was replaced by a second completion.
    OutputReplaced { previous: PathBuf },
    /// The task is already terminal; nothing changed.
    IgnoredTerminal,
    UnknownTask,
}

#[derive(Clone)]
pub struct GenerationTaskTracker {
    store: Arc<dyn Store<GenerationTask>>,
}

impl GenerationTaskTracker {
    pub fn new(store: Arc<dyn Store<GenerationTask>>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Register a new task in `Processing` at progress 0 and return its id.
    pub async fn create(&self, image_id: &str) -> StorageResult<String> {
        let task_id = Uuid::new_v4().to_string();
        self.store
            .put(&task_id, GenerationTask::new(task_id.clone(), image_id))
            .await?;
        info!(task_id = %task_id, image_id = %image_id, "Generation task created");
        Ok(task_id)
    }

    /// Raise the progress of a processing task.
    ///
    /// Progress never decreases and stays below 100 until completion. Unknown and
    /// terminal tasks are left untouched.
    pub async fn update_progress(&self, task_id: &str, progress: u8) -> StorageResult<WriteOutcome> {
        let target = progress.min(MAX_IN_FLIGHT_PROGRESS);
        let mut outcome = WriteOutcome::UnknownTask;

        self.store
            .update(task_id, &mut |task: &mut GenerationTask| {
                outcome = if task.is_terminal() {
                    WriteOutcome::IgnoredTerminal
                } else if target > task.progress {
                    task.progress = target;
                    task.updated_at = Utc::now();
                    WriteOutcome::Applied
                } else {
                    WriteOutcome::Unchanged
                };
            })
            .await?;

        if outcome == WriteOutcome::UnknownTask {
            debug!(task_id = %task_id, progress, "Progress update for unknown task ignored");
        }
        Ok(outcome)
    }

    /// Transition to `Completed` with progress 100 and the given output path.
    pub async fn mark_completed(
        &self,
        task_id: &str,
        output_path: &Path,
    ) -> StorageResult<WriteOutcome> {
        let mut outcome = WriteOutcome::UnknownTask;

        self.store
            .update(task_id, &mut |task: &mut GenerationTask| {
                outcome = match task.status {
                    ProcessingStatus::Completed => match task.output_path.as_deref() {
                        Some(current) if current == output_path => WriteOutcome::Unchanged,
                        current => {
                            let previous = current.map(Path::to_path_buf).unwrap_or_default();
                            task.output_path = Some(output_path.to_path_buf());
                            task.updated_at = Utc::now();
                            WriteOutcome::OutputReplaced { previous }
                        }
                    },
                    ProcessingStatus::Failed => WriteOutcome::IgnoredTerminal,
                    ProcessingStatus::Pending | ProcessingStatus::Processing => {
                        task.status = ProcessingStatus::Completed;
                        task.progress = 100;
                        task.output_path = Some(output_path.to_path_buf());
                        task.error = None;
                        task.updated_at = Utc::now();
                        WriteOutcome::Applied
                    }
                };
            })
            .await?;

        match &outcome {
            WriteOutcome::Applied => {
                info!(task_id = %task_id, output = %output_path.display(), "Generation task completed")
            }
            WriteOutcome::OutputReplaced { previous } => warn!(
                task_id = %task_id,
                previous = %previous.display(),
                output = %output_path.display(),
                "Completed task output path overwritten"
            ),
            WriteOutcome::IgnoredTerminal => {
                warn!(task_id = %task_id, "Completion of failed task ignored")
            }
            WriteOutcome::UnknownTask => debug!(task_id = %task_id, "Completion of unknown task ignored"),
            WriteOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    /// Transition to `Failed`, keeping the progress reached so far.
    pub async fn mark_failed(&self, task_id: &str, reason: &str) -> StorageResult<WriteOutcome> {
        let mut outcome = WriteOutcome::UnknownTask;

        self.store
            .update(task_id, &mut |task: &mut GenerationTask| {
                outcome = if task.is_terminal() {
                    WriteOutcome::IgnoredTerminal
                } else {
                    task.status = ProcessingStatus::Failed;
                    task.error = Some(reason.to_string());
                    task.updated_at = Utc::now();
                    WriteOutcome::Applied
                };
            })
            .await?;

        match outcome {
            WriteOutcome::Applied => {
                warn!(task_id = %task_id, reason = %reason, "Generation task failed")
            }
            WriteOutcome::IgnoredTerminal => {
                debug!(task_id = %task_id, "Failure of terminal task ignored")
            }
            _ => debug!(task_id = %task_id, "Failure of unknown task ignored"),
        }
        Ok(outcome)
    }

    /// Snapshot of a task, if it was ever created.
    pub async fn get(&self, task_id: &str) -> StorageResult<Option<GenerationTask>> {
        self.store.get(task_id).await
    }

    /// Status surface: `{status, progress, output_path, error}`.
    pub async fn status(&self, task_id: &str) -> StorageResult<Option<TaskStatusView>> {
        Ok(self.get(task_id).await?.map(|task| task.status_view()))
    }

    /// Snapshot of every tracked task, oldest first.
    pub async fn list(&self) -> StorageResult<Vec<GenerationTask>> {
        let mut tasks: Vec<GenerationTask> = self
            .store
            .scan()
            .await?
            .into_iter()
            .map(|(_, task)| task)
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    /// Remove terminal tasks last updated before `cutoff`. Processing tasks are kept.
    pub async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let mut evicted = 0;
        for (task_id, task) in self.store.scan().await? {
            if task.is_terminal() && task.updated_at < cutoff {
                self.store.delete(&task_id).await?;
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}

/// Progress reported after synthesizing frame `index` of `frame_count`.
pub fn synthesis_progress(index: u64, frame_count: u64) -> u8 {
    if frame_count == 0 {
        return 0;
    }
    (SYNTHESIS_PROGRESS_CEILING as u64 * index.min(frame_count) / frame_count) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_starts_processing() {
        let tracker = GenerationTaskTracker::in_memory();
        let id = tracker.create("img-1").await.unwrap();
        let task = tracker.get(&id).await.unwrap().unwrap();
        assert_eq!(task.status, ProcessingStatus::Processing);
        assert_eq!(task.progress, 0);
        assert_eq!(task.image_id, "img-1");

        let other = tracker.create("img-1").await.unwrap();
        assert_ne!(id, other);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_below_100() {
        let tracker = GenerationTaskTracker::in_memory();
        let id = tracker.create("img").await.unwrap();

        assert_eq!(
            tracker.update_progress(&id, 40).await.unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            tracker.update_progress(&id, 20).await.unwrap(),
            WriteOutcome::Unchanged
        );
        assert_eq!(tracker.get(&id).await.unwrap().unwrap().progress, 40);

        tracker.update_progress(&id, 100).await.unwrap();
        let task = tracker.get(&id).await.unwrap().unwrap();
        assert_eq!(task.progress, 99);
        assert_eq!(task.status, ProcessingStatus::Processing);
    }

    #[tokio::test]
    async fn test_update_unknown_task_is_noop() {
        let tracker = GenerationTaskTracker::in_memory();
        assert_eq!(
            tracker.update_progress("nope", 50).await.unwrap(),
            WriteOutcome::UnknownTask
        );
        assert!(tracker.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_sets_100_and_path() {
        let tracker = GenerationTaskTracker::in_memory();
        let id = tracker.create("img").await.unwrap();
        tracker.update_progress(&id, 80).await.unwrap();

        let out = Path::new("/out/video.mp4");
        assert_eq!(
            tracker.mark_completed(&id, out).await.unwrap(),
            WriteOutcome::Applied
        );

        let view = tracker.status(&id).await.unwrap().unwrap();
        assert_eq!(view.status, ProcessingStatus::Completed);
        assert_eq!(view.progress, 100);
        assert_eq!(view.output_path.as_deref(), Some(out));
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn test_repeat_completion_same_path_is_idempotent() {
        let tracker = GenerationTaskTracker::in_memory();
        let id = tracker.create("img").await.unwrap();
        let out = Path::new("/out/a.mp4");
        tracker.mark_completed(&id, out).await.unwrap();
        assert_eq!(
            tracker.mark_completed(&id, out).await.unwrap(),
            WriteOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn test_repeat_completion_other_path_replaces() {
        let tracker = GenerationTaskTracker::in_memory();
        let id = tracker.create("img").await.unwrap();
        tracker
            .mark_completed(&id, Path::new("/out/a.mp4"))
            .await
            .unwrap();
        let outcome = tracker
            .mark_completed(&id, Path::new("/out/b.mp4"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::OutputReplaced {
                previous: PathBuf::from("/out/a.mp4")
            }
        );
        let task = tracker.get(&id).await.unwrap().unwrap();
        assert_eq!(task.output_path, Some(PathBuf::from("/out/b.mp4")));
        assert_eq!(task.progress, 100);
    }

    #[tokio::test]
    async fn test_failure_keeps_progress() {
        let tracker = GenerationTaskTracker::in_memory();
        let id = tracker.create("img").await.unwrap();
        tracker.update_progress(&id, 37).await.unwrap();
        tracker.mark_failed(&id, "ImageDecodeError").await.unwrap();

        let task = tracker.get(&id).await.unwrap().unwrap();
        assert_eq!(task.status, ProcessingStatus::Failed);
        assert_eq!(task.progress, 37);
        assert_eq!(task.error.as_deref(), Some("ImageDecodeError"));
        assert!(task.output_path.is_none());
    }

    #[tokio::test]
    async fn test_terminal_states_ignore_writes() {
        let tracker = GenerationTaskTracker::in_memory();
        let failed = tracker.create("img").await.unwrap();
        tracker.mark_failed(&failed, "boom").await.unwrap();

        assert_eq!(
            tracker.update_progress(&failed, 90).await.unwrap(),
            WriteOutcome::IgnoredTerminal
        );
        assert_eq!(
            tracker
                .mark_completed(&failed, Path::new("/out/x.mp4"))
                .await
                .unwrap(),
            WriteOutcome::IgnoredTerminal
        );
        let task = tracker.get(&failed).await.unwrap().unwrap();
        assert_eq!(task.status, ProcessingStatus::Failed);
        assert!(task.output_path.is_none());

        let done = tracker.create("img").await.unwrap();
        tracker
            .mark_completed(&done, Path::new("/out/y.mp4"))
            .await
            .unwrap();
        assert_eq!(
            tracker.mark_failed(&done, "late").await.unwrap(),
            WriteOutcome::IgnoredTerminal
        );
        assert_eq!(
            tracker.update_progress(&done, 10).await.unwrap(),
            WriteOutcome::IgnoredTerminal
        );
        assert_eq!(tracker.get(&done).await.unwrap().unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_evict_only_old_terminal_tasks() {
        let tracker = GenerationTaskTracker::in_memory();
        let running = tracker.create("img").await.unwrap();
        let done = tracker.create("img").await.unwrap();
        tracker
            .mark_completed(&done, Path::new("/out/z.mp4"))
            .await
            .unwrap();

        let evicted = tracker
            .evict_terminal_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(evicted, 1);
        assert!(tracker.get(&done).await.unwrap().is_none());
        assert!(tracker.get(&running).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_is_oldest_first_and_keeps_everything() {
        let tracker = GenerationTaskTracker::in_memory();
        let first = tracker.create("img-a").await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = tracker.create("img-b").await.unwrap();
        tracker.mark_failed(&second, "boom").await.unwrap();

        let ids: Vec<String> = tracker
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn test_synthesis_progress() {
        assert_eq!(synthesis_progress(0, 300), 0);
        assert_eq!(synthesis_progress(150, 300), 40);
        assert_eq!(synthesis_progress(299, 300), 79);
        assert_eq!(synthesis_progress(300, 300), 80);
        assert_eq!(synthesis_progress(1, 3), 26);
        assert_eq!(synthesis_progress(5, 0), 0);
    }
}
