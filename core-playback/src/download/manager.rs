//! # Download Task Manager
//!
//! Runs background downloads into the cache and keeps an observable task
//! list.
//!
//! ## Observation
//!
//! [`DownloadTaskManager::subscribe`] yields one [`TaskListUpdate`] per
//! change. State transitions are sent immediately and in order; progress is
//! coalesced to one update per `notify_interval`, sent at the end of the
//! window. Every update is mirrored onto the [`EventBus`] as
//! [`CoreEvent::Download`].
//!
//! ## Lifetime
//!
//! Terminal tasks stay visible for a grace period (`completed_grace` for
//! completed and cancelled tasks, `failed_grace` for failures) and are then
//! removed with a final `Removed` update. Starting a terminal id during its
//! grace period replaces it.

use crate::cache::CacheStore;
use crate::config::DownloadConfig;
use crate::download::engine::{DownloadEngine, DownloadedFile};
use crate::download::progress::TransferProgress;
use crate::download::task::{DownloadState, DownloadTask, StartOutcome, TaskListUpdate, UpdateCause};
use crate::error::{DownloadError, PlaybackError, Result};
use crate::resolver::{StreamHandle, StreamResolver};
use crate::source::MediaSource;
use chrono::Utc;
use core_async::sync::{broadcast, CancellationToken, Semaphore};
use core_async::time::{sleep, Duration};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

enum Fetched {
    Cached(PathBuf, u64),
    Downloaded {
        file: DownloadedFile,
        title: Option<String>,
    },
}

struct TaskSlot {
    task: DownloadTask,
    cancel: CancellationToken,
    /// Distinguishes a retried task from the one it replaced, so stale
    /// timers and pipelines never touch the newer task.
    generation: u64,
    flush_scheduled: bool,
}

struct Inner {
    resolver: Arc<StreamResolver>,
    engine: Arc<DownloadEngine>,
    cache: Arc<CacheStore>,
    event_bus: EventBus,
    config: DownloadConfig,
    tasks: Mutex<HashMap<String, TaskSlot>>,
    updates: broadcast::Sender<TaskListUpdate>,
    permits: Arc<Semaphore>,
    next_generation: AtomicU64,
}

/// Background download coordinator.
///
/// Cloning is cheap; clones share the same task list.
#[derive(Clone)]
pub struct DownloadTaskManager {
    inner: Arc<Inner>,
}

impl DownloadTaskManager {
    pub fn new(
        resolver: Arc<StreamResolver>,
        engine: Arc<DownloadEngine>,
        cache: Arc<CacheStore>,
        event_bus: EventBus,
        config: DownloadConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));

        Self {
            inner: Arc::new(Inner {
                resolver,
                engine,
                cache,
                event_bus,
                config,
                tasks: Mutex::new(HashMap::new()),
                updates,
                permits,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Starts downloading `source` into the cache under task `id`.
    ///
    /// A second start for an id whose task is still running is a no-op and
    /// returns [`StartOutcome::AlreadyActive`].
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NotDownloadable`] for local sources.
    #[instrument(skip(self, source), fields(source = %source))]
    pub fn start_download(&self, id: &str, source: MediaSource) -> Result<StartOutcome> {
        if !source.is_downloadable() {
            return Err(PlaybackError::NotDownloadable(source.key()));
        }

        let inner = &self.inner;
        let (cancel, generation) = {
            let mut tasks = inner.tasks.lock();
            if let Some(existing) = tasks.get(id) {
                if !existing.task.state.is_terminal() {
                    debug!(task_id = id, state = %existing.task.state, "Download already active");
                    return Ok(StartOutcome::AlreadyActive);
                }
                debug!(task_id = id, "Replacing finished task");
            }

            let generation = inner.next_generation.fetch_add(1, Ordering::Relaxed);
            let cancel = CancellationToken::new();
            let source_key = source.key();

            tasks.insert(
                id.to_string(),
                TaskSlot {
                    task: DownloadTask::new(id.to_string(), source.clone(), Utc::now()),
                    cancel: cancel.clone(),
                    generation,
                    flush_scheduled: false,
                },
            );

            inner.publish(
                &tasks,
                UpdateCause::Created {
                    task_id: id.to_string(),
                },
                vec![DownloadEvent::Queued {
                    task_id: id.to_string(),
                    source_key,
                }],
            );
            (cancel, generation)
        };

        info!(task_id = id, "Download queued");
        core_async::spawn(Arc::clone(inner).run(id.to_string(), source, cancel, generation));
        Ok(StartOutcome::Started)
    }

    /// Cancels a running task. Returns `false` if the id is unknown or
    /// already terminal.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: &str) -> bool {
        let inner = &self.inner;
        let generation = {
            let mut tasks = inner.tasks.lock();
            let Some(slot) = tasks.get_mut(id) else {
                return false;
            };
            if slot.task.state.is_terminal() {
                return false;
            }

            slot.cancel.cancel();
            slot.task.state = DownloadState::Cancelled;
            slot.task.updated_at = Utc::now();
            let generation = slot.generation;

            inner.publish(
                &tasks,
                UpdateCause::StateChanged {
                    task_id: id.to_string(),
                    state: DownloadState::Cancelled,
                },
                vec![
                    status_event(id, DownloadState::Cancelled),
                    DownloadEvent::Cancelled {
                        task_id: id.to_string(),
                    },
                ],
            );
            generation
        };

        info!(task_id = id, "Download cancelled");
        inner.schedule_removal(id.to_string(), generation, inner.config.completed_grace);
        true
    }

    /// Cancels every running task.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self
            .inner
            .tasks
            .lock()
            .iter()
            .filter(|(_, slot)| !slot.task.state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();

        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskListUpdate> {
        self.inner.updates.subscribe()
    }

    /// Current task list, oldest first.
    pub fn tasks(&self) -> Vec<DownloadTask> {
        snapshot(&self.inner.tasks.lock())
    }

    pub fn task(&self, id: &str) -> Option<DownloadTask> {
        self.inner.tasks.lock().get(id).map(|slot| slot.task.clone())
    }
}

impl Inner {
    async fn run(
        self: Arc<Self>,
        id: String,
        source: MediaSource,
        cancel: CancellationToken,
        generation: u64,
    ) {
        let result = self.pipeline(&id, &source, &cancel, generation).await;
        self.finish(&id, generation, result);
    }

    async fn pipeline(
        self: &Arc<Self>,
        id: &str,
        source: &MediaSource,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<(PathBuf, u64)> {
        let _permit = core_async::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled.into()),
            permit = Arc::clone(&self.permits).acquire_owned() => permit
                .map_err(|_| PlaybackError::Config("download manager is shut down".to_string()))?,
        };

        let fetched = core_async::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled.into()),
            fetched = self.fetch(id, source, cancel, generation) => fetched,
        };

        match fetched? {
            Fetched::Cached(path, size_bytes) => Ok((path, size_bytes)),
            Fetched::Downloaded { file, title } => {
                self.commit(id, &source.key(), file, title, cancel, generation)
                    .await
            }
        }
    }

    /// Resolves and transfers `source`. Dropping this future aborts the
    /// transfer and the engine removes the temp file.
    async fn fetch(
        self: &Arc<Self>,
        id: &str,
        source: &MediaSource,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<Fetched> {
        self.transition(id, generation, DownloadState::Resolving)?;
        let key = source.key();

        if let Some(entry) = self.cache.lookup(&key).await? {
            debug!(task_id = id, "Already cached");
            self.set_title(id, generation, entry.title.clone());
            self.transition(id, generation, DownloadState::Downloading)?;
            self.transition(id, generation, DownloadState::Verifying)?;
            return Ok(Fetched::Cached(entry.local_path, entry.size_bytes));
        }

        let (stream, title) = match source {
            MediaSource::YouTube(video_id) => {
                let resolved = self.resolver.resolve(video_id).await?;
                let title = Some(resolved.metadata.title).filter(|t| !t.is_empty());
                (resolved.stream, title)
            }
            MediaSource::DirectUrl(url) => (StreamHandle::direct(url), None),
            MediaSource::Local(_) => return Err(PlaybackError::NotDownloadable(key)),
        };

        self.set_title(id, generation, title.clone());
        self.transition(id, generation, DownloadState::Downloading)?;

        let temp = self.cache.partial_path(&key, stream.extension());
        let file = self
            .engine
            .download(&stream, &temp, cancel, |progress| {
                self.report_progress(id, generation, progress)
            })
            .await?;

        Ok(Fetched::Downloaded { file, title })
    }

    /// Moves a finished transfer into the cache. Runs to completion even if
    /// the task is cancelled meanwhile, then backs the entry out again.
    async fn commit(
        &self,
        id: &str,
        key: &str,
        file: DownloadedFile,
        title: Option<String>,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Result<(PathBuf, u64)> {
        if let Err(e) = self.transition(id, generation, DownloadState::Verifying) {
            discard(&file.path).await;
            return Err(e);
        }

        let entry = match self
            .cache
            .put(key, &file.path, file.size_bytes, title.as_deref())
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                discard(&file.path).await;
                return Err(e.into());
            }
        };

        if cancel.is_cancelled() {
            if self.is_replaced(id, generation) {
                debug!(task_id = id, "Cancelled while verifying; newer task keeps the entry");
            } else {
                debug!(task_id = id, "Cancelled while verifying; dropping cached copy");
                if let Err(e) = self.cache.remove(key).await {
                    warn!(task_id = id, error = %e, "Failed to drop cancelled download");
                }
            }
            return Err(DownloadError::Cancelled.into());
        }

        Ok((entry.local_path, entry.size_bytes))
    }

    /// Whether a retry has taken over `id` since `generation` started.
    fn is_replaced(&self, id: &str, generation: u64) -> bool {
        self.tasks
            .lock()
            .get(id)
            .is_some_and(|slot| slot.generation != generation)
    }

    /// Moves a live task to `state`. Fails with `Cancelled` if the task was
    /// cancelled, replaced or removed meanwhile.
    fn transition(&self, id: &str, generation: u64, state: DownloadState) -> Result<()> {
        let mut tasks = self.tasks.lock();
        match tasks.get_mut(id) {
            Some(slot) if slot.generation == generation && !slot.task.state.is_terminal() => {
                slot.task.state = state;
                slot.task.updated_at = Utc::now();
            }
            _ => return Err(DownloadError::Cancelled.into()),
        }

        debug!(task_id = id, %state, "Download state changed");
        self.publish(
            &tasks,
            UpdateCause::StateChanged {
                task_id: id.to_string(),
                state,
            },
            vec![status_event(id, state)],
        );
        Ok(())
    }

    fn set_title(&self, id: &str, generation: u64, title: Option<String>) {
        if title.is_none() {
            return;
        }
        let mut tasks = self.tasks.lock();
        if let Some(slot) = tasks.get_mut(id).filter(|s| s.generation == generation) {
            slot.task.title = title;
        }
    }

    fn report_progress(self: &Arc<Self>, id: &str, generation: u64, progress: TransferProgress) {
        let mut tasks = self.tasks.lock();
        let Some(slot) = tasks
            .get_mut(id)
            .filter(|s| s.generation == generation && s.task.state == DownloadState::Downloading)
        else {
            return;
        };

        slot.task.progress = slot.task.progress.max(progress.fraction());
        slot.task.downloaded_bytes = progress.downloaded_bytes;
        slot.task.total_bytes = progress.total_bytes;

        if !slot.flush_scheduled {
            slot.flush_scheduled = true;
            let inner = Arc::clone(self);
            let id = id.to_string();
            let window = self.config.notify_interval;
            core_async::spawn(async move {
                sleep(window).await;
                inner.flush_progress(&id, generation);
            });
        }
    }

    fn flush_progress(&self, id: &str, generation: u64) {
        let mut tasks = self.tasks.lock();
        let event = match tasks.get_mut(id).filter(|s| s.generation == generation) {
            Some(slot) => {
                slot.flush_scheduled = false;
                if slot.task.state != DownloadState::Downloading {
                    return;
                }
                DownloadEvent::Progress {
                    task_id: id.to_string(),
                    fraction: slot.task.progress,
                    downloaded_bytes: slot.task.downloaded_bytes,
                    total_bytes: slot.task.total_bytes,
                }
            }
            None => return,
        };

        self.publish(
            &tasks,
            UpdateCause::Progress {
                task_id: id.to_string(),
            },
            vec![event],
        );
    }

    fn finish(self: &Arc<Self>, id: &str, generation: u64, result: Result<(PathBuf, u64)>) {
        let mut tasks = self.tasks.lock();
        let Some(slot) = tasks
            .get_mut(id)
            .filter(|s| s.generation == generation && !s.task.state.is_terminal())
        else {
            return;
        };

        slot.task.updated_at = Utc::now();
        let (state, outcome, grace) = match result {
            Ok((path, size_bytes)) => {
                slot.task.progress = 1.0;
                slot.task.downloaded_bytes = size_bytes;
                slot.task.result_path = Some(path.clone());
                info!(task_id = id, size_bytes, "Download completed");
                (
                    DownloadState::Completed,
                    DownloadEvent::Completed {
                        task_id: id.to_string(),
                        local_path: path.to_string_lossy().into_owned(),
                        size_bytes,
                    },
                    self.config.completed_grace,
                )
            }
            Err(PlaybackError::Download(DownloadError::Cancelled)) => (
                DownloadState::Cancelled,
                DownloadEvent::Cancelled {
                    task_id: id.to_string(),
                },
                self.config.completed_grace,
            ),
            Err(e) => {
                let message = e.user_message();
                warn!(task_id = id, error = %message, "Download failed");
                slot.task.error_message = Some(message.clone());
                (
                    DownloadState::Failed,
                    DownloadEvent::Failed {
                        task_id: id.to_string(),
                        message,
                    },
                    self.config.failed_grace,
                )
            }
        };
        slot.task.state = state;

        self.publish(
            &tasks,
            UpdateCause::StateChanged {
                task_id: id.to_string(),
                state,
            },
            vec![status_event(id, state), outcome],
        );
        drop(tasks);

        self.schedule_removal(id.to_string(), generation, grace);
    }

    fn schedule_removal(self: &Arc<Self>, id: String, generation: u64, grace: Duration) {
        let inner = Arc::clone(self);
        core_async::spawn(async move {
            sleep(grace).await;
            inner.remove_expired(&id, generation);
        });
    }

    fn remove_expired(&self, id: &str, generation: u64) {
        let mut tasks = self.tasks.lock();
        let expired = tasks
            .get(id)
            .is_some_and(|s| s.generation == generation && s.task.state.is_terminal());
        if !expired {
            return;
        }

        tasks.remove(id);
        debug!(task_id = id, "Download task removed");
        self.publish(
            &tasks,
            UpdateCause::Removed {
                task_id: id.to_string(),
            },
            vec![DownloadEvent::Removed {
                task_id: id.to_string(),
            }],
        );
    }

    /// Sends one update and its bus events. Called with the task lock held
    /// so updates leave in the order the changes were made.
    fn publish(
        &self,
        tasks: &HashMap<String, TaskSlot>,
        cause: UpdateCause,
        events: Vec<DownloadEvent>,
    ) {
        self.updates
            .send(TaskListUpdate {
                cause,
                tasks: snapshot(tasks),
            })
            .ok();

        for event in events {
            self.event_bus.emit(CoreEvent::Download(event)).ok();
        }
    }
}

fn snapshot(tasks: &HashMap<String, TaskSlot>) -> Vec<DownloadTask> {
    let mut list: Vec<DownloadTask> = tasks.values().map(|slot| slot.task.clone()).collect();
    list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    list
}

fn status_event(id: &str, state: DownloadState) -> DownloadEvent {
    DownloadEvent::StatusChanged {
        task_id: id.to_string(),
        status: state.as_str().to_string(),
    }
}

async fn discard(path: &Path) {
    if let Err(e) = core_async::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove downloaded file");
    }
}
