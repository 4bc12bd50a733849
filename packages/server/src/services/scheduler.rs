use futures::future::BoxFuture;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub type TimerTask = BoxFuture<'static, ()>;

/// Something that can run a task after a delay.
pub trait Timer: Send + Sync {
    fn schedule(&self, after: Duration, task: TimerTask) -> Box<dyn TimerHandle>;
}

pub trait TimerHandle: Send {
    fn cancel(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

struct TokioTimerHandle(tokio::task::JoinHandle<()>);

impl TimerHandle for TokioTimerHandle {
    fn cancel(&self) {
        self.0.abort();
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, after: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            task.await;
        });
        Box::new(TokioTimerHandle(handle))
    }
}

/// Timer that never fires on its own; tests fire the pending tasks.
#[derive(Default)]
pub struct ManualTimer {
    pending: Mutex<Vec<ManualEntry>>,
}

struct ManualEntry {
    after: Duration,
    task: TimerTask,
    cancelled: Arc<AtomicBool>,
}

struct ManualTimerHandle(Arc<AtomicBool>);

impl TimerHandle for ManualTimerHandle {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, after: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.lock().push(ManualEntry {
            after,
            task,
            cancelled: cancelled.clone(),
        });
        Box::new(ManualTimerHandle(cancelled))
    }
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ManualEntry>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|entry| !entry.cancelled.load(Ordering::SeqCst));
        pending
    }

    /// Number of scheduled tasks that were not cancelled.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Delay of the oldest pending task.
    pub fn next_delay(&self) -> Option<Duration> {
        self.lock().first().map(|entry| entry.after)
    }

    /// Runs the oldest pending task to completion. Returns `false` if there
    /// was nothing to run.
    pub async fn fire_next(&self) -> bool {
        let entry = {
            let mut pending = self.lock();
            if pending.is_empty() {
                return false;
            }
            pending.remove(0)
        };
        entry.task.await;
        true
    }
}

/// Keeps at most one live phase timer per game.
pub struct PhaseScheduler {
    timer: Arc<dyn Timer>,
    timers: Mutex<HashMap<String, ScheduledTimer>>,
    generation: Mutex<u64>,
}

struct ScheduledTimer {
    generation: u64,
    handle: Box<dyn TimerHandle>,
}

impl PhaseScheduler {
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        Self {
            timer,
            timers: Mutex::new(HashMap::new()),
            generation: Mutex::new(0),
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, ScheduledTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the timer of `game_id`, cancelling the one it replaces.
    pub fn schedule(self: &Arc<Self>, game_id: &str, after: Duration, task: TimerTask) {
        let generation = {
            let mut counter = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            *counter += 1;
            *counter
        };

        // 発火したタスクはハンドルを手放すので、実行中の再スケジュールで中断されない
        let scheduler = Arc::downgrade(self);
        let id = game_id.to_string();
        let wrapped: TimerTask = Box::pin(async move {
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.release(&id, generation);
            }
            task.await;
        });

        let handle = self.timer.schedule(after, wrapped);
        let previous = self.timers().insert(
            game_id.to_string(),
            ScheduledTimer { generation, handle },
        );
        if let Some(previous) = previous {
            previous.handle.cancel();
        }
        debug!("Phase timer for game {game_id} fires in {after:?}");
    }

    fn release(&self, game_id: &str, generation: u64) {
        let mut timers = self.timers();
        if timers
            .get(game_id)
            .is_some_and(|scheduled| scheduled.generation == generation)
        {
            timers.remove(game_id);
        }
    }

    /// Cancels the timer of `game_id`. Safe to call any number of times.
    pub fn cancel(&self, game_id: &str) -> bool {
        let removed = self.timers().remove(game_id);
        match removed {
            Some(scheduled) => {
                scheduled.handle.cancel();
                debug!("Phase timer for game {game_id} cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, game_id: &str) -> bool {
        self.timers().contains_key(game_id)
    }

    pub fn active_timers(&self) -> usize {
        self.timers().len()
    }

    /// Cancels every timer.
    pub fn shutdown(&self) {
        let drained: Vec<(String, ScheduledTimer)> = self.timers().drain().collect();
        for (game_id, scheduled) in drained {
            scheduled.handle.cancel();
            debug!("Phase timer for game {game_id} cancelled on shutdown");
        }
    }
}
