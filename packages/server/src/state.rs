use log::debug;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::{broadcast, Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::chat::SystemMessage;
use crate::services::action_store::ActionStore;
use crate::services::game_repository::{GameRepository, InMemoryGameRepository};
use crate::services::scheduler::{PhaseScheduler, Timer, TokioTimer};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::config::{Config, CONFIG};
use crate::utils::random::{RandomSource, ThreadRandom};

const CHANNEL_CAPACITY: usize = 1000;

/// Services shared by every request handler and phase timer.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn GameRepository>,
    pub action_store: Arc<ActionStore>,
    pub scheduler: Arc<PhaseScheduler>,
    pub clock: Arc<dyn Clock>,
    pub rng: Arc<dyn RandomSource>,
    pub config: Arc<Config>,
    game_locks: Arc<Mutex<LockMap>>,
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<SystemMessage>>>>,
}

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

fn lock_map<T>(map: &Mutex<T>) -> MutexGuard<'_, T> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held while one game is being mutated. The lock entry is dropped from the
/// map once nobody holds or waits for it.
pub struct GameGuard {
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<AsyncMutex<()>>,
    game_id: String,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for GameGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock_map(&self.locks);
        // 残る参照は自分とマップの2つ。待機中のタスクがあればそれ以上になる
        let unused = locks.get(&self.game_id).is_some_and(|entry| {
            Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2
        });
        if unused {
            locks.remove(&self.game_id);
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::from_config(CONFIG.clone())
    }

    pub fn from_config(config: Config) -> Self {
        Self::with_services(
            config,
            Arc::new(InMemoryGameRepository::new()),
            Arc::new(TokioTimer),
            Arc::new(SystemClock),
            Arc::new(ThreadRandom),
        )
    }

    pub fn with_services(
        config: Config,
        repository: Arc<dyn GameRepository>,
        timer: Arc<dyn Timer>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        AppState {
            repository,
            action_store: Arc::new(ActionStore::from_config(&config, clock.clone())),
            scheduler: Arc::new(PhaseScheduler::new(timer)),
            clock,
            rng,
            config: Arc::new(config),
            game_locks: Arc::new(Mutex::new(HashMap::new())),
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serializes every mutation of one game. Other games are unaffected.
    pub async fn lock_game(&self, game_id: &str) -> GameGuard {
        let lock = lock_map(&self.game_locks)
            .entry(game_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        GameGuard {
            guard: Some(lock.clone().lock_owned().await),
            lock,
            game_id: game_id.to_string(),
            locks: self.game_locks.clone(),
        }
    }

    pub fn get_or_create_game_channel(&self, game_id: &str) -> broadcast::Sender<SystemMessage> {
        lock_map(&self.channels)
            .entry(game_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Receives the narration of `game_id` from now on.
    pub fn subscribe(&self, game_id: &str) -> broadcast::Receiver<SystemMessage> {
        self.get_or_create_game_channel(game_id).subscribe()
    }

    /// Publishes to the game's channel. Games nobody subscribed to have no
    /// channel, and their narration is dropped.
    pub async fn narrate(&self, message: SystemMessage) {
        let tx = lock_map(&self.channels).get(&message.game_id).cloned();
        let delivered = tx.is_some_and(|tx| tx.send(message).is_ok());
        if !delivered {
            debug!("No one is listening to the narration channel");
        }
    }

    /// Drops the narration channel. Subscribers see the channel close after
    /// the messages already sent.
    pub fn close_channel(&self, game_id: &str) {
        lock_map(&self.channels).remove(game_id);
    }

    /// Forgets the lock and channel of a deleted game.
    pub fn forget_game(&self, game_id: &str) {
        lock_map(&self.game_locks).remove(game_id);
        self.close_channel(game_id);
    }

    /// Number of games with a lock entry, held or awaited.
    pub fn tracked_locks(&self) -> usize {
        lock_map(&self.game_locks).len()
    }

    pub fn open_channels(&self) -> usize {
        lock_map(&self.channels).len()
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    pub async fn reset_for_tests(&self) {
        self.scheduler.shutdown();
        self.action_store.reset_for_tests();
        lock_map(&self.game_locks).clear();
        lock_map(&self.channels).clear();
    }
}
