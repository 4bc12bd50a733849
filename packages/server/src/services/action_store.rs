use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::models::action::{ActionKind, ActionRecord};
use crate::utils::clock::Clock;
use crate::utils::config::Config;

/// Number of actors that picked each target.
pub type Tally = HashMap<String, usize>;

/// In-flight actions of every running game, bounded in size and age.
///
/// Entries expire `ttl` after their last write and the least recently used
/// entry is evicted once `capacity` games are held. A missing entry is never
/// an error: callers initialize it again.
pub struct ActionStore {
    inner: Mutex<StoreInner>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    ttl: Duration,
    tally_ttl: Duration,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<String, ActionEntry>,
    tick: u64,
}

struct ActionEntry {
    actions: ActionRecord,
    expires_at: DateTime<Utc>,
    last_used: u64,
    invalidated_at: DateTime<Utc>,
    votes: Option<CachedTally>,
    attacks: Option<CachedTally>,
}

#[derive(Clone)]
struct CachedTally {
    computed_at: DateTime<Utc>,
    tally: Tally,
}

impl ActionEntry {
    fn new(now: DateTime<Utc>, ttl: Duration, tick: u64) -> Self {
        ActionEntry {
            actions: ActionRecord::default(),
            expires_at: expiry(now, ttl),
            last_used: tick,
            invalidated_at: now,
            votes: None,
            attacks: None,
        }
    }

    fn cached_mut(&mut self, kind: ActionKind) -> Option<&mut Option<CachedTally>> {
        match kind {
            ActionKind::Vote => Some(&mut self.votes),
            ActionKind::Attack => Some(&mut self.attacks),
            _ => None,
        }
    }

    fn invalidate(&mut self, kind: ActionKind, now: DateTime<Utc>) {
        self.invalidated_at = now;
        if let Some(cached) = self.cached_mut(kind) {
            *cached = None;
        }
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn count_targets(map: &HashMap<String, String>) -> Tally {
    let mut tally = Tally::new();
    for target in map.values() {
        *tally.entry(target.clone()).or_default() += 1;
    }
    tally
}

impl ActionStore {
    pub fn new(capacity: usize, ttl: Duration, tally_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            clock,
            capacity: capacity.max(1),
            ttl,
            tally_ttl,
        }
    }

    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.action_cache_capacity,
            config.action_cache_ttl,
            config.tally_cache_ttl,
            clock,
        )
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates empty maps for `game_id`, discarding whatever was there.
    pub fn initialize(&self, game_id: &str) {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.insert_entry(&mut inner, game_id, now);
    }

    fn insert_entry(&self, inner: &mut StoreInner, game_id: &str, now: DateTime<Utc>) {
        inner.entries.retain(|_, entry| entry.expires_at > now);
        if !inner.entries.contains_key(game_id) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                debug!("Evicting actions of game {oldest} from the action store");
                inner.entries.remove(&oldest);
            }
        }
        inner.tick += 1;
        let entry = ActionEntry::new(now, self.ttl, inner.tick);
        inner.entries.insert(game_id.to_string(), entry);
    }

    /// Live entry for `game_id`, dropping it first if it has expired.
    fn live_entry<'a>(
        inner: &'a mut StoreInner,
        game_id: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a mut ActionEntry> {
        if inner
            .entries
            .get(game_id)
            .is_some_and(|entry| entry.expires_at <= now)
        {
            inner.entries.remove(game_id);
            return None;
        }
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.entries.get_mut(game_id)?;
        entry.last_used = tick;
        Some(entry)
    }

    /// Snapshot of the actions recorded for `game_id`, or `None` when the
    /// game has no live entry.
    pub fn get(&self, game_id: &str) -> Option<ActionRecord> {
        let now = self.clock.now();
        let mut inner = self.lock();
        Self::live_entry(&mut inner, game_id, now).map(|entry| entry.actions.clone())
    }

    pub fn contains(&self, game_id: &str) -> bool {
        self.get(game_id).is_some()
    }

    /// Records `actor_id`'s action, replacing their earlier one of the same
    /// kind. Returns the replaced target.
    pub fn record_action(
        &self,
        game_id: &str,
        kind: ActionKind,
        actor_id: &str,
        target_id: &str,
    ) -> Option<String> {
        let now = self.clock.now();
        let mut inner = self.lock();
        if Self::live_entry(&mut inner, game_id, now).is_none() {
            warn!("Action store had no entry for game {game_id}, initializing it");
            self.insert_entry(&mut inner, game_id, now);
        }
        let entry = inner.entries.get_mut(game_id)?;
        entry.expires_at = expiry(now, self.ttl);
        entry.invalidate(kind, now);
        entry.actions.record(kind, actor_id, target_id)
    }

    pub fn clear_kinds(&self, game_id: &str, kinds: &[ActionKind]) {
        let now = self.clock.now();
        let mut inner = self.lock();
        if let Some(entry) = Self::live_entry(&mut inner, game_id, now) {
            entry.actions.clear(kinds);
            for kind in kinds {
                entry.invalidate(*kind, now);
            }
        }
    }

    pub fn remove(&self, game_id: &str) -> bool {
        self.lock().entries.remove(game_id).is_some()
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock()
            .entries
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset_for_tests(&self) {
        *self.lock() = StoreInner::default();
    }

    pub fn vote_distribution(&self, game_id: &str) -> Tally {
        self.distribution(game_id, ActionKind::Vote)
    }

    pub fn attack_distribution(&self, game_id: &str) -> Tally {
        self.distribution(game_id, ActionKind::Attack)
    }

    /// Raw tally of one action map, served from a short-lived cache. Only
    /// for display: resolution always recounts from the maps.
    fn distribution(&self, game_id: &str, kind: ActionKind) -> Tally {
        let now = self.clock.now();
        let tally_ttl = self.tally_ttl;
        let mut inner = self.lock();
        let Some(entry) = Self::live_entry(&mut inner, game_id, now) else {
            return Tally::new();
        };
        let invalidated_at = entry.invalidated_at;
        let fresh = |cached: &CachedTally| {
            cached.computed_at >= invalidated_at
                && (now - cached.computed_at)
                    .to_std()
                    .is_ok_and(|age| age < tally_ttl)
        };

        if let Some(Some(cached)) = entry.cached_mut(kind).map(|c| c.as_ref()) {
            if fresh(cached) {
                return cached.tally.clone();
            }
        }

        let tally = count_targets(entry.actions.map(kind));
        if let Some(slot) = entry.cached_mut(kind) {
            *slot = Some(CachedTally {
                computed_at: now,
                tally: tally.clone(),
            });
        }
        tally
    }

    #[cfg(test)]
    fn has_cached_tally(&self, game_id: &str, kind: ActionKind) -> bool {
        let mut inner = self.lock();
        inner
            .entries
            .get_mut(game_id)
            .and_then(|entry| entry.cached_mut(kind).map(|c| c.is_some()))
            .unwrap_or(false)
    }
}
