//! Per-user conversation window with TTL eviction.
//!
//! Each user owns one slot behind its own mutex; the map lock is only held
//! long enough to find, insert or remove a slot, so users never contend on
//! each other's appends. A slot that has been expired or cleared is marked
//! `evicted` before it leaves the map. A writer that finds an evicted slot
//! retries on a fresh one, so no turn is ever appended into a dead slot.
//!
//! Lock order: never take the map lock while holding a slot lock.

use maitre_core::Turn;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Default number of user/assistant exchanges kept.
pub const DEFAULT_MAX_PAIRS: usize = 5;
/// Default idle time after which a conversation is forgotten.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug)]
struct Slot {
    turns: VecDeque<Turn>,
    last_touched: Instant,
    evicted: bool,
}

impl Slot {
    fn new(now: Instant) -> Self {
        Self {
            turns: VecDeque::new(),
            last_touched: now,
            evicted: false,
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_touched) > ttl
    }

    fn evict(&mut self) {
        self.turns.clear();
        self.evicted = true;
    }
}

type SlotRef = Arc<Mutex<Slot>>;

/// Bounded, expiring conversation memory keyed by user id.
#[derive(Debug)]
pub struct ContextStore {
    max_pairs: usize,
    ttl: Duration,
    slots: RwLock<HashMap<String, SlotRef>>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAIRS, DEFAULT_TTL)
    }
}

impl ContextStore {
    /// `max_pairs` below 1 is raised to 1.
    pub fn new(max_pairs: usize, ttl: Duration) -> Self {
        Self {
            max_pairs: max_pairs.max(1),
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_pairs(&self) -> usize {
        self.max_pairs
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn max_turns(&self) -> usize {
        self.max_pairs * 2
    }

    /// Append one turn. Returns the window length afterwards.
    pub fn append(&self, user_id: &str, turn: Turn) -> usize {
        self.append_all(user_id, [turn])
    }

    /// Append a user message and the reply to it under one lock, so two
    /// concurrent exchanges of the same user never interleave.
    pub fn append_exchange(
        &self,
        user_id: &str,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
    ) -> usize {
        self.append_all(
            user_id,
            [Turn::user(user_text), Turn::assistant(assistant_text)],
        )
    }

    fn append_all<const N: usize>(&self, user_id: &str, turns: [Turn; N]) -> usize {
        loop {
            let slot = self.slot_for(user_id);
            let mut guard = slot.lock();
            if guard.evicted {
                drop(guard);
                self.remove_if_same(user_id, &slot);
                continue;
            }

            let now = Instant::now();
            if guard.is_expired(now, self.ttl) {
                trace!(user_id, "Context expired before append, starting fresh");
                guard.turns.clear();
            }
            guard.turns.extend(turns);
            guard.last_touched = now;
            while guard.turns.len() > self.max_turns() {
                guard.turns.pop_front();
            }
            return guard.turns.len();
        }
    }

    /// Copy of the current window, oldest first. Empty if absent or expired.
    pub fn get(&self, user_id: &str) -> Vec<Turn> {
        let Some(slot) = self.slots.read().get(user_id).cloned() else {
            return Vec::new();
        };
        let mut guard = slot.lock();
        if guard.evicted {
            return Vec::new();
        }
        if guard.is_expired(Instant::now(), self.ttl) {
            guard.evict();
            drop(guard);
            self.remove_if_same(user_id, &slot);
            debug!(user_id, "Context expired on read");
            return Vec::new();
        }
        guard.turns.iter().cloned().collect()
    }

    /// Forget a user's conversation.
    pub fn clear(&self, user_id: &str) {
        let removed = self.slots.write().remove(user_id);
        if let Some(slot) = removed {
            slot.lock().evict();
        }
    }

    /// Evict every expired entry. Returns how many were evicted.
    pub fn sweep_expired(&self) -> usize {
        let snapshot: Vec<(String, SlotRef)> = self
            .slots
            .read()
            .iter()
            .map(|(user, slot)| (user.clone(), Arc::clone(slot)))
            .collect();

        let now = Instant::now();
        let mut evicted = 0;
        for (user_id, slot) in snapshot {
            let expired = {
                let mut guard = slot.lock();
                let expired = !guard.evicted && guard.is_expired(now, self.ttl);
                if expired {
                    guard.evict();
                }
                expired
            };
            if expired {
                self.remove_if_same(&user_id, &slot);
                evicted += 1;
            }
        }
        evicted
    }

    /// Run `sweep_expired` every `interval` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Context store dropped, sweeper exiting");
                    break;
                };
                let evicted = store.sweep_expired();
                if evicted > 0 {
                    debug!(evicted, remaining = store.len(), "Swept expired contexts");
                }
            }
        })
    }

    /// Number of tracked users (expired but unswept entries included).
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_for(&self, user_id: &str) -> SlotRef {
        if let Some(slot) = self.slots.read().get(user_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Slot::new(Instant::now())))),
        )
    }

    fn remove_if_same(&self, user_id: &str, slot: &SlotRef) {
        let mut slots = self.slots.write();
        if slots.get(user_id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maitre_core::TurnRole;

    const TTL: Duration = Duration::from_secs(30 * 60);

    #[test]
    fn window_never_exceeds_twice_max_pairs() {
        let store = ContextStore::new(5, TTL);
        for i in 0..37 {
            let len = store.append("u1", Turn::user(format!("msg {i}")));
            assert!(len <= 10);
            assert!(store.get("u1").len() <= 10);
        }
        let turns = store.get("u1");
        assert_eq!(turns.len(), 10);
        assert_eq!(turns[0].text, "msg 27");
        assert_eq!(turns[9].text, "msg 36");
    }

    #[test]
    fn get_returns_a_copy() {
        let store = ContextStore::default();
        store.append("u1", Turn::user("привет"));
        let mut copy = store.get("u1");
        copy.push(Turn::assistant("injected"));
        copy[0].text.push('!');
        let stored = store.get("u1");
        assert_eq!(stored, vec![Turn::user("привет")]);
    }

    #[test]
    fn users_are_isolated() {
        let store = ContextStore::default();
        store.append("alice", Turn::user("a"));
        store.append("bob", Turn::user("b"));
        store.clear("alice");
        assert!(store.get("alice").is_empty());
        assert_eq!(store.get("bob").len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn exchange_appends_both_halves() {
        let store = ContextStore::new(1, TTL);
        store.append_exchange("u1", "q1", "a1");
        store.append_exchange("u1", "q2", "a2");
        let turns = store.get("u1");
        assert_eq!(turns, vec![Turn::user("q2"), Turn::assistant("a2")]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_reads_empty_and_restarts() {
        let store = ContextStore::new(5, TTL);
        store.append("u1", Turn::user("old"));

        tokio::time::advance(TTL).await;
        assert_eq!(store.get("u1").len(), 1, "exactly at TTL is still live");

        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        assert!(store.get("u1").is_empty());
        assert!(store.is_empty(), "expired entry is purged on read");

        store.append("u1", Turn::user("new"));
        assert_eq!(store.get("u1"), vec![Turn::user("new")]);
    }

    #[tokio::test(start_paused = true)]
    async fn append_after_expiry_drops_old_turns() {
        let store = ContextStore::new(5, TTL);
        store.append_exchange("u1", "q", "a");
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert_eq!(store.append("u1", Turn::user("fresh")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_expired() {
        let store = ContextStore::new(5, TTL);
        store.append("idle", Turn::user("x"));
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        store.append("active", Turn::user("y"));
        tokio::time::advance(Duration::from_secs(15 * 60)).await;

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("active").len(), 1);
        assert_eq!(store.sweep_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_purges_abandoned_sessions() {
        let store = Arc::new(ContextStore::new(5, TTL));
        let handle = store.spawn_sweeper(Duration::from_secs(300));
        store.append("u1", Turn::user("hi"));

        tokio::time::sleep(TTL + Duration::from_secs(600)).await;
        assert!(store.is_empty());

        drop(store);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_exchanges_stay_paired_and_bounded() {
        let store = Arc::new(ContextStore::new(5, TTL));
        let mut tasks = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                for i in 0..200 {
                    let len = store.append_exchange(
                        "shared",
                        format!("q{worker}-{i}"),
                        format!("a{worker}-{i}"),
                    );
                    assert!(len <= 10);
                    if i % 50 == 0 {
                        store.sweep_expired();
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let turns = store.get("shared");
        assert_eq!(turns.len(), 10);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, TurnRole::User);
            assert_eq!(pair[1].role, TurnRole::Assistant);
            assert_eq!(pair[0].text[1..], pair[1].text[1..]);
        }
    }
}
