//! Fixed-capacity pool of session slots and their per-slot synchronization.

use crate::board::Board;
use log::info;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};

/// Scalar lifecycle state of one session, protected by the slot's lock. The
/// lock also serializes the "decide what happens next" step between the
/// command loop and the tick engine.
#[derive(Debug)]
pub struct SessionState {
    /// Slot is claimed; owned by a dispatcher and its session actors.
    pub active: bool,
    /// Identity derived from the client-chosen channel name.
    pub session_id: u32,
    /// Logical running flag; both session actors poll it to keep running.
    pub game_active: bool,
    pub current_level: usize,
    pub victory: bool,
}

pub struct SessionSlot {
    pub index: usize,
    pub state: Mutex<SessionState>,
    /// Board exclusively owned by this slot; swapped wholesale on level
    /// transition. Tick-advance and command-apply take the write half,
    /// snapshot serialization takes the read half.
    pub board: RwLock<Option<Board>>,
    /// Wakes the tick engine out of its tempo sleep when `game_active`
    /// flips, so teardown never waits out a full tick.
    pub tick_wake: Notify,
}

impl SessionSlot {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: Mutex::new(SessionState {
                active: false,
                session_id: 0,
                game_active: false,
                current_level: 0,
                victory: false,
            }),
            board: RwLock::new(None),
            tick_wake: Notify::new(),
        }
    }

    pub async fn session_id(&self) -> u32 {
        self.state.lock().await.session_id
    }

    pub async fn is_game_active(&self) -> bool {
        self.state.lock().await.game_active
    }

    /// Marks the session over and wakes the tick engine so it observes the
    /// flag without sleeping out its tempo.
    pub async fn deactivate(&self) {
        {
            let mut state = self.state.lock().await;
            state.game_active = false;
        }
        self.tick_wake.notify_one();
    }
}

pub enum ClaimOutcome {
    Claimed(Arc<SessionSlot>),
    /// A session with this identity is already active.
    Duplicate,
    /// Every slot is claimed.
    Full,
}

/// The only structure touched by all dispatchers concurrently. Each slot has
/// its own lock; the pool-level `admit` mutex only serializes admission, so
/// running sessions never contend with each other.
pub struct SlotPool {
    slots: Vec<Arc<SessionSlot>>,
    admit: Mutex<()>,
}

impl SlotPool {
    pub fn new(max_games: usize) -> Self {
        Self {
            slots: (0..max_games).map(|i| Arc::new(SessionSlot::new(i))).collect(),
            admit: Mutex::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Scans for an inactive slot and atomically claims it for the given
    /// identity. The admission mutex makes the duplicate scan and the claim
    /// one atomic step across the whole pool, so the same identity can never
    /// race into two slots through different dispatchers.
    pub async fn claim(&self, session_id: u32) -> ClaimOutcome {
        let _admit = self.admit.lock().await;

        for slot in &self.slots {
            let state = slot.state.lock().await;
            if state.active && state.session_id == session_id {
                return ClaimOutcome::Duplicate;
            }
        }

        for slot in &self.slots {
            let mut state = slot.state.lock().await;
            if !state.active {
                state.active = true;
                state.session_id = session_id;
                state.game_active = true;
                state.victory = false;
                state.current_level = 0;
                return ClaimOutcome::Claimed(Arc::clone(slot));
            }
        }

        ClaimOutcome::Full
    }

    /// Returns the slot to the pool. Callers must only release after both
    /// session actors have exited; nothing may touch the slot afterwards.
    pub async fn release(&self, slot: &SessionSlot) {
        let mut state = slot.state.lock().await;
        state.game_active = false;
        state.active = false;
        info!("slot {} released", slot.index);
    }

    /// Current (session id, score) of every active session, for the
    /// leaderboard report.
    pub async fn active_scores(&self) -> Vec<(u32, i32)> {
        let mut scores = Vec::new();
        for slot in &self.slots {
            let session_id = {
                let state = slot.state.lock().await;
                if !state.active {
                    continue;
                }
                state.session_id
            };
            let board = slot.board.read().await;
            if let Some(board) = board.as_ref() {
                scores.push((session_id, board.score()));
            }
        }
        scores
    }

    /// True when no slot is claimed.
    pub async fn all_idle(&self) -> bool {
        for slot in &self.slots {
            if slot.state.lock().await.active {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_initializes_slot() {
        let pool = SlotPool::new(2);
        let ClaimOutcome::Claimed(slot) = pool.claim(7).await else {
            panic!("expected a claim");
        };

        let state = slot.state.lock().await;
        assert!(state.active);
        assert!(state.game_active);
        assert!(!state.victory);
        assert_eq!(state.session_id, 7);
        assert_eq!(state.current_level, 0);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let pool = SlotPool::new(2);
        assert!(matches!(pool.claim(7).await, ClaimOutcome::Claimed(_)));
        assert!(matches!(pool.claim(7).await, ClaimOutcome::Duplicate));
        // a different identity still fits
        assert!(matches!(pool.claim(8).await, ClaimOutcome::Claimed(_)));
    }

    #[tokio::test]
    async fn test_full_pool_reports_full() {
        let pool = SlotPool::new(1);
        assert!(matches!(pool.claim(1).await, ClaimOutcome::Claimed(_)));
        assert!(matches!(pool.claim(2).await, ClaimOutcome::Full));
    }

    #[tokio::test]
    async fn test_release_reopens_slot() {
        let pool = SlotPool::new(1);
        let ClaimOutcome::Claimed(slot) = pool.claim(1).await else {
            panic!("expected a claim");
        };
        pool.release(&slot).await;

        assert!(pool.all_idle().await);
        assert!(matches!(pool.claim(1).await, ClaimOutcome::Claimed(_)));
    }

    #[tokio::test]
    async fn test_deactivate_clears_game_active_only() {
        let pool = SlotPool::new(1);
        let ClaimOutcome::Claimed(slot) = pool.claim(1).await else {
            panic!("expected a claim");
        };

        slot.deactivate().await;
        let state = slot.state.lock().await;
        assert!(state.active);
        assert!(!state.game_active);
    }

    #[tokio::test]
    async fn test_active_scores_skips_idle_slots() {
        use crate::board::{Cell, Player};

        let pool = SlotPool::new(2);
        let ClaimOutcome::Claimed(slot) = pool.claim(3).await else {
            panic!("expected a claim");
        };
        let mut player = Player::at(0, 0);
        player.score = 12;
        *slot.board.write().await = Some(Board::new(
            1,
            1,
            100,
            vec![Cell::empty()],
            vec![player],
            vec![],
        ));

        assert_eq!(pool.active_scores().await, vec![(3, 12)]);
    }
}
