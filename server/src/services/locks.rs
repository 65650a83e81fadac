//! Per-conversation turn locks.
//!
//! A chat turn holds its conversation's lock from before history is loaded
//! until the assistant message is persisted, so two sends on one
//! conversation never interleave. Map entries are removed when the last
//! holder releases and nobody else is waiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

type Slot = Arc<tokio::sync::Mutex<()>>;
type Slots = Arc<Mutex<HashMap<Uuid, Entry>>>;

/// A conversation's mutex plus the number of turns holding or waiting on it.
struct Entry {
    slot: Slot,
    users: usize,
}

#[derive(Clone, Default)]
pub struct ConversationLocks {
    slots: Slots,
}

/// Counts one user of an entry. Dropping it, whether from a finished turn
/// or a cancelled `acquire`, removes the entry once nobody is left.
struct Registration {
    id: Uuid,
    slots: Slots,
}

/// Held for the lifetime of one turn.
pub struct TurnGuard {
    // Fields drop in order: the mutex is released before the entry is checked.
    _guard: OwnedMutexGuard<()>,
    _registration: Registration,
}

fn lock_map(slots: &Mutex<HashMap<Uuid, Entry>>) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
    slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl ConversationLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the turn lock for `id`.
    pub async fn acquire(&self, id: Uuid) -> TurnGuard {
        let (registration, slot) = {
            let mut slots = lock_map(&self.slots);
            let entry = slots.entry(id).or_insert_with(|| Entry { slot: Slot::default(), users: 0 });
            entry.users += 1;
            (Registration { id, slots: self.slots.clone() }, entry.slot.clone())
        };
        let guard = slot.lock_owned().await;
        TurnGuard { _guard: guard, _registration: registration }
    }

    /// Number of conversations with a live or waited-on lock.
    #[must_use]
    pub fn active(&self) -> usize {
        lock_map(&self.slots).len()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut slots = lock_map(&self.slots);
        if let Some(entry) = slots.get_mut(&self.id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                slots.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn second_turn_waits_for_the_first() {
        let locks = ConversationLocks::new();
        let id = Uuid::new_v4();
        let first = locks.acquire(id).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("waiter should be released")
            .unwrap();
        assert_eq!(locks.active(), 1);
        drop(second);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_its_entry() {
        let locks = ConversationLocks::new();
        let id = Uuid::new_v4();
        let first = locks.acquire(id).await;

        let waited = tokio::time::timeout(Duration::from_millis(20), locks.acquire(id)).await;
        assert!(waited.is_err());
        assert_eq!(locks.active(), 1);

        drop(first);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let locks = ConversationLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::new_v4())).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }
}
