//! Sharded per-record-ID lock table.
//!
//! Transactions take an exclusive lock on an object's ID before reading its
//! lifeline for update. The key space is unbounded, so entries are created
//! on demand and removed again once uncontended.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;

use pulsenet_core::types::RecordID;

const SHARD_COUNT: usize = 32;

#[derive(Default)]
struct LockEntry {
    locked: bool,
    waiters: u32,
}

struct Shard {
    entries: Mutex<HashMap<RecordID, LockEntry>>,
    ready: Condvar,
}

pub struct IdLocker {
    shards: Vec<Shard>,
}

impl Default for IdLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl IdLocker {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Shard {
                entries: Mutex::new(HashMap::new()),
                ready: Condvar::new(),
            })
            .collect();
        IdLocker { shards }
    }

    fn shard(&self, id: &RecordID) -> &Shard {
        // First hash byte spreads IDs evenly: it is SHA3 output.
        let idx = id.hash[0] as usize % SHARD_COUNT;
        &self.shards[idx]
    }

    /// Block until the exclusive lock on `id` is acquired.
    pub fn lock(&self, id: &RecordID) {
        let shard = self.shard(id);
        let mut entries = shard.entries.lock();
        loop {
            let entry = entries.entry(*id).or_default();
            if !entry.locked {
                entry.locked = true;
                return;
            }
            entry.waiters += 1;
            shard.ready.wait(&mut entries);
            if let Some(e) = entries.get_mut(id) {
                e.waiters = e.waiters.saturating_sub(1);
            }
        }
    }

    /// Release the lock on `id`. Entries with no waiters are removed.
    pub fn unlock(&self, id: &RecordID) {
        let shard = self.shard(id);
        let mut entries = shard.entries.lock();
        match entries.get_mut(id) {
            Some(e) if e.waiters == 0 => {
                entries.remove(id);
            }
            Some(e) => {
                e.locked = false;
                shard.ready.notify_all();
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsenet_core::types::PulseNumber;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn lock_serializes_critical_sections() {
        let locker = Arc::new(IdLocker::new());
        let id = RecordID::random(PulseNumber(1));
        let inside = Arc::new(AtomicU32::new(0));

        let mut threads = Vec::new();
        for _ in 0..8 {
            let locker = locker.clone();
            let inside = inside.clone();
            threads.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    locker.lock(&id);
                    let n = inside.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(n, 0, "two threads inside the same ID lock");
                    inside.fetch_sub(1, Ordering::SeqCst);
                    locker.unlock(&id);
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
    }

    #[test]
    fn uncontended_entries_are_removed() {
        let locker = IdLocker::new();
        let id = RecordID::random(PulseNumber(1));
        locker.lock(&id);
        locker.unlock(&id);
        let shard = locker.shard(&id);
        assert!(shard.entries.lock().is_empty());
    }

    #[test]
    fn distinct_ids_do_not_block() {
        let locker = IdLocker::new();
        let a = RecordID::random(PulseNumber(1));
        let b = RecordID::random(PulseNumber(1));
        locker.lock(&a);
        locker.lock(&b);
        locker.unlock(&a);
        locker.unlock(&b);
    }
}
