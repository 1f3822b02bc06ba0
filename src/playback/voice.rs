// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Voice allocation for rapid-fire clicks.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out voices round-robin, preferring idle ones. The cursor is advanced
/// with compare-exchange so concurrent plays never corrupt its order.
pub struct VoicePool {
    count: usize,
    cursor: AtomicUsize,
}

impl VoicePool {
    pub fn new(count: usize) -> VoicePool {
        VoicePool {
            count,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Picks a voice. Scans up to `count` voices starting at the cursor for one
    /// that is not playing and takes it. If every voice is busy, the voice at
    /// the cursor is taken and will be cut off. Either way the cursor moves to
    /// the voice after the one taken.
    pub fn allocate<F>(&self, is_playing: F) -> Option<usize>
    where
        F: Fn(usize) -> bool,
    {
        if self.count == 0 {
            return None;
        }

        let mut start = self.cursor.load(Ordering::Acquire);
        loop {
            let voice = (0..self.count)
                .map(|offset| (start + offset) % self.count)
                .find(|voice| !is_playing(*voice))
                .unwrap_or(start);
            let next = (voice + 1) % self.count;

            match self
                .cursor
                .compare_exchange(start, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(voice),
                Err(current) => start = current,
            }
        }
    }

    /// The voice the next scan starts from.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl std::fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("count", &self.count)
            .field("cursor", &self.cursor())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_idle_voices_round_robin() {
        let pool = VoicePool::new(4);
        let idle = |_| false;

        let picked: Vec<usize> = (0..6).filter_map(|_| pool.allocate(idle)).collect();
        assert_eq!(picked, vec![0, 1, 2, 3, 0, 1]);
        assert_eq!(pool.cursor(), 2);
    }

    #[test]
    fn test_skips_busy_voices_with_wrap() {
        let pool = VoicePool::new(4);
        let busy: HashSet<usize> = [0, 1].into_iter().collect();

        assert_eq!(pool.allocate(|v| busy.contains(&v)), Some(2));
        assert_eq!(pool.allocate(|v| busy.contains(&v)), Some(3));
        // Wraps past the busy voices back to 2.
        assert_eq!(pool.allocate(|v| busy.contains(&v)), Some(2));
        assert_eq!(pool.cursor(), 3);
    }

    #[test]
    fn test_all_busy_takes_cursor() {
        let pool = VoicePool::new(5);
        let busy = |_| true;

        for m in 1..=12 {
            let voice = pool.allocate(busy).unwrap();
            assert_eq!(voice, (m - 1) % 5);
            assert_eq!(pool.cursor(), m % 5);
        }
    }

    #[test]
    fn test_empty_pool() {
        let pool = VoicePool::new(0);
        assert_eq!(pool.allocate(|_| false), None);
    }

    #[test]
    fn test_concurrent_allocation_keeps_order() {
        let pool = Arc::new(VoicePool::new(8));
        let picked = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                let picked = picked.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let voice = pool.allocate(|_| true).unwrap();
                        picked.lock().push(voice);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // 400 allocations over 8 busy voices: each voice taken exactly 50 times.
        let picked = picked.lock();
        assert_eq!(picked.len(), 400);
        for voice in 0..8 {
            assert_eq!(picked.iter().filter(|v| **v == voice).count(), 50);
        }
        assert_eq!(pool.cursor(), 0);
    }
}
