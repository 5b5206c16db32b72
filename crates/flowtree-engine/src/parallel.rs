// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Per-node work only pays for threads past this many nodes.
pub const PARALLEL_THRESHOLD: usize = 20;

/// Worker pool ceiling regardless of core count.
pub const MAX_POOL: usize = 8;

/// Pool size for `count` items: sequential below the threshold, otherwise the
/// requested width clamped to cores and [`MAX_POOL`].
#[must_use]
pub fn effective_workers(count: usize, max_workers: Option<usize>) -> usize {
    if count < PARALLEL_THRESHOLD {
        return 1;
    }
    let cores = std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
    max_workers.unwrap_or(cores.min(MAX_POOL)).max(1)
}

/// Apply `f` to every item, preserving index order in the result. With one
/// worker this degenerates to a plain loop; otherwise a scoped pool pulls
/// indices from a shared counter so results land in their slots regardless of
/// completion order.
pub fn map_indexed<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    if workers <= 1 || items.len() < 2 {
        return items.iter().enumerate().map(|(i, t)| f(i, t)).collect();
    }
    let next = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<R>>> = (0..items.len()).map(|_| Mutex::new(None)).collect();
    std::thread::scope(|scope| {
        for _ in 0..workers.min(items.len()) {
            scope.spawn(|| loop {
                let i = next.fetch_add(1, Ordering::Relaxed);
                if i >= items.len() {
                    break;
                }
                let result = f(i, &items[i]);
                if let Ok(mut slot) = slots[i].lock() {
                    *slot = Some(result);
                }
            });
        }
    });
    slots
        .into_iter()
        .map(|slot| {
            slot.into_inner()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .expect("worker pool filled every slot")
        })
        .collect()
}
