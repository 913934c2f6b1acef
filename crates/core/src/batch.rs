//! Bounded-concurrency helpers.
//!
//! Reads are issued in fixed-size groups: every call of a group runs
//! concurrently, the group is awaited as a unit, and the next group starts
//! only after the previous one has finished.

use futures::future::join_all;
use std::future::Future;

/// Split `items` into consecutive batches of at most `size` elements.
///
/// A `size` of zero is treated as one.
pub fn split_into_batches<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Apply `f` to every item, running at most `group_size` calls at a time.
///
/// Results are returned in input order.
pub async fn map_in_groups<T, F, Fut, R>(items: &[T], group_size: usize, f: F) -> Vec<R>
where
    F: Fn(&T) -> Fut,
    Fut: Future<Output = R>,
{
    let mut results = Vec::with_capacity(items.len());
    for group in items.chunks(group_size.max(1)) {
        results.extend(join_all(group.iter().map(&f)).await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_split_preserves_count_and_order() {
        for n in 0..25usize {
            let items: Vec<usize> = (0..n).collect();
            for size in 1..8usize {
                let batches = split_into_batches(&items, size);
                assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));
                let flat: Vec<usize> = batches.into_iter().flatten().collect();
                assert_eq!(flat, items, "n={n} size={size}");
            }
        }
    }

    #[test]
    fn test_split_zero_size() {
        let batches = split_into_batches(&[1, 2, 3], 0);
        assert_eq!(batches, vec![vec![1], vec![2], vec![3]]);
        assert!(split_into_batches::<u8>(&[], 4).is_empty());
    }

    #[tokio::test]
    async fn test_map_in_groups_bounds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = (0..10).collect();

        let results = map_in_groups(&items, 3, |&i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i * 2
            }
        })
        .await;

        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
