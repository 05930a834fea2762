//! Generic container helpers parameterized by an execution policy.
//!
//! The registry keeps its entries in a plain `Vec` and scans it linearly.
//! These helpers factor out the scans so that each can run sequentially or
//! on the rayon pool. Parallel variants always produce the same result as the
//! sequential ones: first-match searches return the lowest index and erasure
//! preserves the order of the remaining elements.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How a scan over the collection is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Scan on the calling thread.
    #[default]
    Sequential,
    /// Scan on the rayon thread pool.
    Parallel,
}

/// Outcome of [`emplace_unique`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emplace {
    /// The item was appended at this index.
    Inserted(usize),
    /// An equivalent item already sits at this index; nothing was inserted.
    Existing(usize),
}

impl Emplace {
    /// Index of the inserted or already present item.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Inserted(i) | Self::Existing(i) => i,
        }
    }

    /// True if the item was inserted.
    #[must_use]
    pub const fn inserted(self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Index of the first element matching `pred`.
pub fn find_index<T, P>(policy: ExecutionPolicy, items: &[T], pred: P) -> Option<usize>
where
    T: Sync,
    P: Fn(&T) -> bool + Sync + Send,
{
    match policy {
        ExecutionPolicy::Sequential => items.iter().position(pred),
        ExecutionPolicy::Parallel => items.par_iter().position_first(pred),
    }
}

/// Number of elements matching `pred`.
pub fn count_if<T, P>(policy: ExecutionPolicy, items: &[T], pred: P) -> usize
where
    T: Sync,
    P: Fn(&T) -> bool + Sync + Send,
{
    match policy {
        ExecutionPolicy::Sequential => items.iter().filter(|item| pred(*item)).count(),
        ExecutionPolicy::Parallel => items.par_iter().filter(|item| pred(*item)).count(),
    }
}

/// Appends `item` unless an element for which `is_dup(existing, &item)` holds
/// is already present.
pub fn emplace_unique<T, D>(policy: ExecutionPolicy, items: &mut Vec<T>, item: T, is_dup: D) -> Emplace
where
    T: Sync,
    D: Fn(&T, &T) -> bool + Sync + Send,
{
    if let Some(index) = find_index(policy, items.as_slice(), |existing| is_dup(existing, &item)) {
        return Emplace::Existing(index);
    }
    items.push(item);
    Emplace::Inserted(items.len() - 1)
}

/// Removes every element matching `pred`, keeping the others in order.
/// Returns the number removed.
pub fn erase_if<T, P>(policy: ExecutionPolicy, items: &mut Vec<T>, pred: P) -> usize
where
    T: Sync,
    P: Fn(&T) -> bool + Sync + Send,
{
    let before = items.len();
    match policy {
        ExecutionPolicy::Sequential => items.retain(|item| !pred(item)),
        ExecutionPolicy::Parallel => {
            // Evaluate the predicate in parallel, then compact sequentially.
            let doomed: Vec<bool> = items.par_iter().map(|item| pred(item)).collect();
            if !doomed.contains(&true) {
                return 0;
            }
            let mut flags = doomed.into_iter();
            items.retain(|_| !flags.next().unwrap_or(false));
        }
    }
    before - items.len()
}

/// Removes at most `limit` elements matching `pred`, scanning from the front.
/// Returns the number removed.
pub fn erase_first_n_if<T, P>(items: &mut Vec<T>, limit: usize, pred: P) -> usize
where
    P: Fn(&T) -> bool,
{
    let mut removed = 0;
    items.retain(|item| {
        if removed < limit && pred(item) {
            removed += 1;
            false
        } else {
            true
        }
    });
    removed
}
