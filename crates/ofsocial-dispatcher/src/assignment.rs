//! Resource assignment for fan-out batches.
//!
//! Item `i` of a batch always lands on resource `i mod R`, so a batch spreads
//! evenly across resources and the mapping is reproducible from the item
//! order alone.

/// Resource index for the item at `ordinal` in a batch.
///
/// Returns `None` if there are no resources.
pub fn resource_for(ordinal: usize, resource_count: usize) -> Option<usize> {
    if resource_count == 0 {
        return None;
    }
    Some(ordinal % resource_count)
}

/// Resource indices for a batch of `item_count` items.
pub fn assign(item_count: usize, resource_count: usize) -> Vec<usize> {
    (0..item_count)
        .filter_map(|ordinal| resource_for(ordinal, resource_count))
        .collect()
}
