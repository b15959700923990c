//! Index-range partitioning for range-workers.

use crate::types::IndexRange;

/// Split `[1, n]` into `workers` contiguous ranges.
///
/// Every range has `n / workers` indices except the last, whose end is forced to `n`
/// so it absorbs the remainder. When `workers > n` the leading ranges are empty and
/// the last range covers everything.
///
/// ```
/// use sprite_pipeline::fetch::partition;
/// use sprite_pipeline::IndexRange;
///
/// assert_eq!(
///     partition(10, 3),
///     vec![IndexRange::new(1, 3), IndexRange::new(4, 6), IndexRange::new(7, 10)]
/// );
/// ```
pub fn partition(n: u32, workers: usize) -> Vec<IndexRange> {
    if workers == 0 {
        return Vec::new();
    }

    let n = u64::from(n);
    let chunk = n / workers as u64;

    (0..workers as u64)
        .map(|w| {
            let start = w * chunk + 1;
            let end = if w + 1 == workers as u64 {
                n
            } else {
                (w + 1) * chunk
            };
            IndexRange::new(start as u32, end as u32)
        })
        .collect()
}
