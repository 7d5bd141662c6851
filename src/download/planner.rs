//! Chunk planning: partitions a resource into contiguous byte ranges.

use serde::Serialize;

/// Lifecycle of a chunk inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    /// Waiting to be dispatched (initially or after a retryable failure).
    Pending,
    /// A worker currently owns the chunk.
    InFlight,
    /// Every byte of the chunk has been written.
    Done,
    /// The chunk exhausted its attempts.
    Failed,
}

/// A contiguous byte range of the target resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the plan (0-based).
    pub index: usize,
    /// Offset of the first byte.
    pub start: u64,
    /// Number of bytes, or `None` when the resource size is unknown.
    pub len: Option<u64>,
    /// Whether the chunk is requested with a `Range` header.
    pub ranged: bool,
    /// Fetch attempts made so far.
    pub attempts: u32,
    /// Scheduler state.
    pub state: ChunkState,
}

impl Chunk {
    fn new(index: usize, start: u64, len: Option<u64>, ranged: bool) -> Self {
        Self {
            index,
            start,
            len,
            ranged,
            attempts: 0,
            state: ChunkState::Pending,
        }
    }

    /// Inclusive offset of the last byte, when known and the chunk is non-empty.
    #[must_use]
    pub fn end(&self) -> Option<u64> {
        self.len
            .filter(|&len| len > 0)
            .map(|len| self.start + len - 1)
    }

    /// A zero-length chunk completes without any network request.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == Some(0)
    }

    /// `Range` header value for ranged chunks.
    #[must_use]
    pub fn range_header(&self) -> Option<String> {
        if !self.ranged {
            return None;
        }
        self.end().map(|end| format!("bytes={}-{end}", self.start))
    }
}

/// Splits `[0, total_size)` into at most `max_connections` chunks of at least
/// `min_chunk_size` bytes each.
///
/// Without range support or a known size the plan is a single un-ranged chunk
/// covering the whole resource. A single-chunk plan is never ranged.
#[must_use]
pub fn plan(
    total_size: Option<u64>,
    supports_range: bool,
    max_connections: usize,
    min_chunk_size: u64,
) -> Vec<Chunk> {
    let total = match total_size {
        Some(total) if supports_range && total > 0 => total,
        other => return vec![Chunk::new(0, 0, other, false)],
    };

    let by_size = (total / min_chunk_size.max(1)).max(1);
    let connections = u64::try_from(max_connections.max(1))
        .unwrap_or(u64::MAX)
        .min(by_size);
    if connections == 1 {
        return vec![Chunk::new(0, 0, Some(total), false)];
    }

    let chunk_size = total / connections;
    (0..connections)
        .map(|i| {
            let start = i * chunk_size;
            let len = if i == connections - 1 {
                total - start
            } else {
                chunk_size
            };
            #[allow(clippy::cast_possible_truncation)]
            let index = i as usize;
            Chunk::new(index, start, Some(len), true)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn assert_partition(chunks: &[Chunk], total: u64) {
        let mut next = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.start, next, "gap or overlap before chunk {i}");
            next += chunk.len.unwrap();
        }
        assert_eq!(next, total);
    }

    #[test]
    fn test_plan_even_split() {
        let chunks = plan(Some(400), true, 4, 100);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].end(), Some(99));
        assert_eq!(chunks[3].start, 300);
        assert_eq!(chunks[3].end(), Some(399));
        assert_partition(&chunks, 400);
    }

    #[test]
    fn test_plan_last_chunk_absorbs_remainder() {
        let chunks = plan(Some(1000), true, 3, 1);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len, Some(333));
        assert_eq!(chunks[1].len, Some(333));
        assert_eq!(chunks[2].len, Some(334));
        assert_eq!(chunks[2].end(), Some(999));
        assert_partition(&chunks, 1000);
    }

    #[test]
    fn test_plan_limited_by_min_chunk_size() {
        let chunks = plan(Some(250), true, 8, 100);
        assert_eq!(chunks.len(), 2);
        assert_partition(&chunks, 250);
    }

    #[test]
    fn test_plan_partition_holds_for_many_sizes() {
        for total in [1u64, 2, 7, 99, 100, 101, 4096, 102_400, 1_000_003] {
            for connections in 1..=9 {
                let chunks = plan(Some(total), true, connections, 1);
                assert!(chunks.len() <= connections);
                assert_partition(&chunks, total);
            }
        }
    }

    #[test]
    fn test_plan_small_resource_is_single_unranged_chunk() {
        let chunks = plan(Some(50), true, 8, 100);
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].ranged);
        assert_eq!(chunks[0].range_header(), None);
        assert_eq!(chunks[0].len, Some(50));
    }

    #[test]
    fn test_plan_without_range_support() {
        let chunks = plan(Some(10_000), false, 8, 1);
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].ranged);
        assert_eq!(chunks[0].len, Some(10_000));
        assert_eq!(chunks[0].range_header(), None);
    }

    #[test]
    fn test_plan_unknown_size() {
        let chunks = plan(None, true, 8, 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len, None);
        assert_eq!(chunks[0].end(), None);
        assert!(!chunks[0].ranged);
    }

    #[test]
    fn test_plan_zero_size() {
        let chunks = plan(Some(0), true, 8, 1);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
        assert_eq!(chunks[0].end(), None);
    }

    #[test]
    fn test_range_header_is_inclusive() {
        let chunks = plan(Some(10), true, 2, 1);
        assert_eq!(chunks[0].range_header().as_deref(), Some("bytes=0-4"));
        assert_eq!(chunks[1].range_header().as_deref(), Some("bytes=5-9"));
    }

    #[test]
    fn test_new_chunks_are_pending() {
        let chunks = plan(Some(10), true, 2, 1);
        assert!(
            chunks
                .iter()
                .all(|c| c.state == ChunkState::Pending && c.attempts == 0)
        );
    }
}
