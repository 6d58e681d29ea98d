//! Contiguous content runs for the per-path chunk cache.

use bytes::{Bytes, BytesMut};

/// A contiguous cached byte range of one file.
#[derive(Debug, Clone)]
struct ChunkRun {
    offset: u64,
    data: Bytes,
}

impl ChunkRun {
    fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Cached content runs for one path.
///
/// Invariant: runs are sorted by offset and pairwise non-overlapping and
/// non-adjacent — insertion coalesces eagerly, so any fully-covered read
/// range lies within a single run.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChunkRuns {
    runs: Vec<ChunkRun>,
}

impl ChunkRuns {
    /// Insert a byte range, merging overlapping and adjacent runs.
    /// On overlap the newly inserted data wins.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "run spans fit in usize on supported 64-bit platforms"
    )]
    pub(crate) fn insert(&mut self, offset: u64, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let new_end = offset + data.len() as u64;

        // Split off every run that overlaps or touches the new range.
        let mut absorbed = Vec::new();
        self.runs.retain(|run| {
            if run.end() >= offset && run.offset <= new_end {
                absorbed.push(run.clone());
                false
            } else {
                true
            }
        });

        let merged_start = absorbed
            .iter()
            .map(|r| r.offset)
            .min()
            .unwrap_or(offset)
            .min(offset);
        let merged_end = absorbed
            .iter()
            .map(ChunkRun::end)
            .max()
            .unwrap_or(new_end)
            .max(new_end);

        // Every absorbed run touches the new range, so the merged span has
        // no gaps and each byte is written at least once below.
        let mut buf = BytesMut::zeroed((merged_end - merged_start) as usize);
        for run in &absorbed {
            let at = (run.offset - merged_start) as usize;
            buf[at..at + run.data.len()].copy_from_slice(&run.data);
        }
        let at = (offset - merged_start) as usize;
        buf[at..at + data.len()].copy_from_slice(&data);

        let merged = ChunkRun {
            offset: merged_start,
            data: buf.freeze(),
        };
        let insert_at = self
            .runs
            .partition_point(|run| run.offset < merged.offset);
        self.runs.insert(insert_at, merged);
    }

    /// Return the exact slice for `[offset, offset + length)` if the range
    /// is fully covered, otherwise `None`. Never a partial result.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "run spans fit in usize on supported 64-bit platforms"
    )]
    pub(crate) fn read(&self, offset: u64, length: u64) -> Option<Bytes> {
        if length == 0 {
            return Some(Bytes::new());
        }
        let end = offset + length;
        let run = self
            .runs
            .iter()
            .find(|run| run.offset <= offset && run.end() >= end)?;
        let start = (offset - run.offset) as usize;
        let stop = (end - run.offset) as usize;
        Some(run.data.slice(start..stop))
    }

    /// Total cached bytes across all runs.
    pub(crate) fn total_len(&self) -> u64 {
        self.runs.iter().map(|run| run.data.len() as u64).sum()
    }
}
