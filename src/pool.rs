//! Chunked append-only storage for fixed-record counter slices.
//!
//! Every cost record read from a dump file keeps its counters in here.
//! Chunks have fixed capacity and never reallocate, so a `CostRef` stays
//! valid for the lifetime of the pool; there is no per-record free, the
//! whole pool drops with the owning data.

use crate::subcost::SubCost;

/// Counter slots per chunk (the traditional 100 kB chunk size).
const CHUNK_SLOTS: usize = 100_000 / std::mem::size_of::<SubCost>();

/// Handle to a slice inside the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CostRef {
    chunk: u32,
    start: u32,
    len: u32,
}

impl CostRef {
    pub const EMPTY: CostRef = CostRef {
        chunk: 0,
        start: 0,
        len: 0,
    };

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Default)]
pub struct CostPool {
    chunks: Vec<Vec<SubCost>>,
    records: usize,
    slots: usize,
}

impl CostPool {
    pub fn new() -> CostPool {
        CostPool::default()
    }

    /// Number of records allocated so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Total counter slots in use.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Reserve `max` slots, let `fill` write into them and report how many
    /// it actually used, then commit only that prefix. This is how
    /// variable-width cost lines are stored without a second copy.
    /// Returns `None` only for `max` beyond a chunk.
    pub fn alloc_with<F>(&mut self, max: usize, fill: F) -> Option<CostRef>
    where
        F: FnOnce(&mut [SubCost]) -> usize,
    {
        if max > CHUNK_SLOTS {
            return None;
        }
        let needs_chunk = match self.chunks.last() {
            Some(c) => c.capacity() - c.len() < max,
            None => true,
        };
        if needs_chunk {
            self.chunks.push(Vec::with_capacity(CHUNK_SLOTS));
        }

        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let start = chunk.len();
        chunk.resize(start + max, SubCost::ZERO);
        let used = fill(&mut chunk[start..start + max]).min(max);
        chunk.truncate(start + used);

        self.records += 1;
        self.slots += used;
        Some(CostRef {
            chunk: chunk_index as u32,
            start: start as u32,
            len: used as u32,
        })
    }

    /// Store a fixed slice of counters.
    pub fn alloc(&mut self, values: &[SubCost]) -> Option<CostRef> {
        self.alloc_with(values.len(), |buf| {
            buf.copy_from_slice(values);
            values.len()
        })
    }

    pub fn get(&self, r: CostRef) -> &[SubCost] {
        let chunk = &self.chunks[r.chunk as usize];
        &chunk[r.start as usize..(r.start + r.len) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut pool = CostPool::new();
        let r = pool.alloc(&[SubCost(1), SubCost(2), SubCost(3)]).unwrap();
        assert_eq!(pool.get(r), &[SubCost(1), SubCost(2), SubCost(3)]);
        assert_eq!(pool.records(), 1);
        assert_eq!(pool.slots(), 3);
    }

    #[test]
    fn test_reserve_commit_prefix() {
        let mut pool = CostPool::new();
        let r = pool
            .alloc_with(20, |buf| {
                buf[0] = SubCost(7);
                buf[1] = SubCost(8);
                2
            })
            .unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(pool.get(r), &[SubCost(7), SubCost(8)]);
        assert_eq!(pool.slots(), 2);

        // the freed reservation is reused by the next allocation
        let r2 = pool.alloc(&[SubCost(9)]).unwrap();
        assert_eq!(pool.get(r2), &[SubCost(9)]);
        assert_eq!(pool.get(r), &[SubCost(7), SubCost(8)]);
    }

    #[test]
    fn test_oversized_refused() {
        let mut pool = CostPool::new();
        assert!(pool.alloc_with(CHUNK_SLOTS + 1, |_| 0).is_none());
    }

    #[test]
    fn test_chunk_rollover_keeps_refs_valid() {
        let mut pool = CostPool::new();
        let mut refs = Vec::new();
        // enough records to cross several chunk boundaries
        for i in 0..30_000u64 {
            refs.push((i, pool.alloc(&[SubCost(i)]).unwrap()));
        }
        for (i, r) in refs {
            assert_eq!(pool.get(r), &[SubCost(i)]);
        }
        assert!(pool.records() == 30_000);
    }

    #[test]
    fn test_empty_record() {
        let mut pool = CostPool::new();
        let r = pool.alloc_with(5, |_| 0).unwrap();
        assert!(r.is_empty());
        assert_eq!(pool.get(r), &[]);
    }
}
