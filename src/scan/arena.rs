//! Session-scoped chunk arena
//!
//! Chunks are owned by the arena and referenced everywhere else by
//! `ChunkId`. A slot is freed exactly once, either individually as soon as
//! the materializer drains the chunk, or in bulk at teardown/rescan.
//! Freed slots are reused.

use super::chunk::Chunk;

/// Handle of a chunk owned by a `ChunkArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(usize);

impl ChunkId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Allocation counters of the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub allocated: u64,
    pub released: u64,
    /// High-water mark of simultaneously live chunks
    pub peak_live: usize,
}

impl ArenaStats {
    pub fn live(&self) -> u64 {
        self.allocated - self.released
    }
}

/// Slot arena of chunks with a free list.
#[derive(Debug, Default)]
pub struct ChunkArena {
    slots: Vec<Option<Chunk>>,
    free: Vec<usize>,
    stats: ArenaStats,
}

impl ChunkArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `chunk`, returning its handle
    pub fn alloc(&mut self, chunk: Chunk) -> ChunkId {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(chunk);
                idx
            }
            None => {
                self.slots.push(Some(chunk));
                self.slots.len() - 1
            }
        };
        self.stats.allocated += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.live());
        ChunkId(idx)
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Free one chunk. Returns it, or `None` if the handle was already freed.
    pub fn release(&mut self, id: ChunkId) -> Option<Chunk> {
        let chunk = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.stats.released += 1;
        Some(chunk)
    }

    /// Free every live chunk, returning how many were freed
    pub fn release_all(&mut self) -> usize {
        let mut count = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.take().is_some() {
                self.free.push(idx);
                count += 1;
            }
        }
        self.stats.released += count as u64;
        count
    }

    /// Number of chunks currently owned
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.live() == 0
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }
}
