use crate::common::Chunk;
use crate::error::TsdbError;

/// Cursor over one series' chunks, produced in ascending
/// `(min_time, max_time)` order. Same pre-advanced model as
/// [`SampleIterator`](crate::iterators::SampleIterator), without seeking.
pub trait ChunkIterator: Send {
    /// Advance past the currently exposed chunk. Returns false once the
    /// iterator is exhausted.
    fn next(&mut self) -> bool;

    /// The chunk under the cursor.
    fn at(&self) -> Chunk;

    /// Terminal error, if any, once `next()` has returned false.
    fn err(&self) -> Option<TsdbError>;
}

pub type BoxChunkIterator = Box<dyn ChunkIterator>;

/// Iterator over an owned, time-sorted chunk vector.
#[derive(Debug, Default)]
pub struct VecChunkIterator {
    chunks: Vec<Chunk>,
    pos: Option<usize>,
}

impl VecChunkIterator {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        debug_assert!(chunks
            .windows(2)
            .all(|w| (w[0].min_time, w[0].max_time) <= (w[1].min_time, w[1].max_time)));
        Self { chunks, pos: None }
    }
}

impl ChunkIterator for VecChunkIterator {
    fn next(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p.saturating_add(1));
        self.pos = Some(next.min(self.chunks.len()));
        next < self.chunks.len()
    }

    fn at(&self) -> Chunk {
        match self.pos {
            Some(p) if p < self.chunks.len() => self.chunks[p].clone(),
            _ => Chunk::default(),
        }
    }

    fn err(&self) -> Option<TsdbError> {
        None
    }
}

impl From<Vec<Chunk>> for VecChunkIterator {
    fn from(chunks: Vec<Chunk>) -> Self {
        Self::new(chunks)
    }
}

/// Chunk iterator carrying only a terminal error.
#[derive(Debug)]
pub struct ErrorChunkIterator {
    err: TsdbError,
}

impl ErrorChunkIterator {
    pub fn new(err: TsdbError) -> Self {
        Self { err }
    }
}

impl ChunkIterator for ErrorChunkIterator {
    fn next(&mut self) -> bool {
        false
    }

    fn at(&self) -> Chunk {
        Chunk::default()
    }

    fn err(&self) -> Option<TsdbError> {
        Some(self.err.clone())
    }
}
