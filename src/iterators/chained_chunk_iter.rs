use crate::common::{Chunk, Timestamp};
use crate::error::TsdbError;
use crate::iterators::{BoxChunkIterator, ChunkIterator};
use min_max_heap::MinMaxHeap;
use std::sync::Arc;

/// Fuses a run of time-overlapping chunks into a replacement chunk stream,
/// typically a single re-encoded chunk. The merger never splits on size.
pub type ChunksMergeFn = Arc<dyn Fn(Vec<Chunk>) -> BoxChunkIterator + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ChunkCursor {
    min_time: Timestamp,
    max_time: Timestamp,
    source: usize,
}

/// K-way merge of chunk iterators belonging to one series, keyed by
/// `(min_time, max_time)` ascending.
///
/// Chunks that overlap in time are collected into a run — overlap is
/// transitive, the run's max extends as chunks join it — and the whole run is
/// handed to the overlap merger in one call. The merger's output re-enters
/// the heap, so it competes with the remaining sources like any other stream.
/// A chunk whose interval exactly equals the previous chunk's is dropped.
pub struct ChainedChunkIterator {
    iterators: Vec<BoxChunkIterator>,
    heap: MinMaxHeap<ChunkCursor>,
    merge_fn: ChunksMergeFn,
    current: Option<Chunk>,
    error: Option<TsdbError>,
    initialized: bool,
}

impl ChainedChunkIterator {
    pub fn new(iterators: Vec<BoxChunkIterator>, merge_fn: ChunksMergeFn) -> Self {
        let cap = iterators.len();
        Self {
            iterators,
            heap: MinMaxHeap::with_capacity(cap),
            merge_fn,
            current: None,
            error: None,
            initialized: false,
        }
    }

    fn push_source(&mut self, source: usize) {
        let chunk = self.iterators[source].at();
        self.heap.push(ChunkCursor {
            min_time: chunk.min_time,
            max_time: chunk.max_time,
            source,
        });
    }

    fn advance_source(&mut self, source: usize) {
        if self.iterators[source].next() {
            self.push_source(source);
        }
    }

    fn prime(&mut self) {
        self.initialized = true;
        for idx in 0..self.iterators.len() {
            self.advance_source(idx);
        }
    }
}

impl ChunkIterator for ChainedChunkIterator {
    fn next(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        if !self.initialized {
            self.prime();
        }
        let Some(top) = self.heap.pop_min() else {
            self.current = None;
            return false;
        };
        let mut cur = self.iterators[top.source].at();
        self.advance_source(top.source);

        // Collect the transitive run of chunks overlapping [cur.min_time, run_max].
        let mut overlapping: Vec<Chunk> = Vec::new();
        let mut run_max = cur.max_time;
        let mut prev = (cur.min_time, cur.max_time);
        while self.heap.peek_min().is_some_and(|c| c.min_time <= run_max) {
            let Some(cursor) = self.heap.pop_min() else {
                break;
            };
            let chunk = self.iterators[cursor.source].at();
            self.advance_source(cursor.source);
            if (chunk.min_time, chunk.max_time) == prev {
                continue;
            }
            run_max = run_max.max(chunk.max_time);
            prev = (chunk.min_time, chunk.max_time);
            overlapping.push(chunk);
        }

        if !overlapping.is_empty() {
            let mut run = Vec::with_capacity(overlapping.len() + 1);
            run.push(cur);
            run.append(&mut overlapping);
            run.sort_by_key(|c| (c.min_time, c.max_time));
            let mut merged = (self.merge_fn)(run);
            if !merged.next() {
                self.error = Some(merged.err().unwrap_or_else(|| {
                    TsdbError::General("chunk overlap merger produced no chunks".to_string())
                }));
                self.current = None;
                return false;
            }
            cur = merged.at();
            if merged.next() {
                let source = self.iterators.len();
                self.iterators.push(merged);
                self.push_source(source);
            } else if let Some(e) = merged.err() {
                self.error = Some(e);
                self.current = None;
                return false;
            }
        }

        self.current = Some(cur);
        true
    }

    fn at(&self) -> Chunk {
        self.current.clone().unwrap_or_default()
    }

    fn err(&self) -> Option<TsdbError> {
        if let Some(e) = &self.error {
            return Some(e.clone());
        }
        self.iterators.iter().find_map(|it| it.err())
    }
}
