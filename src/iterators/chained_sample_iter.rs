use crate::common::{Sample, Timestamp};
use crate::error::TsdbError;
use crate::iterators::{BoxSampleIterator, SampleIterator};
use min_max_heap::MinMaxHeap;

/// Heap handle for one source. Every entry in the heap references a source
/// positioned on a valid sample; the key is that sample's timestamp, with the
/// arena index as deterministic tiebreak.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SampleCursor {
    timestamp: Timestamp,
    source: usize,
}

/// K-way merge of sample iterators belonging to one series.
///
/// Samples surface in strictly ascending timestamp order. When several
/// sources carry a sample at the same timestamp, the one that first reaches
/// the front of the heap wins; the others are stepped past, so a timestamp is
/// never exposed twice.
pub struct ChainedSampleIterator {
    iterators: Vec<BoxSampleIterator>,
    heap: MinMaxHeap<SampleCursor>,
    initialized: bool,
}

impl ChainedSampleIterator {
    pub fn new(iterators: Vec<BoxSampleIterator>) -> Self {
        let cap = iterators.len();
        Self {
            iterators,
            heap: MinMaxHeap::with_capacity(cap),
            initialized: false,
        }
    }

    // Sources are pushed only after being positioned on a sample, so the heap
    // never holds an exhausted source.
    fn push_source(&mut self, source: usize) {
        let timestamp = self.iterators[source].at().timestamp;
        self.heap.push(SampleCursor { timestamp, source });
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

impl SampleIterator for ChainedSampleIterator {
    fn next(&mut self) -> bool {
        if !self.initialized {
            self.prime();
            return !self.heap.is_empty();
        }
        let Some(top) = self.heap.peek_min().copied() else {
            return false;
        };
        // Step every source sitting on the exposed timestamp past it; this is
        // also what drops duplicates.
        while self
            .heap
            .peek_min()
            .is_some_and(|c| c.timestamp == top.timestamp)
        {
            let Some(cursor) = self.heap.pop_min() else {
                break;
            };
            self.advance_source(cursor.source);
        }
        !self.heap.is_empty()
    }

    fn seek(&mut self, ts: Timestamp) -> bool {
        self.initialized = true;
        self.heap = MinMaxHeap::with_capacity(self.iterators.len());
        for idx in 0..self.iterators.len() {
            if self.iterators[idx].seek(ts) {
                self.push_source(idx);
            }
        }
        !self.heap.is_empty()
    }

    fn at(&self) -> Sample {
        match self.heap.peek_min() {
            Some(cursor) => self.iterators[cursor.source].at(),
            None => Sample::default(),
        }
    }

    fn err(&self) -> Option<TsdbError> {
        self.iterators.iter().find_map(|it| it.err())
    }
}
