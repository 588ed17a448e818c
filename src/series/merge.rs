use crate::error::{TsdbError, Warnings};
use crate::iterators::{
    BoxChunkIterator, BoxSampleIterator, ChainedChunkIterator, ChainedSampleIterator, ChunksMergeFn,
};
use crate::labels::Labels;
use crate::series::{
    BoxChunkSeriesSet, BoxSeriesSet, ChunkSeries, ChunkSeriesSet, EmptyChunkSeries, EmptySeries,
    Series, SeriesSet, SharedChunkSeries, SharedSeries,
};
use min_max_heap::MinMaxHeap;
use smallvec::SmallVec;
use std::sync::Arc;

/// Merges N series sharing one label set into a single series.
pub type VerticalSeriesMergeFn = Arc<dyn Fn(Vec<SharedSeries>) -> SharedSeries + Send + Sync>;

/// Merges N chunk series sharing one label set into a single chunk series.
pub type VerticalChunkSeriesMergeFn =
    Arc<dyn Fn(Vec<SharedChunkSeries>) -> SharedChunkSeries + Send + Sync>;

/// The default vertical merger: a [`ChainedSeries`] backed by the k-way
/// sample merge.
pub fn chained_series_merger() -> VerticalSeriesMergeFn {
    Arc::new(merge_series)
}

pub fn merge_series(mut series: Vec<SharedSeries>) -> SharedSeries {
    match series.len() {
        0 => Arc::new(EmptySeries::new()),
        1 => series.swap_remove(0),
        _ => Arc::new(ChainedSeries::new(series)),
    }
}

/// Vertical chunk merger parameterized by the overlap merge function handed
/// to every [`ChainedChunkIterator`] it creates.
pub fn vertical_chunk_series_merger(merge_fn: ChunksMergeFn) -> VerticalChunkSeriesMergeFn {
    Arc::new(move |mut series: Vec<SharedChunkSeries>| match series.len() {
        0 => Arc::new(EmptyChunkSeries::new()) as SharedChunkSeries,
        1 => series.swap_remove(0),
        _ => Arc::new(ChainedChunkSeries::new(series, merge_fn.clone())) as SharedChunkSeries,
    })
}

/// A series fanning its iterator out over the members' iterators. All members
/// carry the same label set, guaranteed by the set-level merge that groups
/// them.
pub struct ChainedSeries {
    labels: Labels,
    series: Vec<SharedSeries>,
}

impl ChainedSeries {
    pub fn new(series: Vec<SharedSeries>) -> Self {
        let labels = series
            .first()
            .map(|s| s.labels().clone())
            .unwrap_or_default();
        Self { labels, series }
    }
}

impl Series for ChainedSeries {
    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn iterator(&self) -> BoxSampleIterator {
        Box::new(ChainedSampleIterator::new(
            self.series.iter().map(|s| s.iterator()).collect(),
        ))
    }
}

pub struct ChainedChunkSeries {
    labels: Labels,
    series: Vec<SharedChunkSeries>,
    merge_fn: ChunksMergeFn,
}

impl ChainedChunkSeries {
    pub fn new(series: Vec<SharedChunkSeries>, merge_fn: ChunksMergeFn) -> Self {
        let labels = series
            .first()
            .map(|s| s.labels().clone())
            .unwrap_or_default();
        Self {
            labels,
            series,
            merge_fn,
        }
    }
}

impl ChunkSeries for ChainedChunkSeries {
    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn chunk_iterator(&self) -> BoxChunkIterator {
        Box::new(ChainedChunkIterator::new(
            self.series.iter().map(|s| s.chunk_iterator()).collect(),
            self.merge_fn.clone(),
        ))
    }
}

/// Source-set abstraction shared by the sample- and chunk-granularity merges.
trait MergableSet {
    type Item: Clone;
    fn advance(&mut self) -> bool;
    fn current(&self) -> Option<Self::Item>;
    fn current_labels(&self) -> Option<Labels>;
    fn error(&self) -> Option<TsdbError>;
    fn warning_list(&self) -> Warnings;
}

impl MergableSet for BoxSeriesSet {
    type Item = SharedSeries;

    fn advance(&mut self) -> bool {
        self.next()
    }

    fn current(&self) -> Option<SharedSeries> {
        self.at()
    }

    fn current_labels(&self) -> Option<Labels> {
        self.at().map(|s| s.labels().clone())
    }

    fn error(&self) -> Option<TsdbError> {
        self.err()
    }

    fn warning_list(&self) -> Warnings {
        self.warnings()
    }
}

impl MergableSet for BoxChunkSeriesSet {
    type Item = SharedChunkSeries;

    fn advance(&mut self) -> bool {
        self.next()
    }

    fn current(&self) -> Option<SharedChunkSeries> {
        self.at()
    }

    fn current_labels(&self) -> Option<Labels> {
        self.at().map(|s| s.labels().clone())
    }

    fn error(&self) -> Option<TsdbError> {
        self.err()
    }

    fn warning_list(&self) -> Warnings {
        self.warnings()
    }
}

/// Heap handle for one source set, keyed by the label set of the source's
/// current series; the arena index breaks ties.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SetCursor {
    labels: Labels,
    source: usize,
}

/// K-way, label-keyed merge of source sets.
///
/// Priming is deferred to the first `next()` call. Source sets exposed at
/// step k are advanced only at step k+1, so `at()` is stable between calls.
/// A terminal error on any source set aborts the merge: nothing further is
/// yielded and the error surfaces through `err()`.
struct MergeCore<S: MergableSet> {
    sets: Vec<S>,
    heap: MinMaxHeap<SetCursor>,
    current: SmallVec<usize, 4>,
    merge_fn: Arc<dyn Fn(Vec<S::Item>) -> S::Item + Send + Sync>,
    error: Option<TsdbError>,
    initialized: bool,
}

impl<S: MergableSet> MergeCore<S> {
    fn new(sets: Vec<S>, merge_fn: Arc<dyn Fn(Vec<S::Item>) -> S::Item + Send + Sync>) -> Self {
        let cap = sets.len();
        Self {
            sets,
            heap: MinMaxHeap::with_capacity(cap),
            current: SmallVec::new(),
            merge_fn,
            error: None,
            initialized: false,
        }
    }

    fn push_set(&mut self, source: usize) {
        if let Some(labels) = self.sets[source].current_labels() {
            self.heap.push(SetCursor { labels, source });
        }
    }

    fn advance_set(&mut self, source: usize) -> Result<(), TsdbError> {
        if self.sets[source].advance() {
            self.push_set(source);
        } else if let Some(e) = self.sets[source].error() {
            return Err(e);
        }
        Ok(())
    }

    fn abort(&mut self, e: TsdbError) {
        self.error = Some(e);
        self.heap = MinMaxHeap::new();
        self.current.clear();
    }

    fn next(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        if !self.initialized {
            self.initialized = true;
            for idx in 0..self.sets.len() {
                if let Err(e) = self.advance_set(idx) {
                    self.abort(e);
                    return false;
                }
            }
        } else {
            let exposed = std::mem::take(&mut self.current);
            for idx in exposed {
                if let Err(e) = self.advance_set(idx) {
                    self.abort(e);
                    return false;
                }
            }
        }

        loop {
            let labels = match self.heap.peek_min() {
                Some(cursor) => cursor.labels.clone(),
                None => return false,
            };
            self.current.clear();
            while self.heap.peek_min().is_some_and(|c| c.labels == labels) {
                let Some(cursor) = self.heap.pop_min() else {
                    break;
                };
                self.current.push(cursor.source);
            }
            if !self.current.is_empty() {
                return true;
            }
            // a source vanished between passes; fall through to the next group
        }
    }

    fn at(&self) -> Option<S::Item> {
        if self.current.len() == 1 {
            return self.sets[self.current[0]].current();
        }
        let members: Vec<S::Item> = self
            .current
            .iter()
            .filter_map(|&idx| self.sets[idx].current())
            .collect();
        if members.is_empty() {
            return None;
        }
        Some((self.merge_fn)(members))
    }

    fn err(&self) -> Option<TsdbError> {
        if let Some(e) = &self.error {
            return Some(e.clone());
        }
        self.sets.iter().find_map(|s| s.error())
    }

    fn warnings(&self) -> Warnings {
        self.sets.iter().flat_map(|s| s.warning_list()).collect()
    }
}

/// Label-keyed merge of series sets across backends. Series bearing identical
/// label sets are grouped and handed to the vertical merger; the output is
/// strictly label-ascending with one entry per distinct label set.
pub struct MergeSeriesSet {
    core: MergeCore<BoxSeriesSet>,
}

impl MergeSeriesSet {
    pub fn new(sets: Vec<BoxSeriesSet>, merge_fn: VerticalSeriesMergeFn) -> Self {
        Self {
            core: MergeCore::new(sets, merge_fn),
        }
    }
}

impl SeriesSet for MergeSeriesSet {
    fn next(&mut self) -> bool {
        self.core.next()
    }

    fn at(&self) -> Option<SharedSeries> {
        self.core.at()
    }

    fn err(&self) -> Option<TsdbError> {
        self.core.err()
    }

    fn warnings(&self) -> Warnings {
        self.core.warnings()
    }
}

/// [`MergeSeriesSet`] at chunk granularity.
pub struct MergeChunkSeriesSet {
    core: MergeCore<BoxChunkSeriesSet>,
}

impl MergeChunkSeriesSet {
    pub fn new(sets: Vec<BoxChunkSeriesSet>, merge_fn: VerticalChunkSeriesMergeFn) -> Self {
        Self {
            core: MergeCore::new(sets, merge_fn),
        }
    }
}

impl ChunkSeriesSet for MergeChunkSeriesSet {
    fn next(&mut self) -> bool {
        self.core.next()
    }

    fn at(&self) -> Option<SharedChunkSeries> {
        self.core.at()
    }

    fn err(&self) -> Option<TsdbError> {
        self.core.err()
    }

    fn warnings(&self) -> Warnings {
        self.core.warnings()
    }
}
