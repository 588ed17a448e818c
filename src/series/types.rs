use crate::common::{Chunk, Sample};
use crate::error::{TsdbError, Warnings};
use crate::iterators::{BoxChunkIterator, BoxSampleIterator, VecChunkIterator, VecSampleIterator};
use crate::labels::Labels;
use std::sync::Arc;

/// A label-identified stream of timestamped samples.
pub trait Series: Send + Sync {
    fn labels(&self) -> &Labels;

    /// A fresh cursor over the series' samples, in strictly ascending
    /// timestamp order.
    fn iterator(&self) -> BoxSampleIterator;
}

/// A label-identified stream of encoded sample chunks.
pub trait ChunkSeries: Send + Sync {
    fn labels(&self) -> &Labels;

    /// A fresh cursor over the series' chunks, in ascending
    /// `(min_time, max_time)` order.
    fn chunk_iterator(&self) -> BoxChunkIterator;
}

pub type SharedSeries = Arc<dyn Series>;
pub type SharedChunkSeries = Arc<dyn ChunkSeries>;

/// A lazy, label-ascending stream of series. Carries a terminal error and a
/// list of non-fatal warnings.
pub trait SeriesSet: Send {
    /// Advance to the next series. Returns false once exhausted or aborted.
    fn next(&mut self) -> bool;

    /// The series the set is positioned on, or None when unpositioned.
    fn at(&self) -> Option<SharedSeries>;

    /// Terminal error, if any, once `next()` has returned false.
    fn err(&self) -> Option<TsdbError>;

    fn warnings(&self) -> Warnings;
}

/// [`SeriesSet`] at chunk granularity.
pub trait ChunkSeriesSet: Send {
    fn next(&mut self) -> bool;
    fn at(&self) -> Option<SharedChunkSeries>;
    fn err(&self) -> Option<TsdbError>;
    fn warnings(&self) -> Warnings;
}

pub type BoxSeriesSet = Box<dyn SeriesSet>;
pub type BoxChunkSeriesSet = Box<dyn ChunkSeriesSet>;

/// In-memory series over an owned sample vector, sorted by timestamp.
#[derive(Debug, Clone, Default)]
pub struct VecSeries {
    labels: Labels,
    samples: Vec<Sample>,
}

impl VecSeries {
    pub fn new(labels: Labels, samples: Vec<Sample>) -> Self {
        debug_assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        Self { labels, samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Series for VecSeries {
    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn iterator(&self) -> BoxSampleIterator {
        Box::new(VecSampleIterator::new(self.samples.clone()))
    }
}

/// In-memory chunk series over an owned chunk vector.
#[derive(Debug, Clone, Default)]
pub struct VecChunkSeries {
    labels: Labels,
    chunks: Vec<Chunk>,
}

impl VecChunkSeries {
    pub fn new(labels: Labels, chunks: Vec<Chunk>) -> Self {
        Self { labels, chunks }
    }
}

impl ChunkSeries for VecChunkSeries {
    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn chunk_iterator(&self) -> BoxChunkIterator {
        Box::new(VecChunkIterator::new(self.chunks.clone()))
    }
}

/// The null series: no labels, no samples.
#[derive(Debug, Clone, Default)]
pub struct EmptySeries {
    labels: Labels,
}

impl EmptySeries {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Series for EmptySeries {
    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn iterator(&self) -> BoxSampleIterator {
        Box::new(VecSampleIterator::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmptyChunkSeries {
    labels: Labels,
}

impl EmptyChunkSeries {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkSeries for EmptyChunkSeries {
    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn chunk_iterator(&self) -> BoxChunkIterator {
        Box::new(VecChunkIterator::default())
    }
}

/// Set over a label-sorted vector of series.
#[derive(Default)]
pub struct VecSeriesSet {
    series: Vec<SharedSeries>,
    pos: Option<usize>,
}

impl VecSeriesSet {
    /// `series` must already be in ascending label order.
    pub fn new(series: Vec<SharedSeries>) -> Self {
        debug_assert!(series.windows(2).all(|w| w[0].labels() < w[1].labels()));
        Self { series, pos: None }
    }

    /// Sorts the given series by label set and wraps them in a set.
    pub fn from_unsorted(mut series: Vec<SharedSeries>) -> Self {
        series.sort_by(|a, b| a.labels().cmp(b.labels()));
        Self { series, pos: None }
    }
}

impl SeriesSet for VecSeriesSet {
    fn next(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p.saturating_add(1));
        self.pos = Some(next.min(self.series.len()));
        next < self.series.len()
    }

    fn at(&self) -> Option<SharedSeries> {
        match self.pos {
            Some(p) if p < self.series.len() => Some(self.series[p].clone()),
            _ => None,
        }
    }

    fn err(&self) -> Option<TsdbError> {
        None
    }

    fn warnings(&self) -> Warnings {
        Warnings::new()
    }
}

/// Set over a label-sorted vector of chunk series.
#[derive(Default)]
pub struct VecChunkSeriesSet {
    series: Vec<SharedChunkSeries>,
    pos: Option<usize>,
}

impl VecChunkSeriesSet {
    pub fn new(series: Vec<SharedChunkSeries>) -> Self {
        debug_assert!(series.windows(2).all(|w| w[0].labels() < w[1].labels()));
        Self { series, pos: None }
    }
}

impl ChunkSeriesSet for VecChunkSeriesSet {
    fn next(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p.saturating_add(1));
        self.pos = Some(next.min(self.series.len()));
        next < self.series.len()
    }

    fn at(&self) -> Option<SharedChunkSeries> {
        match self.pos {
            Some(p) if p < self.series.len() => Some(self.series[p].clone()),
            _ => None,
        }
    }

    fn err(&self) -> Option<TsdbError> {
        None
    }

    fn warnings(&self) -> Warnings {
        Warnings::new()
    }
}

/// The empty set: yields nothing, reports nothing.
#[derive(Debug, Clone, Default)]
pub struct EmptySeriesSet;

impl SeriesSet for EmptySeriesSet {
    fn next(&mut self) -> bool {
        false
    }

    fn at(&self) -> Option<SharedSeries> {
        None
    }

    fn err(&self) -> Option<TsdbError> {
        None
    }

    fn warnings(&self) -> Warnings {
        Warnings::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmptyChunkSeriesSet;

impl ChunkSeriesSet for EmptyChunkSeriesSet {
    fn next(&mut self) -> bool {
        false
    }

    fn at(&self) -> Option<SharedChunkSeries> {
        None
    }

    fn err(&self) -> Option<TsdbError> {
        None
    }

    fn warnings(&self) -> Warnings {
        Warnings::new()
    }
}

/// Error-only set: yields nothing and reports the given terminal error.
#[derive(Debug, Clone)]
pub struct ErrorSeriesSet {
    err: TsdbError,
    warnings: Warnings,
}

impl ErrorSeriesSet {
    pub fn new(err: TsdbError) -> Self {
        Self {
            err,
            warnings: Warnings::new(),
        }
    }
}

impl SeriesSet for ErrorSeriesSet {
    fn next(&mut self) -> bool {
        false
    }

    fn at(&self) -> Option<SharedSeries> {
        None
    }

    fn err(&self) -> Option<TsdbError> {
        Some(self.err.clone())
    }

    fn warnings(&self) -> Warnings {
        self.warnings.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ErrorChunkSeriesSet {
    err: TsdbError,
    warnings: Warnings,
}

impl ErrorChunkSeriesSet {
    pub fn new(err: TsdbError) -> Self {
        Self {
            err,
            warnings: Warnings::new(),
        }
    }
}

impl ChunkSeriesSet for ErrorChunkSeriesSet {
    fn next(&mut self) -> bool {
        false
    }

    fn at(&self) -> Option<SharedChunkSeries> {
        None
    }

    fn err(&self) -> Option<TsdbError> {
        Some(self.err.clone())
    }

    fn warnings(&self) -> Warnings {
        self.warnings.clone()
    }
}
