use crate::common::{QueryContext, Timestamp};
use crate::error::{TsdbResult, Warnings};
use crate::labels::{Labels, Matcher};
use crate::series::{
    BoxChunkSeriesSet, BoxSeriesSet, EmptyChunkSeriesSet, EmptySeriesSet,
};
use bon::bon;
use serde::{Deserialize, Serialize};

/// Backend-scoped reference to a series, handed out by [`Appender::add`] for
/// use with [`Appender::add_fast`].
pub type SeriesRef = u64;

/// Opaque per-select configuration, passed through to backends untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectHints {
    pub start: Timestamp,
    pub end: Timestamp,
    /// Query step size in milliseconds.
    pub step: i64,
    /// Range vector selector range in milliseconds.
    pub range: i64,
    /// Aggregation or rate function applied downstream, if any.
    pub func: Option<String>,
    pub grouping: bool,
    pub by: Vec<String>,
    pub shard_index: u64,
    pub shard_count: u64,
}

#[bon]
impl SelectHints {
    #[builder]
    pub fn new(
        start: Timestamp,
        end: Timestamp,
        #[builder(default)] step: i64,
        #[builder(default)] range: i64,
        func: Option<String>,
        #[builder(default)] grouping: bool,
        #[builder(default)] by: Vec<String>,
        #[builder(default)] shard_index: u64,
        #[builder(default)] shard_count: u64,
    ) -> Self {
        Self {
            start,
            end,
            step,
            range,
            func,
            grouping,
            by,
            shard_index,
            shard_count,
        }
    }
}

/// A scoped read handle bound to one backend and one time range. Created by
/// [`Storage::querier`], used for the duration of one request, then closed.
pub trait Querier: Send + Sync {
    /// Stream the series matching `matchers`, label-ascending when
    /// `sort_series` is set.
    fn select(
        &self,
        sort_series: bool,
        hints: Option<&SelectHints>,
        matchers: &[Matcher],
    ) -> BoxSeriesSet;

    /// All values the label `name` takes within the querier's scope, sorted.
    fn label_values(&self, name: &str) -> TsdbResult<(Vec<String>, Warnings)>;

    /// All label names in scope, sorted.
    fn label_names(&self) -> TsdbResult<(Vec<String>, Warnings)>;

    /// Release every resource held by this querier and the sets and iterators
    /// it produced. Called exactly once.
    fn close(&mut self) -> TsdbResult<()>;

    /// Marks a querier the fan-out skips without error.
    fn is_noop(&self) -> bool {
        false
    }
}

/// [`Querier`] at chunk granularity.
pub trait ChunkQuerier: Send + Sync {
    fn select(
        &self,
        sort_series: bool,
        hints: Option<&SelectHints>,
        matchers: &[Matcher],
    ) -> BoxChunkSeriesSet;

    fn label_values(&self, name: &str) -> TsdbResult<(Vec<String>, Warnings)>;

    fn label_names(&self) -> TsdbResult<(Vec<String>, Warnings)>;

    fn close(&mut self) -> TsdbResult<()>;

    fn is_noop(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for dyn Querier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Querier").finish()
    }
}

pub type BoxQuerier = Box<dyn Querier>;
pub type BoxChunkQuerier = Box<dyn ChunkQuerier>;

/// A write transaction. Lives from creation until `commit` or `rollback`;
/// afterwards no further operations are valid. Appenders are driven from a
/// single thread.
pub trait Appender: Send {
    fn add(&mut self, labels: &Labels, ts: Timestamp, value: f64) -> TsdbResult<SeriesRef>;

    fn add_fast(&mut self, series_ref: SeriesRef, ts: Timestamp, value: f64) -> TsdbResult<()>;

    fn commit(&mut self) -> TsdbResult<()>;

    fn rollback(&mut self) -> TsdbResult<()>;
}

pub type BoxAppender = Box<dyn Appender>;

/// A concrete time-series backend.
pub trait Storage: Send + Sync {
    /// The earliest timestamp the backend can serve.
    fn start_time(&self) -> TsdbResult<Timestamp>;

    /// Open a read handle scoped to `[mint, maxt]`. `ctx` is the cancellation
    /// scope for the querier and everything it produces.
    fn querier(
        &self,
        ctx: QueryContext,
        mint: Timestamp,
        maxt: Timestamp,
    ) -> TsdbResult<BoxQuerier>;

    /// Open a write transaction.
    fn appender(&self) -> BoxAppender;

    fn close(&mut self) -> TsdbResult<()>;
}

/// Querier yielding nothing. The fan-out open path skips it without error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQuerier;

impl Querier for NoopQuerier {
    fn select(
        &self,
        _sort_series: bool,
        _hints: Option<&SelectHints>,
        _matchers: &[Matcher],
    ) -> BoxSeriesSet {
        Box::new(EmptySeriesSet)
    }

    fn label_values(&self, _name: &str) -> TsdbResult<(Vec<String>, Warnings)> {
        Ok((Vec::new(), Warnings::new()))
    }

    fn label_names(&self) -> TsdbResult<(Vec<String>, Warnings)> {
        Ok((Vec::new(), Warnings::new()))
    }

    fn close(&mut self) -> TsdbResult<()> {
        Ok(())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChunkQuerier;

impl ChunkQuerier for NoopChunkQuerier {
    fn select(
        &self,
        _sort_series: bool,
        _hints: Option<&SelectHints>,
        _matchers: &[Matcher],
    ) -> BoxChunkSeriesSet {
        Box::new(EmptyChunkSeriesSet)
    }

    fn label_values(&self, _name: &str) -> TsdbResult<(Vec<String>, Warnings)> {
        Ok((Vec::new(), Warnings::new()))
    }

    fn label_names(&self) -> TsdbResult<(Vec<String>, Warnings)> {
        Ok((Vec::new(), Warnings::new()))
    }

    fn close(&mut self) -> TsdbResult<()> {
        Ok(())
    }

    fn is_noop(&self) -> bool {
        true
    }
}
