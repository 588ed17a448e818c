use crate::error::{TsdbError, TsdbResult, Warnings};
use crate::labels::Matcher;
use crate::series::{
    BoxChunkSeriesSet, BoxSeriesSet, ChunkSeriesSet, SeriesSet, SharedChunkSeries, SharedSeries,
};
use crate::storage::{BoxChunkQuerier, BoxQuerier, ChunkQuerier, Querier, SelectHints};
use tracing::warn;

/// Wraps a secondary backend's querier so every error it raises is demoted to
/// a warning and its contribution degrades to empty. Close errors stay real;
/// the merge querier aggregates them.
pub struct SecondaryQuerier {
    inner: BoxQuerier,
}

impl SecondaryQuerier {
    pub fn new(inner: BoxQuerier) -> Self {
        Self { inner }
    }
}

impl Querier for SecondaryQuerier {
    fn select(
        &self,
        sort_series: bool,
        hints: Option<&SelectHints>,
        matchers: &[Matcher],
    ) -> BoxSeriesSet {
        Box::new(SecondarySeriesSet::new(
            self.inner.select(sort_series, hints, matchers),
        ))
    }

    fn label_values(&self, name: &str) -> TsdbResult<(Vec<String>, Warnings)> {
        match self.inner.label_values(name) {
            Ok(res) => Ok(res),
            Err(e) => {
                warn!(error = %e, label = name, "secondary backend label_values failed");
                Ok((Vec::new(), vec![e]))
            }
        }
    }

    fn label_names(&self) -> TsdbResult<(Vec<String>, Warnings)> {
        match self.inner.label_names() {
            Ok(res) => Ok(res),
            Err(e) => {
                warn!(error = %e, "secondary backend label_names failed");
                Ok((Vec::new(), vec![e]))
            }
        }
    }

    fn close(&mut self) -> TsdbResult<()> {
        self.inner.close()
    }

    fn is_noop(&self) -> bool {
        self.inner.is_noop()
    }
}

/// Set wrapper that turns a terminal error into a warning and ends the
/// stream. The failed set's partial contribution past the point of failure is
/// dropped.
pub struct SecondarySeriesSet {
    inner: BoxSeriesSet,
    demoted: Option<TsdbError>,
}

impl SecondarySeriesSet {
    pub fn new(inner: BoxSeriesSet) -> Self {
        Self {
            inner,
            demoted: None,
        }
    }
}

impl SeriesSet for SecondarySeriesSet {
    fn next(&mut self) -> bool {
        if self.demoted.is_some() {
            return false;
        }
        if self.inner.next() {
            return true;
        }
        if let Some(e) = self.inner.err() {
            warn!(error = %e, "dropping results of failed secondary backend");
            self.demoted = Some(e);
        }
        false
    }

    fn at(&self) -> Option<SharedSeries> {
        if self.demoted.is_some() {
            return None;
        }
        self.inner.at()
    }

    fn err(&self) -> Option<TsdbError> {
        None
    }

    fn warnings(&self) -> Warnings {
        let mut warnings = self.inner.warnings();
        if let Some(e) = &self.demoted {
            warnings.push(e.clone());
        }
        warnings
    }
}

/// [`SecondaryQuerier`] at chunk granularity.
pub struct SecondaryChunkQuerier {
    inner: BoxChunkQuerier,
}

impl SecondaryChunkQuerier {
    pub fn new(inner: BoxChunkQuerier) -> Self {
        Self { inner }
    }
}

impl ChunkQuerier for SecondaryChunkQuerier {
    fn select(
        &self,
        sort_series: bool,
        hints: Option<&SelectHints>,
        matchers: &[Matcher],
    ) -> BoxChunkSeriesSet {
        Box::new(SecondaryChunkSeriesSet::new(
            self.inner.select(sort_series, hints, matchers),
        ))
    }

    fn label_values(&self, name: &str) -> TsdbResult<(Vec<String>, Warnings)> {
        match self.inner.label_values(name) {
            Ok(res) => Ok(res),
            Err(e) => {
                warn!(error = %e, label = name, "secondary backend label_values failed");
                Ok((Vec::new(), vec![e]))
            }
        }
    }

    fn label_names(&self) -> TsdbResult<(Vec<String>, Warnings)> {
        match self.inner.label_names() {
            Ok(res) => Ok(res),
            Err(e) => {
                warn!(error = %e, "secondary backend label_names failed");
                Ok((Vec::new(), vec![e]))
            }
        }
    }

    fn close(&mut self) -> TsdbResult<()> {
        self.inner.close()
    }

    fn is_noop(&self) -> bool {
        self.inner.is_noop()
    }
}

pub struct SecondaryChunkSeriesSet {
    inner: BoxChunkSeriesSet,
    demoted: Option<TsdbError>,
}

impl SecondaryChunkSeriesSet {
    pub fn new(inner: BoxChunkSeriesSet) -> Self {
        Self {
            inner,
            demoted: None,
        }
    }
}

impl ChunkSeriesSet for SecondaryChunkSeriesSet {
    fn next(&mut self) -> bool {
        if self.demoted.is_some() {
            return false;
        }
        if self.inner.next() {
            return true;
        }
        if let Some(e) = self.inner.err() {
            warn!(error = %e, "dropping results of failed secondary backend");
            self.demoted = Some(e);
        }
        false
    }

    fn at(&self) -> Option<SharedChunkSeries> {
        if self.demoted.is_some() {
            return None;
        }
        self.inner.at()
    }

    fn err(&self) -> Option<TsdbError> {
        None
    }

    fn warnings(&self) -> Warnings {
        let mut warnings = self.inner.warnings();
        if let Some(e) = &self.demoted {
            warnings.push(e.clone());
        }
        warnings
    }
}
