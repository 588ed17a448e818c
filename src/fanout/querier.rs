use crate::common::QueryContext;
use crate::error::{MultiError, TsdbError, TsdbResult, Warnings};
use crate::fanout::secondary::{SecondaryChunkQuerier, SecondaryQuerier};
use crate::iterators::ChunksMergeFn;
use crate::labels::Matcher;
use crate::series::{
    chained_series_merger, vertical_chunk_series_merger, BoxChunkSeriesSet, BoxSeriesSet,
    ErrorChunkSeriesSet, ErrorSeriesSet, MergeChunkSeriesSet, MergeSeriesSet,
    VerticalChunkSeriesMergeFn, VerticalSeriesMergeFn,
};
use crate::storage::{BoxChunkQuerier, BoxQuerier, ChunkQuerier, Querier, SelectHints};
use ahash::AHashSet;
use std::cmp::Ordering;
use std::sync::mpsc;
use tracing::debug;

/// Read handle over one primary and any number of secondary queriers.
///
/// Select scatters one task per querier and merges the gathered sets lazily;
/// the merge heap is only built on the first `next()` call, so a failed
/// primary is reported without consuming the secondaries. Label queries run
/// sequentially. Secondaries are wrapped on construction so their errors are
/// demoted to warnings everywhere.
pub struct MergeQuerier {
    ctx: QueryContext,
    queriers: Vec<BoxQuerier>,
    merge_fn: VerticalSeriesMergeFn,
}

impl MergeQuerier {
    pub fn new(ctx: QueryContext, primary: BoxQuerier, secondaries: Vec<BoxQuerier>) -> Self {
        Self::with_merger(ctx, primary, secondaries, chained_series_merger())
    }

    pub fn with_merger(
        ctx: QueryContext,
        primary: BoxQuerier,
        secondaries: Vec<BoxQuerier>,
        merge_fn: VerticalSeriesMergeFn,
    ) -> Self {
        let mut queriers = Vec::with_capacity(secondaries.len() + 1);
        queriers.push(primary);
        for querier in secondaries {
            if querier.is_noop() {
                continue;
            }
            queriers.push(Box::new(SecondaryQuerier::new(querier)) as BoxQuerier);
        }
        Self {
            ctx,
            queriers,
            merge_fn,
        }
    }
}

impl Querier for MergeQuerier {
    fn select(
        &self,
        sort_series: bool,
        hints: Option<&SelectHints>,
        matchers: &[Matcher],
    ) -> BoxSeriesSet {
        if let Err(e) = self.ctx.check() {
            return Box::new(ErrorSeriesSet::new(e));
        }
        if self.queriers.len() == 1 {
            return self.queriers[0].select(sort_series, hints, matchers);
        }
        debug!(
            backends = self.queriers.len(),
            "scattering select across backends"
        );
        // one task per backend; the scope join is the completion barrier
        let (tx, rx) = mpsc::sync_channel(self.queriers.len());
        rayon::scope(|scope| {
            for querier in &self.queriers {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    // backends sort so the merge heap sees ascending label sets
                    let set = querier.select(true, hints, matchers);
                    let _ = tx.send(set);
                });
            }
        });
        drop(tx);
        let sets: Vec<BoxSeriesSet> = rx.into_iter().collect();
        Box::new(MergeSeriesSet::new(sets, self.merge_fn.clone()))
    }

    fn label_values(&self, name: &str) -> TsdbResult<(Vec<String>, Warnings)> {
        self.ctx.check()?;
        collect_label_values(name, self.queriers.iter().map(|q| q.label_values(name)))
    }

    fn label_names(&self) -> TsdbResult<(Vec<String>, Warnings)> {
        self.ctx.check()?;
        collect_label_names(self.queriers.iter().map(|q| q.label_names()))
    }

    fn close(&mut self) -> TsdbResult<()> {
        let mut errs = MultiError::new();
        for querier in &mut self.queriers {
            errs.add(querier.close());
        }
        errs.err()
    }
}

/// [`MergeQuerier`] at chunk granularity. The vertical merger is built from
/// the caller-supplied chunk overlap merge function.
pub struct MergeChunkQuerier {
    ctx: QueryContext,
    queriers: Vec<BoxChunkQuerier>,
    merge_fn: VerticalChunkSeriesMergeFn,
}

impl MergeChunkQuerier {
    pub fn new(
        ctx: QueryContext,
        primary: BoxChunkQuerier,
        secondaries: Vec<BoxChunkQuerier>,
        chunks_merge_fn: ChunksMergeFn,
    ) -> Self {
        Self::with_merger(
            ctx,
            primary,
            secondaries,
            vertical_chunk_series_merger(chunks_merge_fn),
        )
    }

    pub fn with_merger(
        ctx: QueryContext,
        primary: BoxChunkQuerier,
        secondaries: Vec<BoxChunkQuerier>,
        merge_fn: VerticalChunkSeriesMergeFn,
    ) -> Self {
        let mut queriers = Vec::with_capacity(secondaries.len() + 1);
        queriers.push(primary);
        for querier in secondaries {
            if querier.is_noop() {
                continue;
            }
            queriers.push(Box::new(SecondaryChunkQuerier::new(querier)) as BoxChunkQuerier);
        }
        Self {
            ctx,
            queriers,
            merge_fn,
        }
    }
}

impl ChunkQuerier for MergeChunkQuerier {
    fn select(
        &self,
        sort_series: bool,
        hints: Option<&SelectHints>,
        matchers: &[Matcher],
    ) -> BoxChunkSeriesSet {
        if let Err(e) = self.ctx.check() {
            return Box::new(ErrorChunkSeriesSet::new(e));
        }
        if self.queriers.len() == 1 {
            return self.queriers[0].select(sort_series, hints, matchers);
        }
        debug!(
            backends = self.queriers.len(),
            "scattering chunk select across backends"
        );
        let (tx, rx) = mpsc::sync_channel(self.queriers.len());
        rayon::scope(|scope| {
            for querier in &self.queriers {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let set = querier.select(true, hints, matchers);
                    let _ = tx.send(set);
                });
            }
        });
        drop(tx);
        let sets: Vec<BoxChunkSeriesSet> = rx.into_iter().collect();
        Box::new(MergeChunkSeriesSet::new(sets, self.merge_fn.clone()))
    }

    fn label_values(&self, name: &str) -> TsdbResult<(Vec<String>, Warnings)> {
        self.ctx.check()?;
        collect_label_values(name, self.queriers.iter().map(|q| q.label_values(name)))
    }

    fn label_names(&self) -> TsdbResult<(Vec<String>, Warnings)> {
        self.ctx.check()?;
        collect_label_names(self.queriers.iter().map(|q| q.label_names()))
    }

    fn close(&mut self) -> TsdbResult<()> {
        let mut errs = MultiError::new();
        for querier in &mut self.queriers {
            errs.add(querier.close());
        }
        errs.err()
    }
}

fn collect_label_values(
    name: &str,
    results: impl Iterator<Item = TsdbResult<(Vec<String>, Warnings)>>,
) -> TsdbResult<(Vec<String>, Warnings)> {
    let mut slices: Vec<Vec<String>> = Vec::new();
    let mut warnings = Warnings::new();
    for res in results {
        let (values, ws) = res.map_err(|e| TsdbError::LabelValues {
            name: name.to_string(),
            source: Box::new(e),
        })?;
        warnings.extend(ws);
        if !values.is_empty() {
            slices.push(values);
        }
    }
    Ok((merge_string_slices(slices), warnings))
}

fn collect_label_names(
    results: impl Iterator<Item = TsdbResult<(Vec<String>, Warnings)>>,
) -> TsdbResult<(Vec<String>, Warnings)> {
    let mut names: AHashSet<String> = AHashSet::new();
    let mut warnings = Warnings::new();
    for res in results {
        let (ns, ws) = res.map_err(|e| TsdbError::LabelNames(Box::new(e)))?;
        warnings.extend(ws);
        names.extend(ns);
    }
    let mut names: Vec<String> = names.into_iter().collect();
    names.sort_unstable();
    Ok((names, warnings))
}

/// Fold sorted value slices into one sorted, deduplicated slice by splitting
/// the list in halves and merging pairwise.
pub(crate) fn merge_string_slices(mut slices: Vec<Vec<String>>) -> Vec<String> {
    match slices.len() {
        0 => Vec::new(),
        1 => slices.swap_remove(0),
        2 => {
            let right = slices.swap_remove(1);
            let left = slices.swap_remove(0);
            merge_two_string_slices(left, right)
        }
        _ => {
            let right = slices.split_off(slices.len() / 2);
            merge_two_string_slices(merge_string_slices(slices), merge_string_slices(right))
        }
    }
}

fn merge_two_string_slices(left: Vec<String>, right: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => match l.cmp(r) {
                Ordering::Less => {
                    if let Some(v) = left.next() {
                        out.push(v);
                    }
                }
                Ordering::Greater => {
                    if let Some(v) = right.next() {
                        out.push(v);
                    }
                }
                Ordering::Equal => {
                    if let Some(v) = left.next() {
                        out.push(v);
                    }
                    right.next();
                }
            },
            (Some(_), None) => {
                out.extend(left);
                break;
            }
            (None, _) => {
                out.extend(right);
                break;
            }
        }
    }
    out
}
