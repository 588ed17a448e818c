use crate::common::{QueryContext, Sample, Timestamp};
use crate::error::{TsdbError, TsdbResult, Warnings};
use crate::fanout::querier::merge_string_slices;
use crate::fanout::{FanoutStorage, MergeChunkQuerier};
use crate::labels::{Labels, Matcher};
use crate::series::{
    BoxChunkSeriesSet, ErrorChunkSeriesSet, SeriesSet,
    SharedChunkSeries, VecChunkSeries, VecChunkSeriesSet,
};
use crate::storage::{
    BoxChunkQuerier, ChunkQuerier, SelectHints, Storage,
};
use crate::tests::chunks::{compacting_chunks_merger, decode_chunk, encode_chunk};
use crate::tests::generators::DataGenerator;
use crate::tests::mem::MemStorage;
use std::sync::Arc;
use test_case::test_case;

fn labels(pairs: &[(&str, &str)]) -> Labels {
    Labels::from_pairs(pairs)
}

fn samples(points: &[(Timestamp, f64)]) -> Vec<Sample> {
    points.iter().map(|&(t, v)| Sample::new(t, v)).collect()
}

fn backend(series: &[(&[(&str, &str)], &[(Timestamp, f64)])]) -> MemStorage {
    MemStorage::with_series(
        series
            .iter()
            .map(|(ls, ss)| (labels(ls), samples(ss)))
            .collect(),
    )
}

fn fanout(primary: MemStorage, secondaries: Vec<MemStorage>) -> FanoutStorage {
    FanoutStorage::new(
        Box::new(primary),
        secondaries
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn Storage>)
            .collect(),
    )
}

fn drain(set: &mut dyn SeriesSet) -> Vec<(Labels, Vec<Sample>)> {
    let mut out = vec![];
    while set.next() {
        let series = set.at().expect("positioned set must expose a series");
        let mut it = series.iterator();
        let mut collected = vec![];
        while it.next() {
            collected.push(it.at());
        }
        out.push((series.labels().clone(), collected));
    }
    out
}

fn select_all(storage: &FanoutStorage) -> (Vec<(Labels, Vec<Sample>)>, Option<TsdbError>, Warnings)
{
    let querier = storage
        .querier(QueryContext::new(), Timestamp::MIN, Timestamp::MAX)
        .expect("open fanout querier");
    let mut set = querier.select(true, None, &[]);
    let out = drain(set.as_mut());
    (out, set.err(), set.warnings())
}

#[test]
fn disjoint_series_across_backends() {
    let storage = fanout(
        backend(&[(&[("l", "a")], &[(1, 1.0), (3, 3.0)])]),
        vec![backend(&[(&[("l", "b")], &[(2, 2.0)])])],
    );
    let (out, err, warnings) = select_all(&storage);
    assert!(err.is_none());
    assert!(warnings.is_empty());
    assert_eq!(
        out,
        vec![
            (labels(&[("l", "a")]), samples(&[(1, 1.0), (3, 3.0)])),
            (labels(&[("l", "b")]), samples(&[(2, 2.0)])),
        ]
    );
}

#[test]
fn overlapping_series_merge_into_one() {
    let storage = fanout(
        backend(&[(&[("l", "x")], &[(1, 10.0), (2, 20.0)])]),
        vec![backend(&[(&[("l", "x")], &[(2, 99.0), (3, 30.0)])])],
    );
    let (out, err, _) = select_all(&storage);
    assert!(err.is_none());
    assert_eq!(out.len(), 1);
    let (ls, ss) = &out[0];
    assert_eq!(*ls, labels(&[("l", "x")]));
    let times: Vec<Timestamp> = ss.iter().map(|s| s.timestamp).collect();
    assert_eq!(times, vec![1, 2, 3]);
    assert!(ss[1].value == 20.0 || ss[1].value == 99.0);
}

#[test]
fn primary_select_error_aborts_the_set() {
    let mut primary = backend(&[(&[("l", "a")], &[(1, 1.0)])]);
    primary.select_err = Some(TsdbError::Backend("primary down".into()));
    let storage = fanout(primary, vec![backend(&[(&[("l", "b")], &[(2, 2.0)])])]);
    let (out, err, _) = select_all(&storage);
    assert!(out.is_empty());
    assert_eq!(err, Some(TsdbError::Backend("primary down".into())));
}

#[test]
fn secondary_select_error_becomes_a_warning() {
    let mut secondary = backend(&[(&[("l", "b")], &[(2, 2.0)])]);
    secondary.select_err = Some(TsdbError::Backend("secondary down".into()));
    let storage = fanout(backend(&[(&[("l", "a")], &[(1, 1.0)])]), vec![secondary]);
    let (out, err, warnings) = select_all(&storage);
    assert!(err.is_none());
    assert_eq!(
        out,
        vec![(labels(&[("l", "a")]), samples(&[(1, 1.0)]))]
    );
    assert_eq!(warnings, vec![TsdbError::Backend("secondary down".into())]);
}

#[test]
fn all_secondaries_failing_equals_primary_only_response() {
    let failing = || {
        let mut s = backend(&[(&[("l", "b")], &[(2, 2.0)])]);
        s.select_err = Some(TsdbError::Backend("down".into()));
        s
    };
    let storage = fanout(
        backend(&[(&[("l", "a")], &[(1, 1.0)])]),
        vec![failing(), failing()],
    );
    let (out, err, warnings) = select_all(&storage);
    assert!(err.is_none());
    assert_eq!(out, vec![(labels(&[("l", "a")]), samples(&[(1, 1.0)]))]);
    assert_eq!(warnings.len(), 2);
}

#[test]
fn select_respects_matchers_and_time_range() {
    let storage = fanout(
        backend(&[
            (&[("job", "api")], &[(1, 1.0), (5, 5.0), (9, 9.0)]),
            (&[("job", "web")], &[(2, 2.0)]),
        ]),
        vec![backend(&[(&[("job", "api")], &[(4, 4.0), (20, 20.0)])])],
    );
    let querier = storage
        .querier(QueryContext::new(), 2, 10)
        .expect("open fanout querier");
    let matchers = vec![Matcher::equal("job", "api")];
    let mut set = querier.select(true, None, &matchers);
    let out = drain(set.as_mut());
    assert_eq!(
        out,
        vec![(
            labels(&[("job", "api")]),
            samples(&[(4, 4.0), (5, 5.0), (9, 9.0)])
        )]
    );
}

#[test_case(
    vec![vec!["a", "c", "e"], vec!["b", "c", "d"], vec!["a", "f"]],
    vec!["a", "b", "c", "d", "e", "f"] ; "three backends")]
#[test_case(vec![], vec![] ; "no backends")]
#[test_case(vec![vec!["x"]], vec!["x"] ; "single slice")]
#[test_case(
    vec![vec!["a", "b"], vec!["a", "b"]],
    vec!["a", "b"] ; "identical slices dedup")]
fn string_slice_merge(input: Vec<Vec<&str>>, expected: Vec<&str>) {
    let input: Vec<Vec<String>> = input
        .into_iter()
        .map(|v| v.into_iter().map(str::to_string).collect())
        .collect();
    let merged = merge_string_slices(input);
    assert_eq!(merged, expected);
}

#[test]
fn label_values_are_merged_across_backends() {
    let storage = fanout(
        backend(&[
            (&[("job", "a")], &[]),
            (&[("job", "c")], &[]),
            (&[("job", "e")], &[]),
        ]),
        vec![
            backend(&[(&[("job", "b")], &[]), (&[("job", "c")], &[])]),
            backend(&[(&[("job", "a")], &[]), (&[("job", "f")], &[])]),
        ],
    );
    let querier = storage
        .querier(QueryContext::new(), Timestamp::MIN, Timestamp::MAX)
        .expect("open fanout querier");
    let (values, warnings) = querier.label_values("job").expect("label values");
    assert_eq!(values, vec!["a", "b", "c", "e", "f"]);
    assert!(warnings.is_empty());
}

#[test]
fn label_values_error_on_primary_wraps_the_label_name() {
    let mut primary = backend(&[]);
    primary.label_err = Some(TsdbError::Backend("index broken".into()));
    let storage = fanout(primary, vec![backend(&[])]);
    let querier = storage
        .querier(QueryContext::new(), Timestamp::MIN, Timestamp::MAX)
        .expect("open fanout querier");
    match querier.label_values("job") {
        Err(TsdbError::LabelValues { name, source }) => {
            assert_eq!(name, "job");
            assert_eq!(*source, TsdbError::Backend("index broken".into()));
        }
        other => panic!("expected wrapped label values error, got {other:?}"),
    }
}

#[test]
fn label_values_error_on_secondary_is_demoted() {
    let mut secondary = backend(&[(&[("job", "b")], &[])]);
    secondary.label_err = Some(TsdbError::Backend("down".into()));
    let storage = fanout(backend(&[(&[("job", "a")], &[])]), vec![secondary]);
    let querier = storage
        .querier(QueryContext::new(), Timestamp::MIN, Timestamp::MAX)
        .expect("open fanout querier");
    let (values, warnings) = querier.label_values("job").expect("label values");
    assert_eq!(values, vec!["a"]);
    assert_eq!(warnings, vec![TsdbError::Backend("down".into())]);
}

#[test]
fn label_names_are_the_sorted_union() {
    let storage = fanout(
        backend(&[(&[("job", "a"), ("env", "prod")], &[])]),
        vec![backend(&[(&[("instance", "i1"), ("job", "b")], &[])])],
    );
    let querier = storage
        .querier(QueryContext::new(), Timestamp::MIN, Timestamp::MAX)
        .expect("open fanout querier");
    let (names, warnings) = querier.label_names().expect("label names");
    assert_eq!(names, vec!["env", "instance", "job"]);
    assert!(warnings.is_empty());
}

#[test]
fn failed_secondary_open_unwinds_every_opened_querier() {
    let primary = backend(&[]);
    let opened_secondary = backend(&[]);
    let mut failing_secondary = backend(&[]);
    failing_secondary.querier_err = Some(TsdbError::Backend("cannot open".into()));
    let storage = fanout(
        primary.clone(),
        vec![opened_secondary.clone(), failing_secondary],
    );
    let err = storage
        .querier(QueryContext::new(), Timestamp::MIN, Timestamp::MAX)
        .expect_err("open must fail");
    assert_eq!(err, TsdbError::Backend("cannot open".into()));
    assert_eq!(primary.closed_queriers(), 1);
    assert_eq!(opened_secondary.closed_queriers(), 1);
}

#[test]
fn failed_open_aggregates_close_errors() {
    let mut primary = backend(&[]);
    primary.querier_close_err = Some(TsdbError::Backend("close failed".into()));
    let mut failing_secondary = backend(&[]);
    failing_secondary.querier_err = Some(TsdbError::Backend("cannot open".into()));
    let storage = fanout(primary, vec![failing_secondary]);
    let err = storage
        .querier(QueryContext::new(), Timestamp::MIN, Timestamp::MAX)
        .expect_err("open must fail");
    match err {
        TsdbError::Multi(multi) => {
            assert_eq!(multi.len(), 2);
            assert_eq!(multi.errors()[0], TsdbError::Backend("cannot open".into()));
            assert_eq!(multi.errors()[1], TsdbError::Backend("close failed".into()));
        }
        other => panic!("expected aggregate error, got {other:?}"),
    }
}

#[test]
fn close_closes_every_backend_once_and_aggregates() {
    let mut primary = backend(&[]);
    primary.querier_close_err = Some(TsdbError::Backend("p close".into()));
    let mut secondary = backend(&[]);
    secondary.querier_close_err = Some(TsdbError::Backend("s close".into()));
    let storage = fanout(primary.clone(), vec![secondary.clone()]);
    let mut querier = storage
        .querier(QueryContext::new(), Timestamp::MIN, Timestamp::MAX)
        .expect("open fanout querier");
    match querier.close() {
        Err(TsdbError::Multi(multi)) => assert_eq!(multi.len(), 2),
        other => panic!("expected aggregate close error, got {other:?}"),
    }
    assert_eq!(primary.closed_queriers(), 1);
    assert_eq!(secondary.closed_queriers(), 1);
}

#[test]
fn noop_secondary_querier_is_skipped() {
    let mut noop = backend(&[(&[("l", "ignored")], &[(1, 1.0)])]);
    noop.noop_querier = true;
    let storage = fanout(backend(&[(&[("l", "a")], &[(1, 1.0)])]), vec![noop]);
    let (out, err, warnings) = select_all(&storage);
    assert!(err.is_none());
    assert!(warnings.is_empty());
    assert_eq!(out, vec![(labels(&[("l", "a")]), samples(&[(1, 1.0)]))]);
}

#[test]
fn start_time_is_the_minimum_across_backends() {
    let mut primary = backend(&[]);
    primary.start = 100;
    let mut s1 = backend(&[]);
    s1.start = 50;
    let mut s2 = backend(&[]);
    s2.start = 200;
    let storage = fanout(primary, vec![s1, s2]);
    assert_eq!(storage.start_time(), Ok(50));
}

#[test]
fn start_time_error_aborts() {
    let mut secondary = backend(&[]);
    secondary.start_err = Some(TsdbError::Backend("no clock".into()));
    let storage = fanout(backend(&[]), vec![secondary]);
    assert_eq!(
        storage.start_time(),
        Err(TsdbError::Backend("no clock".into()))
    );
}

#[test]
fn cancelled_context_fails_reads() {
    let storage = fanout(backend(&[(&[("l", "a")], &[(1, 1.0)])]), vec![backend(&[])]);
    let ctx = QueryContext::new();
    let querier = storage
        .querier(ctx.clone(), Timestamp::MIN, Timestamp::MAX)
        .expect("open fanout querier");
    ctx.cancel();
    let mut set = querier.select(true, None, &[]);
    assert!(!set.next());
    assert_eq!(set.err(), Some(TsdbError::Cancelled));
    assert_eq!(querier.label_values("l"), Err(TsdbError::Cancelled));
    assert_eq!(querier.label_names(), Err(TsdbError::Cancelled));
}

#[test]
fn select_hints_pass_through() {
    let hints = SelectHints::builder().start(0).end(10).step(2).build();
    let storage = fanout(backend(&[(&[("l", "a")], &[(1, 1.0)])]), vec![backend(&[])]);
    let querier = storage
        .querier(QueryContext::new(), Timestamp::MIN, Timestamp::MAX)
        .expect("open fanout querier");
    let mut set = querier.select(true, Some(&hints), &[]);
    assert_eq!(drain(set.as_mut()).len(), 1);
}

#[test]
fn merged_output_stays_ordered_with_random_backends() {
    let shared = labels(&[("job", "api")]);
    let backends: Vec<MemStorage> = (0..3)
        .map(|i| {
            let own_name = format!("own-{i}");
            let own = labels(&[("job", own_name.as_str())]);
            MemStorage::with_series(vec![
                (
                    shared.clone(),
                    DataGenerator::builder()
                        .start(i as Timestamp)
                        .samples(40)
                        .seed(i as u64)
                        .build()
                        .generate(),
                ),
                (
                    own,
                    DataGenerator::builder().samples(10).seed(100 + i as u64).build().generate(),
                ),
            ])
        })
        .collect();
    let mut backends = backends.into_iter();
    let storage = fanout(backends.next().unwrap(), backends.collect());
    let (out, err, warnings) = select_all(&storage);
    assert!(err.is_none());
    assert!(warnings.is_empty());
    // one entry per distinct label set, label-ascending
    assert_eq!(out.len(), 4);
    assert!(out.windows(2).all(|w| w[0].0 < w[1].0));
    // every merged series is strictly time-ascending with no duplicates
    for (_, ss) in &out {
        assert!(ss.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}

#[test]
fn appender_broadcasts_to_every_backend() {
    let primary = backend(&[]);
    let secondary = backend(&[]);
    let storage = fanout(primary.clone(), vec![secondary.clone()]);
    let mut appender = storage.appender();
    let series = labels(&[("l", "a")]);
    let series_ref = appender.add(&series, 1, 1.0).expect("add");
    appender
        .add_fast(series_ref, 2, 2.0)
        .expect("add_fast with the primary's reference");
    appender.commit().expect("commit");
    let expected = samples(&[(1, 1.0), (2, 2.0)]);
    assert_eq!(primary.samples(&series), Some(expected.clone()));
    assert_eq!(secondary.samples(&series), Some(expected));
}

#[test]
fn primary_add_error_aborts_before_secondaries() {
    let mut primary = backend(&[]);
    primary.add_err = Some(TsdbError::Backend("no space".into()));
    let secondary = backend(&[]);
    let storage = fanout(primary, vec![secondary.clone()]);
    let mut appender = storage.appender();
    assert_eq!(
        appender.add(&labels(&[("l", "a")]), 1, 1.0),
        Err(TsdbError::Backend("no space".into()))
    );
    appender.commit().expect("nothing pending");
    assert_eq!(secondary.series_count(), 0);
}

#[test]
fn secondary_add_error_aborts_the_add() {
    let mut secondary = backend(&[]);
    secondary.add_err = Some(TsdbError::Backend("no space".into()));
    let storage = fanout(backend(&[]), vec![secondary]);
    let mut appender = storage.appender();
    assert_eq!(
        appender.add(&labels(&[("l", "a")]), 1, 1.0),
        Err(TsdbError::Backend("no space".into()))
    );
}

#[test]
fn failed_primary_commit_rolls_back_secondaries() {
    let mut primary = backend(&[]);
    primary.commit_err = Some(TsdbError::Backend("commit failed".into()));
    let secondary = backend(&[]);
    let storage = fanout(primary, vec![secondary.clone()]);
    let mut appender = storage.appender();
    appender.add(&labels(&[("l", "a")]), 1, 1.0).expect("add");
    assert_eq!(
        appender.commit(),
        Err(TsdbError::Backend("commit failed".into()))
    );
    assert_eq!(secondary.rollback_count(), 1);
    assert_eq!(secondary.series_count(), 0);
}

#[test]
fn failed_secondary_commit_rolls_back_later_secondaries() {
    let mut failing = backend(&[]);
    failing.commit_err = Some(TsdbError::Backend("commit failed".into()));
    let later = backend(&[]);
    let storage = fanout(backend(&[]), vec![failing, later.clone()]);
    let mut appender = storage.appender();
    appender.add(&labels(&[("l", "a")]), 1, 1.0).expect("add");
    assert_eq!(
        appender.commit(),
        Err(TsdbError::Backend("commit failed".into()))
    );
    assert_eq!(later.rollback_count(), 1);
    assert_eq!(later.series_count(), 0);
}

#[test]
fn rollback_surfaces_the_primary_error_but_rolls_back_everything() {
    let mut primary = backend(&[]);
    primary.rollback_err = Some(TsdbError::Backend("rollback failed".into()));
    let secondary = backend(&[]);
    let storage = fanout(primary, vec![secondary.clone()]);
    let mut appender = storage.appender();
    appender.add(&labels(&[("l", "a")]), 1, 1.0).expect("add");
    assert_eq!(
        appender.rollback(),
        Err(TsdbError::Backend("rollback failed".into()))
    );
    assert_eq!(secondary.rollback_count(), 1);
    assert_eq!(secondary.series_count(), 0);
}

// --- chunk granularity -----------------------------------------------------

struct StaticChunkQuerier {
    series: Vec<SharedChunkSeries>,
    select_err: Option<TsdbError>,
}

impl StaticChunkQuerier {
    fn new(series: Vec<SharedChunkSeries>) -> Self {
        Self {
            series,
            select_err: None,
        }
    }

    fn failing(err: TsdbError) -> Self {
        Self {
            series: Vec::new(),
            select_err: Some(err),
        }
    }
}

impl ChunkQuerier for StaticChunkQuerier {
    fn select(
        &self,
        _sort_series: bool,
        _hints: Option<&SelectHints>,
        _matchers: &[Matcher],
    ) -> BoxChunkSeriesSet {
        if let Some(e) = &self.select_err {
            return Box::new(ErrorChunkSeriesSet::new(e.clone()));
        }
        Box::new(VecChunkSeriesSet::new(self.series.clone()))
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
}

fn chunk_series(ls: Labels, chunks: Vec<Vec<Sample>>) -> SharedChunkSeries {
    Arc::new(VecChunkSeries::new(
        ls,
        chunks.iter().map(|s| encode_chunk(s)).collect(),
    ))
}

#[test]
fn chunk_querier_merges_overlapping_chunks_across_backends() {
    let ls = labels(&[("l", "y")]);
    let primary = StaticChunkQuerier::new(vec![chunk_series(
        ls.clone(),
        vec![
            samples(&[(0, 0.0), (5, 5.0)]),
            samples(&[(10, 10.0), (15, 15.0)]),
        ],
    )]);
    let secondary = StaticChunkQuerier::new(vec![chunk_series(
        ls.clone(),
        vec![samples(&[(3, 3.0), (12, 12.0)])],
    )]);
    let querier = MergeChunkQuerier::new(
        QueryContext::new(),
        Box::new(primary),
        vec![Box::new(secondary) as BoxChunkQuerier],
        compacting_chunks_merger(),
    );
    let mut set = querier.select(true, None, &[]);
    assert!(set.next());
    let series = set.at().expect("positioned chunk set");
    assert_eq!(series.labels(), &ls);
    let mut it = series.chunk_iterator();
    let mut chunks = vec![];
    while it.next() {
        chunks.push(it.at());
    }
    assert_eq!(chunks.first().map(|c| c.min_time), Some(0));
    assert_eq!(chunks.last().map(|c| c.max_time), Some(15));
    assert!(chunks.windows(2).all(|w| w[0].max_time < w[1].min_time));
    let times: Vec<Timestamp> = chunks
        .iter()
        .flat_map(|c| decode_chunk(c))
        .map(|s| s.timestamp)
        .collect();
    assert_eq!(times, vec![0, 3, 5, 10, 12, 15]);
    assert!(!set.next());
    assert!(set.err().is_none());
}

#[test]
fn noop_chunk_secondary_is_skipped() {
    use crate::storage::NoopChunkQuerier;
    let ls = labels(&[("l", "a")]);
    let primary =
        StaticChunkQuerier::new(vec![chunk_series(ls.clone(), vec![samples(&[(1, 1.0)])])]);
    let querier = MergeChunkQuerier::new(
        QueryContext::new(),
        Box::new(primary),
        vec![Box::new(NoopChunkQuerier) as BoxChunkQuerier],
        compacting_chunks_merger(),
    );
    let mut set = querier.select(true, None, &[]);
    assert!(set.next());
    assert_eq!(set.at().expect("series").labels(), &ls);
    assert!(!set.next());
}

#[test]
fn chunk_secondary_error_is_demoted_to_a_warning() {
    let ls = labels(&[("l", "a")]);
    let primary =
        StaticChunkQuerier::new(vec![chunk_series(ls.clone(), vec![samples(&[(1, 1.0)])])]);
    let secondary = StaticChunkQuerier::failing(TsdbError::Backend("down".into()));
    let querier = MergeChunkQuerier::new(
        QueryContext::new(),
        Box::new(primary),
        vec![Box::new(secondary) as BoxChunkQuerier],
        compacting_chunks_merger(),
    );
    let mut set = querier.select(true, None, &[]);
    assert!(set.next());
    assert_eq!(set.at().expect("series").labels(), &ls);
    assert!(!set.next());
    assert!(set.err().is_none());
    assert_eq!(set.warnings(), vec![TsdbError::Backend("down".into())]);
}
