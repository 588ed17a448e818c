pub mod common;
pub mod error;
pub mod fanout;
pub mod iterators;
pub mod labels;
pub mod series;
pub mod storage;
#[cfg(test)]
pub(crate) mod tests;

pub use common::{Chunk, QueryContext, Sample, SampleValue, Timestamp};
pub use error::{MultiError, TsdbError, TsdbResult, Warnings};
pub use fanout::{FanoutAppender, FanoutStorage, MergeChunkQuerier, MergeQuerier};
pub use labels::{Label, Labels, MatchOp, Matcher};
pub use storage::{
    Appender, BoxAppender, BoxChunkQuerier, BoxQuerier, ChunkQuerier, Querier, SelectHints,
    SeriesRef, Storage,
};
