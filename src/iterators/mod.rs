mod chained_chunk_iter;
mod chained_sample_iter;
mod chunk_iter;
mod sample_iter;

pub use chained_chunk_iter::*;
pub use chained_sample_iter::*;
pub use chunk_iter::*;
pub use sample_iter::*;
