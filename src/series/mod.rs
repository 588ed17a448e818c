mod merge;
mod types;

pub use merge::*;
pub use types::*;
