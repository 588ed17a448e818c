pub mod context;
mod types;

pub use context::QueryContext;
pub use types::*;
