mod label;
mod matchers;

pub use label::*;
pub use matchers::*;

pub const METRIC_NAME_LABEL: &str = "__name__";
