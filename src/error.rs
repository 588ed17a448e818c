use thiserror::Error;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
/// Enum for the various errors surfaced by the fan-out and merge core.
pub enum TsdbError {
    #[error("{0}")]
    General(String),

    #[error("Backend error. {0}")]
    Backend(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Invalid label matcher. {0}")]
    InvalidMatcher(String),

    #[error("Unknown series reference {0}")]
    UnknownSeriesRef(u64),

    #[error("Error querying label values for {name}: {source}")]
    LabelValues {
        name: String,
        #[source]
        source: Box<TsdbError>,
    },

    #[error("Error querying label names: {0}")]
    LabelNames(#[source] Box<TsdbError>),

    #[error(transparent)]
    Multi(MultiError),
}

pub type TsdbResult<T = ()> = Result<T, TsdbError>;

/// Non-fatal diagnostics accompanying an otherwise successful response.
pub type Warnings = Vec<TsdbError>;

impl From<&str> for TsdbError {
    fn from(s: &str) -> Self {
        TsdbError::General(s.to_string())
    }
}

impl From<String> for TsdbError {
    fn from(s: String) -> Self {
        TsdbError::General(s)
    }
}

/// Aggregate error preserving its constituents, used for close/unwind fan-in.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MultiError {
    errors: Vec<TsdbError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: TsdbError) {
        self.errors.push(err);
    }

    /// Record the error of `res`, if any.
    pub fn add<T>(&mut self, res: TsdbResult<T>) {
        if let Err(e) = res {
            self.errors.push(e);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[TsdbError] {
        &self.errors
    }

    /// Nil-elision: `Ok(())` when no errors were recorded, the sole error when
    /// there is exactly one, the aggregate otherwise.
    pub fn err(mut self) -> TsdbResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.swap_remove(0)),
            _ => Err(TsdbError::Multi(self)),
        }
    }

    /// Like [`MultiError::err`] but for paths that already know at least one
    /// error was recorded.
    pub(crate) fn into_err(mut self) -> TsdbError {
        if self.errors.len() == 1 {
            return self.errors.swap_remove(0);
        }
        TsdbError::Multi(self)
    }
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} errors: ", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl FromIterator<TsdbError> for MultiError {
    fn from_iter<I: IntoIterator<Item = TsdbError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}
