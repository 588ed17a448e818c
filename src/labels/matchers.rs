use crate::error::{TsdbError, TsdbResult};
use crate::labels::Labels;
use regex::Regex;
use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MatchOp {
    Equal,
    NotEqual,
    RegexEqual,
    RegexNotEqual,
}

impl MatchOp {
    pub fn is_regex(&self) -> bool {
        matches!(self, MatchOp::RegexEqual | MatchOp::RegexNotEqual)
    }
}

impl Display for MatchOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            MatchOp::Equal => write!(f, "="),
            MatchOp::NotEqual => write!(f, "!="),
            MatchOp::RegexEqual => write!(f, "=~"),
            MatchOp::RegexNotEqual => write!(f, "!~"),
        }
    }
}

/// A single label predicate. Matcher evaluation against a full index is the
/// backends' concern; the fan-out only carries matchers through `select` and
/// offers [`Matcher::matches`] for in-memory implementations.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub op: MatchOp,
    pub name: String,
    pub value: String,
    regex: Option<Regex>,
}

impl Matcher {
    pub fn equal<S: Into<String>>(name: S, value: S) -> Self {
        Matcher {
            op: MatchOp::Equal,
            name: name.into(),
            value: value.into(),
            regex: None,
        }
    }

    pub fn not_equal<S: Into<String>>(name: S, value: S) -> Self {
        Matcher {
            op: MatchOp::NotEqual,
            name: name.into(),
            value: value.into(),
            regex: None,
        }
    }

    pub fn regex_equal<S: Into<String>>(name: S, pattern: S) -> TsdbResult<Self> {
        let pattern = pattern.into();
        let regex = compile_anchored(&pattern)?;
        Ok(Matcher {
            op: MatchOp::RegexEqual,
            name: name.into(),
            value: pattern,
            regex: Some(regex),
        })
    }

    pub fn regex_not_equal<S: Into<String>>(name: S, pattern: S) -> TsdbResult<Self> {
        let pattern = pattern.into();
        let regex = compile_anchored(&pattern)?;
        Ok(Matcher {
            op: MatchOp::RegexNotEqual,
            name: name.into(),
            value: pattern,
            regex: Some(regex),
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        match self.op {
            MatchOp::Equal => self.value == value,
            MatchOp::NotEqual => self.value != value,
            MatchOp::RegexEqual => self.regex.as_ref().is_some_and(|re| re.is_match(value)),
            MatchOp::RegexNotEqual => !self.regex.as_ref().is_some_and(|re| re.is_match(value)),
        }
    }

    /// Whether a whole label set satisfies this matcher. A missing label is
    /// matched as the empty string.
    pub fn matches_labels(&self, labels: &Labels) -> bool {
        self.matches(labels.get(&self.name).unwrap_or(""))
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.name == other.name && self.value == other.value
    }
}

impl Eq for Matcher {}

impl Display for Matcher {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{name}{op}{value}",
            name = self.name,
            op = self.op,
            value = enquote::enquote('"', &self.value)
        )
    }
}

// Selector regexes are anchored: the pattern must consume the whole value.
fn compile_anchored(pattern: &str) -> TsdbResult<Regex> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| TsdbError::InvalidMatcher(format!("/{pattern}/: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("up", "up", true ; "equal hit")]
    #[test_case("up", "down", false ; "equal miss")]
    fn equal_matcher(value: &str, probe: &str, expected: bool) {
        assert_eq!(Matcher::equal("job", value).matches(probe), expected);
    }

    #[test_case("api|web", "api", true ; "alternation hit")]
    #[test_case("api|web", "apiserver", false ; "anchored")]
    #[test_case("a.*", "abc", true ; "wildcard")]
    fn regex_matcher(pattern: &str, probe: &str, expected: bool) {
        let m = Matcher::regex_equal("job", pattern).unwrap();
        assert_eq!(m.matches(probe), expected);
    }

    #[test]
    fn invalid_regex_is_rejected() {
        assert!(matches!(
            Matcher::regex_equal("job", "a["),
            Err(TsdbError::InvalidMatcher(_))
        ));
    }

    #[test]
    fn missing_label_matches_as_empty() {
        let labels = Labels::from_pairs(&[("job", "api")]);
        assert!(Matcher::equal("instance", "").matches_labels(&labels));
        assert!(Matcher::not_equal("job", "").matches_labels(&labels));
    }
}
