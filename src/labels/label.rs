use crate::labels::METRIC_NAME_LABEL;
use enquote::enquote;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Display;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new<S: Into<String>>(name: S, value: S) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        let cmp = self.name.cmp(&other.name);
        if cmp != Ordering::Equal {
            cmp
        } else {
            self.value.cmp(&other.value)
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{name}={value}", name = self.name, value = self.value)
    }
}

/// An ordered label set. Canonical form is lexicographic by label name; the
/// set is the join key for merging series across backends.
///
/// Equality is pairwise, and the total order is lexicographic pair-by-pair,
/// so sets sort the way their rendered selectors do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Labels(Vec<Label>);

impl Labels {
    pub fn new(mut labels: Vec<Label>) -> Self {
        labels.sort();
        labels.dedup();
        Labels(labels)
    }

    pub fn empty() -> Self {
        Labels(Vec::new())
    }

    pub fn from_pairs<S: Into<String> + Copy>(pairs: &[(S, S)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(name, value)| Label::new((*name).into(), (*value).into()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The value of the label `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.0
    }
}

impl PartialOrd for Labels {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Labels {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<Vec<Label>> for Labels {
    fn from(labels: Vec<Label>) -> Self {
        Labels::new(labels)
    }
}

impl FromIterator<Label> for Labels {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        Labels::new(iter.into_iter().collect())
    }
}

impl Display for Labels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.get(METRIC_NAME_LABEL).unwrap_or("");
        write!(f, "{name}{{")?;
        let mut first = true;
        for label in self.iter() {
            if label.name == METRIC_NAME_LABEL {
                continue;
            }
            if !first {
                write!(f, ",")?;
            }
            first = false;
            // avoid allocation if possible
            if label.value.contains('"') {
                write!(f, "{}={}", label.name, enquote('"', &label.value))?;
            } else {
                write!(f, "{}=\"{}\"", label.name, label.value)?;
            }
        }
        write!(f, "}}")
    }
}
