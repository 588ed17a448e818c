use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

pub type Timestamp = i64;
pub type SampleValue = f64;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: SampleValue,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: SampleValue) -> Self {
        Sample { timestamp, value }
    }
}

impl PartialEq for Sample {
    #[inline]
    fn eq(&self, other: &Sample) -> bool {
        // Two samples are equal if their times are equal, and their values are
        // either equal or are both NaN.
        if self.timestamp == other.timestamp {
            return if self.value.is_nan() {
                other.value.is_nan()
            } else {
                self.value == other.value
            };
        }
        false
    }
}

impl Eq for Sample {}

impl Ord for Sample {
    fn cmp(&self, other: &Self) -> Ordering {
        let cmp = self.timestamp.cmp(&other.timestamp);
        if cmp == Ordering::Equal {
            if self.value.is_nan() {
                if other.value.is_nan() {
                    Ordering::Equal
                } else {
                    Ordering::Greater
                }
            } else if other.value.is_nan() {
                Ordering::Less
            } else {
                self.value.total_cmp(&other.value)
            }
        } else {
            cmp
        }
    }
}

impl PartialOrd for Sample {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Sample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.timestamp.hash(state);
        self.value.to_bits().hash(state);
    }
}

impl Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.value, self.timestamp)
    }
}

/// An encoded run of samples covering the closed interval
/// `[min_time, max_time]`. The payload is opaque to the merge engine; only a
/// pluggable overlap merger ever looks inside it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(min_time: Timestamp, max_time: Timestamp, data: Vec<u8>) -> Self {
        debug_assert!(min_time <= max_time);
        Chunk {
            min_time,
            max_time,
            data,
        }
    }

    /// Two chunks overlap iff their time intervals intersect.
    pub fn overlaps(&self, other: &Chunk) -> bool {
        self.min_time <= other.max_time && other.min_time <= self.max_time
    }
}

impl Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "chunk[{}..{}] ({} bytes)",
            self.min_time,
            self.max_time,
            self.data.len()
        )
    }
}
