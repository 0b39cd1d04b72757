use std::collections::BTreeSet;
use std::fmt;

use crate::error::GridVectorError;
use crate::timeindex::TimeIndex;

/// One structured problem found in a vector. Rendered into the composite
/// validation failure; never raised on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorIssue {
    LengthMismatch {
        vector_id: String,
        index: String,
        index_periods: usize,
        values_len: usize,
    },
    NegativeValues {
        vector_id: String,
        count: usize,
    },
    NanValues {
        vector_id: String,
        count: usize,
    },
    NotWholeYears {
        vector_id: String,
        index: String,
    },
}

impl fmt::Display for VectorIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorIssue::LengthMismatch {
                vector_id,
                index,
                index_periods,
                values_len,
            } => write!(
                f,
                "{vector_id} - {index} with {index_periods} periods and vector with size ({values_len}) do not match"
            ),
            VectorIssue::NegativeValues { vector_id, count } => {
                write!(f, "{vector_id} contains {count} negative values")
            }
            VectorIssue::NanValues { vector_id, count } => {
                write!(f, "{vector_id} contains {count} nan values")
            }
            VectorIssue::NotWholeYears { vector_id, index } => write!(
                f,
                "{vector_id} is required to contain whole years but its index ({index}) is not classified as is_whole_years"
            ),
        }
    }
}

/// Accumulates validation problems across all vectors of one file and turns
/// them into at most one composite error.
#[derive(Debug, Default)]
pub struct ValidationReport {
    problems: BTreeSet<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, issues: BTreeSet<String>) {
        self.problems.extend(issues);
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Convert the accumulated problems into a single error listing every
    /// distinct violation, or `Ok(())` when nothing was found.
    pub fn finish(self, loader: &str) -> Result<(), GridVectorError> {
        if self.problems.is_empty() {
            return Ok(());
        }
        let mut rendered = String::new();
        for problem in &self.problems {
            rendered.push_str("\n - ");
            rendered.push_str(problem);
            rendered.push('.');
        }
        Err(GridVectorError::Validation {
            loader: loader.to_string(),
            problems: rendered,
        })
    }
}

/// Check one vector against its index. Accumulates every problem found,
/// never short-circuiting on the first.
pub fn validate_vector(
    vector_id: &str,
    index: &TimeIndex,
    values: &[f64],
    require_whole_years: bool,
) -> BTreeSet<String> {
    let mut issues = BTreeSet::new();

    // A list index may legitimately describe len or len - 1 periods.
    let periods = index.num_periods();
    let accepted = [values.len().saturating_sub(1), values.len()];
    if !accepted.contains(&periods) {
        issues.insert(
            VectorIssue::LengthMismatch {
                vector_id: vector_id.to_string(),
                index: index.to_string(),
                index_periods: periods,
                values_len: values.len(),
            }
            .to_string(),
        );
    }

    let negatives = values.iter().filter(|value| **value < 0.0).count();
    if negatives > 0 {
        issues.insert(
            VectorIssue::NegativeValues {
                vector_id: vector_id.to_string(),
                count: negatives,
            }
            .to_string(),
        );
    }

    let nans = values.iter().filter(|value| value.is_nan()).count();
    if nans > 0 {
        issues.insert(
            VectorIssue::NanValues {
                vector_id: vector_id.to_string(),
                count: nans,
            }
            .to_string(),
        );
    }

    if require_whole_years && !index.is_whole_years() {
        issues.insert(
            VectorIssue::NotWholeYears {
                vector_id: vector_id.to_string(),
                index: index.to_string(),
            }
            .to_string(),
        );
    }

    issues
}
