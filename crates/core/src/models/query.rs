use serde::{Deserialize, Serialize};

use super::currency::Currency;

/// A single `tag = value` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagFilter {
    pub tag: String,
    pub value: String,
}

impl TagFilter {
    pub fn new(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
        }
    }
}

/// An aggregation request.
///
/// - `axis`: tag to group by; `None` (or an empty name) groups by ticker.
/// - `includes`: every pair must be held by an entry for it to count.
/// - `excludes`: an entry holding any one of these pairs is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQuery {
    pub axis: Option<String>,
    pub includes: Vec<TagFilter>,
    pub excludes: Vec<TagFilter>,
}

impl GraphQuery {
    /// Group by ticker, no filters.
    pub fn by_ticker() -> Self {
        Self::default()
    }

    pub fn by_tag(axis: impl Into<String>) -> Self {
        Self {
            axis: Some(axis.into()),
            ..Self::default()
        }
    }

    pub fn include(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.includes.push(TagFilter::new(tag, value));
        self
    }

    pub fn exclude(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.excludes.push(TagFilter::new(tag, value));
        self
    }

    /// The grouping tag, treating an empty name as unset.
    pub fn axis_tag(&self) -> Option<&str> {
        self.axis.as_deref().filter(|a| !a.is_empty())
    }
}

/// One group of the result: its label and the summed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSlice {
    pub label: String,
    pub total: f64,
}

/// Outcome of an aggregation query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Graphables {
    /// No entry survived the filters.
    NoMatch,
    /// Groups sorted by total, largest first. Totals may legitimately be zero.
    Groups {
        currency: Currency,
        slices: Vec<GraphSlice>,
    },
}

impl Graphables {
    pub fn is_no_match(&self) -> bool {
        matches!(self, Graphables::NoMatch)
    }

    /// Slices in display order; empty for `NoMatch`.
    pub fn slices(&self) -> &[GraphSlice] {
        match self {
            Graphables::NoMatch => &[],
            Graphables::Groups { slices, .. } => slices,
        }
    }

    /// Total for a label, if that group exists.
    pub fn total_for(&self, label: &str) -> Option<f64> {
        self.slices().iter().find(|s| s.label == label).map(|s| s.total)
    }

    /// Sum across all groups.
    pub fn grand_total(&self) -> f64 {
        self.slices().iter().map(|s| s.total).sum()
    }
}
