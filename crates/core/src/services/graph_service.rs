use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::currency::{Currency, RateSource};
use crate::models::entry::Entry;
use crate::models::query::{GraphQuery, GraphSlice, Graphables};

use super::currency_service::CurrencyService;

/// Turns the entry list into grouped, currency-converted, sorted totals.
///
/// Pure computation: no I/O. The exchange rate must already be resolved.
pub struct GraphService {
    currency_service: CurrencyService,
}

impl GraphService {
    pub fn new() -> Self {
        Self {
            currency_service: CurrencyService::new(),
        }
    }

    /// Entries holding every include pair and none of the exclude pairs.
    pub fn matching_entries<'a>(&self, entries: &'a [Entry], query: &GraphQuery) -> Vec<&'a Entry> {
        entries
            .iter()
            .filter(|e| query.includes.iter().all(|f| e.contains_pair(&f.tag, &f.value)))
            .filter(|e| !query.excludes.iter().any(|f| e.contains_pair(&f.tag, &f.value)))
            .collect()
    }

    /// Filter, group, convert into `target`, then sort by total (largest first).
    ///
    /// Groups with equal totals keep the order in which they were first seen.
    pub fn find_graphables(
        &self,
        entries: &[Entry],
        query: &GraphQuery,
        target: &Currency,
        rates: &dyn RateSource,
    ) -> Result<Graphables, CoreError> {
        let matching = self.matching_entries(entries, query);
        if matching.is_empty() {
            return Ok(Graphables::NoMatch);
        }

        let axis = query.axis_tag();
        let mut slices: Vec<GraphSlice> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for entry in matching {
            let label = match axis {
                Some(tag) => entry.value_for_tag(tag),
                None => entry.ticker(),
            };
            let value = self
                .currency_service
                .convert(entry.value(), entry.currency(), target, rates)?;

            match positions.get(label) {
                Some(&idx) => slices[idx].total += value,
                None => {
                    positions.insert(label, slices.len());
                    slices.push(GraphSlice {
                        label: label.to_string(),
                        total: value,
                    });
                }
            }
        }

        // sort_by is stable, so ties stay in first-seen order
        slices.sort_by(|a, b| b.total.total_cmp(&a.total));

        Ok(Graphables::Groups {
            currency: target.clone(),
            slices,
        })
    }
}

impl Default for GraphService {
    fn default() -> Self {
        Self::new()
    }
}
