//! Broadening a query until it has enough hits.

use log::info;

use crate::error::Result;
use crate::query::{SelectMode, SelectOptions, Searcher};
use crate::records::{Operator, RecordUnit, Records};

/// Modes tried in turn, narrowest first.
const STAGES: [SelectMode; 3] = [SelectMode::Exact, SelectMode::Unsplit, SelectMode::Partial];

impl Searcher<'_> {
    /// Evaluate `query` as a phrase, then, while the result has at most
    /// `threshold` hits, OR in the hits of broader matching modes.
    ///
    /// Returns `None` when no mode matched anything.
    pub fn sel(&self, query: &str, threshold: usize) -> Result<Option<Records>> {
        let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0)?;
        self.sel_into(query, threshold, &mut records)?;
        Ok(if records.is_empty() { None } else { Some(records) })
    }

    pub(crate) fn sel_into(&self, query: &str, threshold: usize, records: &mut Records) -> Result<()> {
        for (stage, mode) in STAGES.into_iter().enumerate() {
            if stage > 0 && records.nhits() > threshold {
                break;
            }
            self.select(query, records, Operator::Or, &SelectOptions::new(mode))?;
            info!("sel {mode:?}: {} hits ({query})", records.nhits());
        }
        Ok(())
    }
}
