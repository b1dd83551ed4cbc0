/// Source adapters: one per raw dataset. Each turns its raw records into
/// `NormalizedRecord`s keyed by `CountyMonthKey`, declaring the fields it
/// feeds through a `SourceSchema`.
pub mod dashboard;
pub mod maize;
pub mod rainfall;
pub mod soil;
pub mod weather;

use crate::model::{NormalizedRecord, SourceId, SourceSchema};
use crate::reconcile::RecoveryEvent;

/// What an adapter hands to the join: its records plus every local recovery
/// it performed on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutput {
    pub source: SourceId,
    pub records: Vec<NormalizedRecord>,
    pub recoveries: Vec<RecoveryEvent>,
}

impl AdapterOutput {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            records: Vec::new(),
            recoveries: Vec::new(),
        }
    }

    pub fn schema(&self) -> SourceSchema {
        SourceSchema::for_source(self.source)
    }
}
