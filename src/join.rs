/// Join engine: full outer join of every adapter's records on `CountyMonthKey`.
///
/// The result carries one row per key of the study window (plus any key a
/// source reported outside it), and every row carries every field: present
/// with its provenance, or an explicit missing marker.
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument, warn};

use crate::adapters::AdapterOutput;
use crate::error::PipelineError;
use crate::model::{CountyMonthKey, Field, FieldValue, MissingReason, StudyWindow};

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub key: CountyMonthKey,
    pub fields: BTreeMap<Field, FieldValue>,
}

impl JoinedRecord {
    fn empty(key: CountyMonthKey) -> Self {
        Self {
            key,
            fields: Field::ALL
                .iter()
                .map(|f| (*f, FieldValue::Missing(MissingReason::NotReported)))
                .collect(),
        }
    }

    pub fn get(&self, field: Field) -> FieldValue {
        self.fields
            .get(&field)
            .copied()
            .unwrap_or(FieldValue::Missing(MissingReason::NotReported))
    }

    pub fn value(&self, field: Field) -> Option<f64> {
        self.get(field).value()
    }
}

/// Joined rows in key order.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTable {
    pub window: StudyWindow,
    pub records: Vec<JoinedRecord>,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &CountyMonthKey) -> Option<&JoinedRecord> {
        self.records
            .binary_search_by(|r| r.key.cmp(key))
            .ok()
            .map(|i| &self.records[i])
    }
}

/// Merge adapter outputs into one row per key.
///
/// Fails with `DuplicateKey` when a source reports the same field for the same
/// key twice; adapters never do this on well-formed input.
#[instrument(skip_all, fields(start_year = window.start_year, years = window.years))]
pub fn join(window: &StudyWindow, outputs: &[AdapterOutput]) -> Result<JoinedTable, PipelineError> {
    let mut rows: BTreeMap<CountyMonthKey, JoinedRecord> = window
        .keys()
        .into_iter()
        .map(|key| (key, JoinedRecord::empty(key)))
        .collect();
    let mut seen: BTreeSet<(CountyMonthKey, Field)> = BTreeSet::new();

    for output in outputs {
        let schema = output.schema();
        for record in &output.records {
            let row = rows.entry(record.key).or_insert_with(|| {
                warn!(key = %record.key, source = %output.source, "Key outside the study window");
                JoinedRecord::empty(record.key)
            });
            for (field, value) in &record.fields {
                if !schema.declares(*field) {
                    warn!(source = %output.source, field = %field, "Undeclared field ignored");
                    continue;
                }
                if !seen.insert((record.key, *field)) {
                    return Err(PipelineError::DuplicateKey {
                        source_id: output.source,
                        key: record.key,
                        field: *field,
                    });
                }
                row.fields.insert(*field, *value);
            }
        }
    }

    let records: Vec<JoinedRecord> = rows.into_values().collect();
    info!(rows = records.len(), "Joined all sources");
    Ok(JoinedTable {
        window: *window,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counties::County;
    use crate::model::{
        NormalizedRecord, Provenance, ProvenanceTag, ReconciliationRule, SourceId, YearMonth,
    };

    fn measured(source: SourceId) -> Provenance {
        Provenance::new(source, ProvenanceTag::Measured, ReconciliationRule::Direct)
    }

    #[test]
    fn test_every_window_key_present_once() {
        let window = StudyWindow::default();
        let table = join(&window, &[]).unwrap();
        assert_eq!(table.len(), 1200);
        assert!(table.records.windows(2).all(|w| w[0].key < w[1].key));
        assert!(table.records[0].fields.values().all(FieldValue::is_missing));
    }

    #[test]
    fn test_fields_merge_with_provenance() {
        let window = StudyWindow::new(2019, 1);
        let key = CountyMonthKey::new(County::Narok, YearMonth::new(2019, 6).unwrap());
        let mut weather = AdapterOutput::new(SourceId::Weather);
        weather.records.push(
            NormalizedRecord::new(key, SourceId::Weather)
                .with(Field::Temperature, FieldValue::present(21.0, measured(SourceId::Weather))),
        );
        let mut rainfall = AdapterOutput::new(SourceId::Rainfall);
        rainfall.records.push(
            NormalizedRecord::new(key, SourceId::Rainfall)
                .with(Field::Rainfall, FieldValue::present(48.0, measured(SourceId::Rainfall))),
        );

        let table = join(&window, &[weather, rainfall]).unwrap();
        let row = table.get(&key).unwrap();
        assert_eq!(row.value(Field::Temperature), Some(21.0));
        assert_eq!(row.value(Field::Rainfall), Some(48.0));
        assert_eq!(
            row.get(Field::SoilPh),
            FieldValue::Missing(MissingReason::NotReported)
        );
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let window = StudyWindow::new(2019, 1);
        let key = CountyMonthKey::new(County::Narok, YearMonth::new(2019, 6).unwrap());
        let mut weather = AdapterOutput::new(SourceId::Weather);
        for value in [20.0, 22.0] {
            weather.records.push(
                NormalizedRecord::new(key, SourceId::Weather)
                    .with(Field::Temperature, FieldValue::present(value, measured(SourceId::Weather))),
            );
        }

        let err = join(&window, &[weather]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DuplicateKey { field: Field::Temperature, .. }
        ));
    }

    #[test]
    fn test_undeclared_field_is_ignored() {
        let window = StudyWindow::new(2019, 1);
        let key = CountyMonthKey::new(County::Narok, YearMonth::new(2019, 6).unwrap());
        let mut soil = AdapterOutput::new(SourceId::Soil);
        soil.records.push(
            NormalizedRecord::new(key, SourceId::Soil)
                .with(Field::Rainfall, FieldValue::present(999.0, measured(SourceId::Soil))),
        );

        let table = join(&window, &[soil]).unwrap();
        assert!(table.get(&key).unwrap().get(Field::Rainfall).is_missing());
    }
}
