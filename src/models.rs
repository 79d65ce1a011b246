use serde::Serialize;

use crate::stages::StageList;

/// One year of funnel counts, aligned with the stage list of its dataset.
/// `None` marks a stage whose count was left blank for that year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalRecord {
    pub year: i32,
    pub counts: Vec<Option<u64>>,
}

/// Validated history, sorted by year, with one count slot per stage.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalDataset {
    stages: StageList,
    records: Vec<HistoricalRecord>,
}

impl HistoricalDataset {
    pub fn new(stages: StageList, mut records: Vec<HistoricalRecord>) -> Self {
        records.sort_by_key(|record| record.year);
        Self { stages, records }
    }

    pub fn stages(&self) -> &StageList {
        &self.stages
    }

    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn year_span(&self) -> Option<(i32, i32)> {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => Some((first.year, last.year)),
            _ => None,
        }
    }

    pub fn stage_index(&self, stage: &str) -> Option<usize> {
        self.stages.names().iter().position(|name| name == stage)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRate {
    pub from_stage: String,
    pub to_stage: String,
    pub average_rate: f64,
    pub sample_years: usize,
}

impl ConversionRate {
    pub fn percent(&self) -> f64 {
        self.average_rate * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRateTable {
    pub rates: Vec<ConversionRate>,
}

impl ConversionRateTable {
    pub fn get(&self, from: &str, to: &str) -> Option<&ConversionRate> {
        self.rates
            .iter()
            .find(|rate| rate.from_stage == from && rate.to_stage == to)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageVolume {
    pub stage: String,
    pub required_volume: f64,
}

/// Required volume per stage, earliest stage first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionResult {
    pub target_hires: f64,
    pub volumes: Vec<StageVolume>,
}

impl ProjectionResult {
    pub fn volume(&self, stage: &str) -> Option<f64> {
        self.volumes
            .iter()
            .find(|volume| volume.stage == stage)
            .map(|volume| volume.required_volume)
    }
}
