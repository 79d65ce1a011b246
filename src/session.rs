use std::fmt;
use std::io::Read;

use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::conversion;
use crate::error::{PipelineError, Result};
use crate::ingest;
use crate::models::{ConversionRateTable, HistoricalDataset, ProjectionResult};
use crate::stages::StageList;

pub const DEFAULT_TARGET_HIRES: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    StagesSet,
    DataLoaded,
    RatesComputed,
    Projected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::StagesSet => "stages set",
            SessionState::DataLoaded => "data loaded",
            SessionState::RatesComputed => "rates computed",
            SessionState::Projected => "projected",
        };
        f.write_str(label)
    }
}

/// Counters bumped by every state-changing operation. Derived artifacts
/// remember the counters they were built from and are stale once any of
/// those moves on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Versions {
    stages: u64,
    data: u64,
    target: u64,
}

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    versions: Versions,
}

/// One user's working set: stages, history, target, and the rates and
/// projection derived from them.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    versions: Versions,
    stages: Option<StageList>,
    dataset: Option<Cached<HistoricalDataset>>,
    rates: Option<Cached<ConversionRateTable>>,
    projection: Option<Cached<ProjectionResult>>,
    target_hires: f64,
}

impl Session {
    pub fn new(stages: StageList) -> Self {
        let mut session = Self::unconfigured();
        session.set_stages(stages);
        session
    }

    pub fn unconfigured() -> Self {
        Self {
            id: Uuid::new_v4(),
            versions: Versions::default(),
            stages: None,
            dataset: None,
            rates: None,
            projection: None,
            target_hires: DEFAULT_TARGET_HIRES,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        if self.stages.is_none() {
            SessionState::Unconfigured
        } else if self.dataset().is_none() {
            SessionState::StagesSet
        } else if self.rates().is_none() {
            SessionState::DataLoaded
        } else if self.projection().is_none() {
            SessionState::RatesComputed
        } else {
            SessionState::Projected
        }
    }

    pub fn stages(&self) -> Option<&StageList> {
        self.stages.as_ref()
    }

    pub fn target_hires(&self) -> f64 {
        self.target_hires
    }

    pub fn dataset(&self) -> Option<&HistoricalDataset> {
        self.dataset
            .as_ref()
            .filter(|cached| cached.versions.stages == self.versions.stages)
            .map(|cached| &cached.value)
    }

    pub fn rates(&self) -> Option<&ConversionRateTable> {
        self.rates
            .as_ref()
            .filter(|cached| {
                cached.versions.stages == self.versions.stages
                    && cached.versions.data == self.versions.data
            })
            .map(|cached| &cached.value)
    }

    pub fn projection(&self) -> Option<&ProjectionResult> {
        self.projection
            .as_ref()
            .filter(|cached| cached.versions == self.versions)
            .map(|cached| &cached.value)
    }

    /// Replaces the stage list. Loaded history, rates, and projection all
    /// become stale; the session falls back to `StagesSet`. Setting an
    /// identical list changes nothing.
    pub fn set_stages(&mut self, stages: StageList) {
        if self.stages.as_ref() == Some(&stages) {
            return;
        }
        let _span = info_span!("session", id = %self.id).entered();
        info!(stages = %stages, "stages set");
        self.stages = Some(stages);
        self.versions.stages += 1;
    }

    /// Accepts history validated against the current stage list. Rates and
    /// projection become stale; the session moves to `DataLoaded`.
    pub fn load_data(&mut self, dataset: HistoricalDataset) -> Result<()> {
        let _span = info_span!("session", id = %self.id).entered();
        let stages = self.require_stages()?;
        if dataset.stages() != stages {
            warn!("historical data was validated against different stages");
            return Err(PipelineError::configuration(format!(
                "historical data covers stages [{}] but the session uses [{}]",
                dataset.stages(),
                stages
            )));
        }

        self.versions.data += 1;
        info!(rows = dataset.len(), "historical data accepted");
        self.dataset = Some(Cached {
            value: dataset,
            versions: self.versions,
        });
        Ok(())
    }

    /// Parses and validates a CSV table against the current stages, then
    /// loads it.
    pub fn load_csv<R: Read>(&mut self, source: R) -> Result<()> {
        let dataset = ingest::load_csv(source, self.require_stages()?)?;
        self.load_data(dataset)
    }

    pub fn compute_rates(&mut self) -> Result<&ConversionRateTable> {
        let _span = info_span!("session", id = %self.id).entered();
        let stages = self.require_stages()?;
        let dataset = self
            .dataset()
            .ok_or_else(|| PipelineError::configuration("no historical data loaded"))?;

        let table = conversion::compute_conversion_rates(dataset, stages)?;
        info!(pairs = table.len(), "conversion rates computed");
        Ok(&self
            .rates
            .insert(Cached {
                value: table,
                versions: self.versions,
            })
            .value)
    }

    /// Sets the hire target. Only the projection becomes stale.
    pub fn set_target(&mut self, target_hires: f64) -> Result<()> {
        conversion::validate_target(target_hires)?;
        if target_hires != self.target_hires {
            self.target_hires = target_hires;
            self.versions.target += 1;
        }
        Ok(())
    }

    /// Projects the pipeline from the cached rates. Fails with a
    /// configuration error when rates were never computed or were made stale
    /// by a later `set_stages`/`load_data`; it never recomputes them.
    pub fn project(&mut self) -> Result<&ProjectionResult> {
        let _span = info_span!("session", id = %self.id).entered();
        let stages = self.require_stages()?;
        let rates = self.rates().ok_or_else(|| {
            PipelineError::configuration(
                "conversion rates are not computed for the current stages and data",
            )
        })?;

        let projection = conversion::project_pipeline(self.target_hires, stages, rates)?;
        info!(
            target_hires = self.target_hires,
            first_stage = %stages.first(),
            required = projection.volumes.first().map(|v| v.required_volume),
            "pipeline projected"
        );
        Ok(&self
            .projection
            .insert(Cached {
                value: projection,
                versions: self.versions,
            })
            .value)
    }

    fn require_stages(&self) -> Result<&StageList> {
        self.stages
            .as_ref()
            .ok_or_else(|| PipelineError::configuration("no stages configured"))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(StageList::default())
    }
}
