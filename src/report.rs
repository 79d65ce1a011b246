use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::models::{ConversionRateTable, HistoricalDataset, ProjectionResult};
use crate::stages::StageList;

/// How projected volumes are rounded for display and export. The engine
/// itself always keeps exact volumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rounding {
    Exact,
    #[default]
    Ceil,
    Floor,
    Round,
}

impl Rounding {
    pub fn apply(self, volume: f64) -> f64 {
        match self {
            Rounding::Exact => volume,
            Rounding::Ceil => volume.ceil(),
            Rounding::Floor => volume.floor(),
            Rounding::Round => volume.round(),
        }
    }

    pub fn format(self, volume: f64) -> String {
        match self {
            Rounding::Exact => volume.to_string(),
            _ => format!("{:.0}", self.apply(volume)),
        }
    }
}

#[derive(Serialize)]
struct RateRow<'a> {
    #[serde(rename = "FromStage")]
    from_stage: &'a str,
    #[serde(rename = "ToStage")]
    to_stage: &'a str,
    #[serde(rename = "AverageRate")]
    average_rate: f64,
}

#[derive(Serialize)]
struct VolumeRow<'a> {
    #[serde(rename = "Stage")]
    stage: &'a str,
    #[serde(rename = "RequiredVolume")]
    required_volume: String,
}

pub fn write_rates_csv<W: Write>(writer: W, rates: &ConversionRateTable) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for rate in &rates.rates {
        writer.serialize(RateRow {
            from_stage: &rate.from_stage,
            to_stage: &rate.to_stage,
            average_rate: rate.average_rate,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_projection_csv<W: Write>(
    writer: W,
    projection: &ProjectionResult,
    rounding: Rounding,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for volume in &projection.volumes {
        writer.serialize(VolumeRow {
            stage: &volume.stage,
            required_volume: rounding.format(volume.required_volume),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Rates table, one blank line, then the projection table.
pub fn write_combined_csv<W: Write>(
    mut writer: W,
    rates: &ConversionRateTable,
    projection: &ProjectionResult,
    rounding: Rounding,
) -> Result<()> {
    write_rates_csv(&mut writer, rates)?;
    writer.write_all(b"\n")?;
    write_projection_csv(&mut writer, projection, rounding)?;
    Ok(())
}

pub fn export_combined(
    path: &Path,
    rates: &ConversionRateTable,
    projection: &ProjectionResult,
    rounding: Rounding,
) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_combined_csv(file, rates, projection, rounding)?;
    info!(path = %path.display(), "projection exported");
    Ok(())
}

pub fn export_split(
    rates_path: &Path,
    projection_path: &Path,
    rates: &ConversionRateTable,
    projection: &ProjectionResult,
    rounding: Rounding,
) -> Result<()> {
    write_rates_csv(std::fs::File::create(rates_path)?, rates)?;
    write_projection_csv(std::fs::File::create(projection_path)?, projection, rounding)?;
    info!(
        rates = %rates_path.display(),
        projection = %projection_path.display(),
        "projection exported"
    );
    Ok(())
}

pub fn format_rates(rates: &ConversionRateTable) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Conversion rates:");
    for rate in &rates.rates {
        let _ = writeln!(
            output,
            "- {} -> {}: {:.2}% ({} {})",
            rate.from_stage,
            rate.to_stage,
            rate.percent(),
            rate.sample_years,
            plural(rate.sample_years, "year", "years")
        );
    }
    output
}

pub fn format_projection(projection: &ProjectionResult, rounding: Rounding) -> String {
    let mut output = String::new();
    let hire_stage = projection
        .volumes
        .last()
        .map(|volume| volume.stage.as_str())
        .unwrap_or("hires");
    let _ = writeln!(
        output,
        "Projected pipeline for {} {}:",
        projection.target_hires, hire_stage
    );
    for volume in &projection.volumes {
        let _ = writeln!(
            output,
            "- {}: {}",
            volume.stage,
            rounding.format(volume.required_volume)
        );
    }
    output
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 {
        one
    } else {
        many
    }
}

#[derive(Serialize)]
pub struct Summary<'a> {
    pub stages: &'a [String],
    pub rounding: Rounding,
    pub rates: &'a ConversionRateTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<&'a ProjectionResult>,
}

pub fn build_report(
    stages: &StageList,
    dataset: &HistoricalDataset,
    rates: &ConversionRateTable,
    projection: &ProjectionResult,
    rounding: Rounding,
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Recruitment Pipeline Projection");
    let _ = writeln!(
        output,
        "Generated {} for a target of {} {}",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        projection.target_hires,
        stages.last()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Stages");
    let _ = writeln!(output, "{stages}");

    let _ = writeln!(output);
    let _ = writeln!(output, "## Historical Funnel");
    let _ = writeln!(output, "| Year | {} |", stages.names().join(" | "));
    let _ = writeln!(output, "|---{}|", "|---".repeat(stages.len()));
    for record in dataset.records() {
        let cells: Vec<String> = record
            .counts
            .iter()
            .map(|count| count.map_or_else(|| "-".to_string(), |count| count.to_string()))
            .collect();
        let _ = writeln!(output, "| {} | {} |", record.year, cells.join(" | "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Conversion Rates");
    for rate in &rates.rates {
        let _ = writeln!(
            output,
            "- {} -> {}: {:.2}% across {} {}",
            rate.from_stage,
            rate.to_stage,
            rate.percent(),
            rate.sample_years,
            plural(rate.sample_years, "year", "years")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Projected Pipeline");
    for volume in &projection.volumes {
        let _ = writeln!(
            output,
            "- {}: {}",
            volume.stage,
            rounding.format(volume.required_volume)
        );
    }

    output
}
