use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{HistoricalDataset, HistoricalRecord};
use crate::stages::StageList;

pub const YEAR_COLUMN: &str = "Year";

pub fn load_csv_path(path: &Path, stages: &StageList) -> Result<HistoricalDataset> {
    let file = std::fs::File::open(path)?;
    debug!(path = %path.display(), "reading historical data");
    load_csv(file, stages)
}

/// Reads a `Year,<stage>...` table and validates it against `stages`.
///
/// Columns not named by `stages` are ignored. A blank stage cell means the
/// count is absent for that year; a blank or non-integer year, a non-numeric
/// or negative count, a repeated year, or an empty table is rejected.
pub fn load_csv<R: Read>(source: R, stages: &StageList) -> Result<HistoricalDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source);
    let headers = reader.headers()?.clone();

    let column = |name: &str| headers.iter().position(|header| header == name);
    let year_index = column(YEAR_COLUMN);
    let stage_indices: Vec<Option<usize>> = stages
        .names()
        .iter()
        .map(|stage| column(stage.as_str()))
        .collect();

    let mut missing = Vec::new();
    if year_index.is_none() {
        missing.push(YEAR_COLUMN);
    }
    for (stage, index) in stages.names().iter().zip(&stage_indices) {
        if index.is_none() {
            missing.push(stage.as_str());
        }
    }
    let year_index = match year_index {
        Some(index) if missing.is_empty() => index,
        _ => {
            warn!(missing = ?missing, "historical data is missing required columns");
            return Err(PipelineError::data_format(format!(
                "missing columns: {}",
                missing.join(", ")
            )));
        }
    };
    let stage_indices: Vec<usize> = stage_indices.into_iter().flatten().collect();

    let mut records = Vec::new();
    let mut seen_years = HashSet::new();

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        // header is line 1
        let line = row + 2;
        if record.len() != headers.len() {
            warn!(line, fields = record.len(), "row width does not match header");
            return Err(PipelineError::data_format(format!(
                "line {line} has {} fields, expected {}",
                record.len(),
                headers.len()
            )));
        }

        let year = parse_year(&record[year_index], line)?;
        if !seen_years.insert(year) {
            warn!(year, line, "duplicate year in historical data");
            return Err(PipelineError::data_format(format!(
                "duplicate {YEAR_COLUMN} {year} on line {line}"
            )));
        }

        let counts = stages
            .names()
            .iter()
            .zip(&stage_indices)
            .map(|(stage, &index)| parse_count(&record[index], stage, line))
            .collect::<Result<Vec<_>>>()?;

        records.push(HistoricalRecord { year, counts });
    }

    if records.is_empty() {
        return Err(PipelineError::data_format("historical data has no rows"));
    }

    let dataset = HistoricalDataset::new(stages.clone(), records);
    if let Some((first, last)) = dataset.year_span() {
        info!(rows = dataset.len(), first, last, "historical data loaded");
    }
    Ok(dataset)
}

fn parse_year(cell: &str, line: usize) -> Result<i32> {
    if cell.is_empty() {
        return Err(PipelineError::data_format(format!(
            "{YEAR_COLUMN} is blank on line {line}"
        )));
    }
    cell.parse::<i32>().map_err(|_| {
        PipelineError::data_format(format!(
            "{YEAR_COLUMN} '{cell}' on line {line} is not an integer"
        ))
    })
}

fn parse_count(cell: &str, stage: &str, line: usize) -> Result<Option<u64>> {
    if cell.is_empty() {
        return Ok(None);
    }
    if let Ok(count) = cell.parse::<u64>() {
        return Ok(Some(count));
    }
    let reason = match cell.parse::<f64>() {
        Ok(value) if value < 0.0 => "is negative",
        Ok(_) => "is not a whole number",
        Err(_) => "is not numeric",
    };
    Err(PipelineError::data_format(format!(
        "column '{stage}' value '{cell}' on line {line} {reason}"
    )))
}

/// Writes the header row a historical data file must carry.
pub fn write_template<W: Write>(writer: W, stages: &StageList) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    let header = std::iter::once(YEAR_COLUMN).chain(stages.names().iter().map(String::as_str));
    writer.write_record(header)?;
    writer.flush()?;
    Ok(())
}
