use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{
    ConversionRate, ConversionRateTable, HistoricalDataset, ProjectionResult, StageVolume,
};
use crate::stages::StageList;

/// Averages the per-year conversion rate for every consecutive stage pair.
///
/// A year contributes `to / from` for a pair only when both counts are present
/// and `from > 0`. The pair's rate is the unweighted mean of those per-year
/// ratios, not the ratio of the summed counts. A pair with no contributing
/// year fails with [`PipelineError::NoHistoricalData`].
pub fn compute_conversion_rates(
    dataset: &HistoricalDataset,
    stages: &StageList,
) -> Result<ConversionRateTable> {
    let mut rates = Vec::with_capacity(stages.len() - 1);

    for (from, to) in stages.transitions() {
        let from_index = column_index(dataset, from)?;
        let to_index = column_index(dataset, to)?;

        let mut total = 0.0;
        let mut sample_years = 0usize;

        for record in dataset.records() {
            match (record.counts[from_index], record.counts[to_index]) {
                (Some(from_count), Some(to_count)) if from_count > 0 => {
                    total += to_count as f64 / from_count as f64;
                    sample_years += 1;
                }
                (Some(0), _) => {
                    debug!(year = record.year, from, to, "skipping year with zero denominator");
                }
                _ => {
                    debug!(year = record.year, from, to, "skipping year with absent count");
                }
            }
        }

        if sample_years == 0 {
            return Err(PipelineError::NoHistoricalData {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        rates.push(ConversionRate {
            from_stage: from.to_string(),
            to_stage: to.to_string(),
            average_rate: total / sample_years as f64,
            sample_years,
        });
    }

    Ok(ConversionRateTable { rates })
}

fn column_index(dataset: &HistoricalDataset, stage: &str) -> Result<usize> {
    dataset.stage_index(stage).ok_or_else(|| {
        PipelineError::data_format(format!("historical data has no column for stage '{stage}'"))
    })
}

/// Propagates `target_hires` backward from the last stage to the first.
///
/// Each earlier stage needs `volume(next) / rate(stage -> next)`. Volumes are
/// left unrounded. A zero rate fails with
/// [`PipelineError::ZeroConversionRate`] and a quotient too large for `f64`
/// with [`PipelineError::VolumeOverflow`]; no volume is ever infinite.
pub fn project_pipeline(
    target_hires: f64,
    stages: &StageList,
    rates: &ConversionRateTable,
) -> Result<ProjectionResult> {
    validate_target(target_hires)?;

    let mut volumes = vec![0.0; stages.len()];
    volumes[stages.len() - 1] = target_hires;

    let names = stages.names();
    for index in (0..names.len() - 1).rev() {
        let (from, to) = (names[index].as_str(), names[index + 1].as_str());
        let rate = rates.get(from, to).ok_or_else(|| {
            PipelineError::configuration(format!(
                "no conversion rate computed for {from} -> {to}"
            ))
        })?;

        if rate.average_rate <= 0.0 {
            return Err(PipelineError::ZeroConversionRate {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let volume = volumes[index + 1] / rate.average_rate;
        if !volume.is_finite() {
            return Err(PipelineError::VolumeOverflow {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        volumes[index] = volume;
    }

    Ok(ProjectionResult {
        target_hires,
        volumes: names
            .iter()
            .zip(volumes)
            .map(|(stage, required_volume)| StageVolume {
                stage: stage.clone(),
                required_volume,
            })
            .collect(),
    })
}

pub fn validate_target(target_hires: f64) -> Result<()> {
    if !target_hires.is_finite() || target_hires <= 0.0 {
        return Err(PipelineError::configuration(format!(
            "target hires must be a positive number, got {target_hires}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoricalRecord;

    const EPSILON: f64 = 1e-9;

    fn stages() -> StageList {
        StageList::new(["Applications", "Offers", "Hires"]).unwrap()
    }

    fn dataset(rows: &[(i32, [Option<u64>; 3])]) -> HistoricalDataset {
        let records = rows
            .iter()
            .map(|(year, counts)| HistoricalRecord {
                year: *year,
                counts: counts.to_vec(),
            })
            .collect();
        HistoricalDataset::new(stages(), records)
    }

    fn rate(table: &ConversionRateTable, from: &str, to: &str) -> f64 {
        table.get(from, to).unwrap().average_rate
    }

    #[test]
    fn single_year_rates_and_projection() {
        let data = dataset(&[(2023, [Some(100), Some(20), Some(5)])]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();

        assert!((rate(&rates, "Applications", "Offers") - 0.2).abs() < EPSILON);
        assert!((rate(&rates, "Offers", "Hires") - 0.25).abs() < EPSILON);

        let projection = project_pipeline(10.0, &stages(), &rates).unwrap();
        assert!((projection.volume("Hires").unwrap() - 10.0).abs() < EPSILON);
        assert!((projection.volume("Offers").unwrap() - 40.0).abs() < EPSILON);
        assert!((projection.volume("Applications").unwrap() - 200.0).abs() < EPSILON);
    }

    #[test]
    fn averages_ratios_not_sums() {
        // mean of 0.1 and 0.5; summed counts would give 51/110
        let data = dataset(&[
            (2022, [Some(10), Some(1), Some(1)]),
            (2023, [Some(100), Some(50), Some(10)]),
        ]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();
        let applications = rates.get("Applications", "Offers").unwrap();

        assert!((applications.average_rate - 0.3).abs() < EPSILON);
        assert_eq!(applications.sample_years, 2);
    }

    #[test]
    fn zero_denominator_years_are_excluded() {
        let data = dataset(&[
            (2022, [Some(0), Some(0), Some(0)]),
            (2023, [Some(100), Some(20), Some(5)]),
        ]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();
        let applications = rates.get("Applications", "Offers").unwrap();

        assert!((applications.average_rate - 0.2).abs() < EPSILON);
        assert_eq!(applications.sample_years, 1);
    }

    #[test]
    fn absent_counts_are_excluded_per_pair() {
        let data = dataset(&[
            (2022, [Some(50), None, Some(5)]),
            (2023, [Some(100), Some(20), Some(5)]),
        ]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();

        assert_eq!(rates.get("Applications", "Offers").unwrap().sample_years, 1);
        assert_eq!(rates.get("Offers", "Hires").unwrap().sample_years, 1);
    }

    #[test]
    fn pair_without_usable_years_is_an_error() {
        let data = dataset(&[
            (2022, [Some(100), Some(0), Some(0)]),
            (2023, [Some(80), Some(0), None]),
        ]);
        let err = compute_conversion_rates(&data, &stages()).unwrap_err();

        match err {
            PipelineError::NoHistoricalData { from, to } => {
                assert_eq!(from, "Offers");
                assert_eq!(to, "Hires");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rates_are_not_clamped_above_one() {
        let data = dataset(&[(2023, [Some(10), Some(15), Some(15)])]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();
        assert!((rate(&rates, "Applications", "Offers") - 1.5).abs() < EPSILON);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let data = dataset(&[
            (2021, [Some(120), Some(30), Some(6)]),
            (2022, [Some(90), Some(18), Some(3)]),
        ]);
        let first = compute_conversion_rates(&data, &stages()).unwrap();
        let second = compute_conversion_rates(&data, &stages()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn stage_missing_from_dataset_is_a_format_error() {
        let data = dataset(&[(2023, [Some(100), Some(20), Some(5)])]);
        let other = StageList::new(["Applications", "Interviews"]).unwrap();
        assert!(matches!(
            compute_conversion_rates(&data, &other),
            Err(PipelineError::DataFormat(_))
        ));
    }

    #[test]
    fn unit_rates_keep_target_at_every_stage() {
        let data = dataset(&[(2023, [Some(7), Some(7), Some(7)])]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();
        let projection = project_pipeline(12.0, &stages(), &rates).unwrap();

        for volume in &projection.volumes {
            assert!((volume.required_volume - 12.0).abs() < EPSILON);
        }
    }

    #[test]
    fn volumes_do_not_decrease_toward_first_stage() {
        let data = dataset(&[
            (2021, [Some(300), Some(45), Some(9)]),
            (2022, [Some(250), Some(50), Some(12)]),
        ]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();
        let projection = project_pipeline(4.0, &stages(), &rates).unwrap();

        let volumes: Vec<f64> = projection
            .volumes
            .iter()
            .map(|volume| volume.required_volume)
            .collect();
        assert!(volumes.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn zero_rate_blocks_projection() {
        let table = ConversionRateTable {
            rates: vec![
                ConversionRate {
                    from_stage: "Applications".into(),
                    to_stage: "Offers".into(),
                    average_rate: 0.0,
                    sample_years: 1,
                },
                ConversionRate {
                    from_stage: "Offers".into(),
                    to_stage: "Hires".into(),
                    average_rate: 0.5,
                    sample_years: 1,
                },
            ],
        };
        let err = project_pipeline(10.0, &stages(), &table).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Conversion rate for Applications -> Offers is zero; required volume is unbounded"
        );
    }

    #[test]
    fn overflowing_volume_is_an_error() {
        let data = dataset(&[(2023, [Some(10_000_000_000), Some(1), Some(1)])]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();

        match project_pipeline(1e300, &stages(), &rates).unwrap_err() {
            PipelineError::VolumeOverflow { from, to } => {
                assert_eq!(from, "Applications");
                assert_eq!(to, "Offers");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn projection_keeps_fractional_volumes() {
        let data = dataset(&[(2023, [Some(30), Some(9), Some(4)])]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();
        let projection = project_pipeline(1.0, &stages(), &rates).unwrap();

        assert!((projection.volume("Offers").unwrap() - 2.25).abs() < EPSILON);
        assert!((projection.volume("Applications").unwrap() - 7.5).abs() < EPSILON);
    }

    #[test]
    fn rejects_non_positive_targets() {
        let data = dataset(&[(2023, [Some(100), Some(20), Some(5)])]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();

        for target in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                project_pipeline(target, &stages(), &rates),
                Err(PipelineError::Configuration(_))
            ));
        }
    }

    #[test]
    fn rates_from_other_stages_cannot_project() {
        let data = dataset(&[(2023, [Some(100), Some(20), Some(5)])]);
        let rates = compute_conversion_rates(&data, &stages()).unwrap();
        let longer = StageList::new(["Applications", "Offers", "Hires", "Retained"]).unwrap();

        assert!(matches!(
            project_pipeline(10.0, &longer, &rates),
            Err(PipelineError::Configuration(_))
        ));
    }
}
