//! Wide factor matrix construction and namespaced persistence.

use crate::engine::factor_engine::SettlementDayResult;
use crate::error::{Result, SurgeError};
use crate::surge::aggregator::FactorObservation;
use chrono::{NaiveDate, NaiveTime};
use polars::prelude::*;
use std::path::PathBuf;

/// Which namespace a factor is saved under, inferred from its name the
/// same way the legacy saver script classified factors by substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorNamespace {
    Eod,
    M10SameTime,
    M10Rolling,
}

pub fn classify_namespace(factor_name: &str) -> FactorNamespace {
    if factor_name.contains("_eod_") {
        FactorNamespace::Eod
    } else if factor_name.contains("sametime") {
        FactorNamespace::M10SameTime
    } else if factor_name.contains("rolling") {
        FactorNamespace::M10Rolling
    } else {
        log::warn!("factor {factor_name} doesn't match a known namespace token, defaulting to m10_sametime");
        FactorNamespace::M10SameTime
    }
}

/// A date x symbol (or date x bar_time x symbol, flattened to rows) wide
/// matrix for one factor, built by hand from the long-form observations
/// rather than through a columnar pivot operator.
pub struct FactorMatrix {
    pub factor_name: String,
    pub row_labels: Vec<String>,
    pub columns: Vec<String>,
    pub frame: DataFrame,
}

fn row_label(date: NaiveDate, bar_time: Option<NaiveTime>) -> String {
    match bar_time {
        Some(t) => format!("{} {}", date.format("%Y-%m-%d"), t.format("%H:%M:%S")),
        None => date.format("%Y-%m-%d").to_string(),
    }
}

/// Pivots long-form observations for one factor into date/bar_time x
/// symbol wide form. Logs (never fails) when a day produces a row count
/// other than the expected 24 (M10) or 1 (EOD/M1/M5 daily aggregate).
pub fn build_matrix(factor_name: &str, observations: &[FactorObservation], expected_rows_per_day: usize) -> Result<FactorMatrix> {
    let mut symbols: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    let mut by_row: std::collections::BTreeMap<(NaiveDate, Option<NaiveTime>), std::collections::HashMap<String, f64>> =
        std::collections::BTreeMap::new();

    for obs in observations {
        symbols.insert(obs.symbol.to_string());
        by_row
            .entry((obs.date, obs.bar_time))
            .or_default()
            .insert(obs.symbol.to_string(), obs.value);
    }

    let mut rows_per_day: std::collections::HashMap<NaiveDate, usize> = std::collections::HashMap::new();
    for (date, _) in by_row.keys() {
        *rows_per_day.entry(*date).or_insert(0) += 1;
    }
    for (date, count) in &rows_per_day {
        if *count != expected_rows_per_day {
            log::warn!(
                "factor {factor_name} produced {count} rows for {date}, expected {expected_rows_per_day}"
            );
        }
    }

    let columns: Vec<String> = symbols.into_iter().collect();
    let row_labels: Vec<String> = by_row.keys().map(|(d, t)| row_label(*d, *t)).collect();

    let mut series = vec![Series::new("row_label", row_labels.clone())];
    for col in &columns {
        let values: Vec<Option<f64>> = by_row
            .values()
            .map(|row| row.get(col).copied())
            .collect();
        series.push(Series::new(col, values));
    }
    let frame = DataFrame::new(series).map_err(SurgeError::from)?;

    Ok(FactorMatrix {
        factor_name: factor_name.to_string(),
        row_labels,
        columns,
        frame,
    })
}

/// Builds one [`FactorMatrix`] per factor name across every settlement
/// day's result, concatenating observations before pivoting.
pub fn build_matrices(
    results: &[SettlementDayResult],
    expected_rows_per_day: impl Fn(&str) -> usize,
) -> Result<Vec<FactorMatrix>> {
    let mut by_factor: std::collections::HashMap<String, Vec<FactorObservation>> =
        std::collections::HashMap::new();
    for result in results {
        for (name, obs) in &result.observations {
            by_factor.entry(name.clone()).or_default().extend(obs.iter().cloned());
        }
    }
    by_factor
        .into_iter()
        .map(|(name, obs)| {
            let expected = expected_rows_per_day(&name);
            build_matrix(&name, &obs, expected)
        })
        .collect()
}

/// Where a [`FactorMatrix`] gets written, namespaced by [`FactorNamespace`].
pub trait FactorStore: Send + Sync {
    fn save(&self, namespace: FactorNamespace, matrix: &FactorMatrix) -> Result<()>;
}

/// Reference [`FactorStore`] writing `<root>/<namespace>/<factor_name>.parquet`.
pub struct ParquetFactorStore {
    root: PathBuf,
}

impl ParquetFactorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_dir(&self, namespace: FactorNamespace) -> &'static str {
        match namespace {
            FactorNamespace::Eod => "eod",
            FactorNamespace::M10SameTime => "m10_sametime",
            FactorNamespace::M10Rolling => "m10_rolling",
        }
    }

    fn path_for(&self, namespace: FactorNamespace, factor_name: &str) -> PathBuf {
        self.root
            .join(self.namespace_dir(namespace))
            .join(format!("{factor_name}.parquet"))
    }
}

impl FactorStore for ParquetFactorStore {
    fn save(&self, namespace: FactorNamespace, matrix: &FactorMatrix) -> Result<()> {
        let path = self.path_for(namespace, &matrix.factor_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut frame = matrix.frame.clone();
        let file = std::fs::File::create(&path)?;
        ParquetWriter::new(file)
            .finish(&mut frame)
            .map_err(SurgeError::from)?;
        Ok(())
    }
}
