use std::{fs::File, path::Path};

use polars::prelude::*;

use crate::{
    error::{DqnError, Result},
    state::State,
};

pub const NAME_COLUMN: &str = "Name";
pub const FEATURE_COLUMNS: [&str; 3] = ["module_score", "improvement_rate", "moving_avg"];

/// One recorded learning event.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerRow {
    pub name: String,
    pub state: State,
}

impl LearnerRow {
    pub fn new(name: impl Into<String>, state: State) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    /// Raw score used for reward shaping.
    pub fn score(&self) -> f32 {
        self.state.module_score
    }
}

/// Reads the processed gameplay CSV, in file order.
pub fn load_learner_rows(path: &Path) -> Result<Vec<LearnerRow>> {
    if !path.exists() {
        return Err(DqnError::MissingData(path.to_path_buf()));
    }
    let df = CsvReader::new(File::open(path)?).finish()?;
    learner_rows_from_frame(df)
}

pub fn learner_rows_from_frame(df: DataFrame) -> Result<Vec<LearnerRow>> {
    let present: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    for required in std::iter::once(NAME_COLUMN).chain(FEATURE_COLUMNS) {
        if !present.iter().any(|c| c == required) {
            return Err(DqnError::MissingColumn(required.to_string()));
        }
    }

    // Integer scores and NaN/null cells all become plain f64.
    let mut columns = vec![col(NAME_COLUMN).cast(DataType::String)];
    for name in FEATURE_COLUMNS {
        columns.push(
            col(name)
                .cast(DataType::Float64)
                .fill_nan(lit(0.0))
                .fill_null(lit(0.0)),
        );
    }
    let df = df.lazy().select(columns).collect()?;

    let names = df.column(NAME_COLUMN)?.str()?;
    let scores = float_column(&df, FEATURE_COLUMNS[0])?;
    let improvement = float_column(&df, FEATURE_COLUMNS[1])?;
    let moving_avg = float_column(&df, FEATURE_COLUMNS[2])?;

    let rows = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            LearnerRow::new(
                name.unwrap_or_default(),
                State::new(scores[i], improvement[i], moving_avg[i]),
            )
        })
        .collect::<Vec<_>>();

    log::debug!("parsed {} learner rows", rows.len());
    Ok(rows)
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f32>> {
    Ok(df
        .column(name)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0) as f32)
        .collect())
}
