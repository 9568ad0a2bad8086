use comms::specs::{ProblemType, Row, TableColumn, TestData};
use ndarray::ArrayView2;
use serde_json::Value;

use crate::{inference::decode_tabular, preprocessing::{PreprocessorState, value::to_number}};

pub const PREDICTION: &str = "prediction";
pub const DIFFERENCE: &str = "difference";

/// Pairs every held-out row with the model's decoded prediction.
///
/// Classification adds a `prediction` column with the decoded label. Regression adds the
/// decoded `prediction` and its absolute `difference` to the actual target.
///
/// # Arguments
/// * `rows` - The original held-out rows, in test split order.
/// * `columns` - The UI table columns to extend.
/// * `outputs` - The network outputs for `rows`, one row each.
/// * `state` - The transforms fitted at training time.
/// * `problem` - The kind of target.
pub fn test_report(
    rows: &[Row],
    columns: &[TableColumn],
    outputs: ArrayView2<f32>,
    state: &PreprocessorState,
    problem: ProblemType,
) -> TestData {
    let mut columns = columns.to_vec();
    match problem {
        ProblemType::Classification => columns.push(TableColumn::new(PREDICTION, "string")),
        ProblemType::Regression => {
            columns.push(TableColumn::new(PREDICTION, "number"));
            columns.push(TableColumn::new(DIFFERENCE, "number"));
        }
    }

    let data = rows
        .iter()
        .zip(outputs.rows())
        .map(|(row, out)| {
            let prediction = decode_tabular(out, state, problem).predicted_class;
            let mut row = row.clone();

            if problem == ProblemType::Regression {
                let actual = to_number(state.target_field(), row.get(state.target_field())).ok();
                let difference = actual
                    .zip(prediction.as_f64())
                    .map(|(a, p)| Value::from((f64::from(a) - p).abs()))
                    .unwrap_or(Value::Null);
                row.insert(DIFFERENCE.to_string(), difference);
            }

            row.insert(PREDICTION.to_string(), prediction);
            row
        })
        .collect();

    TestData { data, columns }
}
