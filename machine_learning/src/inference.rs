//! Predictions of trained models, decoded back to the label or value space of the data.

use comms::specs::{Prediction, ProblemType, Row};
use ndarray::ArrayView1;
use serde_json::Value;

use crate::{
    MlErr, Result,
    arch::Network,
    image::{self, FeatureExtractor, PredictionType},
    preprocessing::PreprocessorState,
    tensor,
};

/// A model that finished training (or was loaded) and can serve predictions.
#[derive(Debug, Clone)]
pub enum TrainedModel {
    /// A network trained on tabular rows, with the transforms fitted on them.
    Tabular {
        network: Network,
        state: PreprocessorState,
        problem: ProblemType,
    },
    /// A classifier head on top of the shared feature extractor.
    Classifier { network: Network, labels: Vec<String> },
    /// A pretrained digit recognizer.
    Digit { network: Network },
}

impl TrainedModel {
    pub fn network(&self) -> &Network {
        match self {
            TrainedModel::Tabular { network, .. }
            | TrainedModel::Classifier { network, .. }
            | TrainedModel::Digit { network } => network,
        }
    }

    /// A short name of the kind of model, for logs and errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TrainedModel::Tabular { .. } => "tabular",
            TrainedModel::Classifier { .. } => "classifier",
            TrainedModel::Digit { .. } => "digit",
        }
    }

    /// Predicts one tabular row with the transforms fitted at training time.
    ///
    /// # Arguments
    /// * `row` - The raw input row, the target column is ignored if present.
    ///
    /// # Returns
    /// The decoded prediction or a configuration error if the model is not tabular.
    pub fn predict_row(&self, row: &Row) -> Result<Prediction> {
        let TrainedModel::Tabular {
            network,
            state,
            problem,
        } = self
        else {
            return Err(MlErr::invalid(format!(
                "a {} model does not take tabular input",
                self.kind_name()
            )));
        };

        let x = state.features(&[row])?;
        let out = network.predict(x.view())?;
        Ok(decode_tabular(out.row(0), state, *problem))
    }

    /// Predicts one encoded image.
    ///
    /// # Arguments
    /// * `payload` - The base64 (or data url) image.
    /// * `kind` - The pipeline the request asked for, it must match the model.
    /// * `extractor` - The shared extractor, needed by classifier models.
    pub fn predict_image(
        &self,
        payload: &str,
        kind: PredictionType,
        extractor: Option<&dyn FeatureExtractor>,
    ) -> Result<Prediction> {
        match (self, kind) {
            (TrainedModel::Digit { network }, PredictionType::Mnist) => {
                let x = image::embed(payload, kind, None)?;
                let out = network.predict(x.view())?;
                Ok(classify(out.row(0), Value::from, None))
            }
            (TrainedModel::Classifier { network, labels }, PredictionType::Classifier) => {
                let x = image::embed(payload, kind, extractor)?;
                let out = network.predict(x.view())?;
                let label = |i: usize| labels.get(i).map(|l| Value::from(l.as_str())).unwrap_or(Value::Null);
                let all = labels.iter().map(|l| Value::from(l.as_str())).collect();
                Ok(classify(out.row(0), label, Some(all)))
            }
            _ => Err(MlErr::invalid(format!(
                "a {} model cannot serve {kind:?} image predictions",
                self.kind_name()
            ))),
        }
    }
}

/// Decodes one output row of a tabular network.
///
/// Classes decode through the target encoder, values through the target scaler.
pub fn decode_tabular(out: ArrayView1<f32>, state: &PreprocessorState, problem: ProblemType) -> Prediction {
    match problem {
        ProblemType::Classification => {
            let labels = state.class_labels();
            let all = (!labels.is_empty()).then(|| labels.to_vec());
            classify(out, |i| state.decode_class(i), all)
        }
        ProblemType::Regression => {
            let y = out.first().copied().unwrap_or_default();
            Prediction {
                predicted_class: number(state.decode_value(y)),
                confidence: y,
                probabilities: vec![y],
                labels: None,
            }
        }
    }
}

/// Picks a class from a sigmoid (one unit) or softmax output.
///
/// A single unit is thresholded at 0.5 and expanded into `[1 - p, p]`; the confidence is
/// the probability of the chosen class.
fn classify<F>(out: ArrayView1<f32>, label: F, labels: Option<Vec<Value>>) -> Prediction
where
    F: Fn(usize) -> Value,
{
    let probabilities = match out.len() {
        1 => vec![1. - out[0], out[0]],
        _ => out.to_vec(),
    };

    let class = if out.len() == 1 {
        usize::from(out[0] > 0.5)
    } else {
        tensor::argmax_rows(out.insert_axis(ndarray::Axis(0)))
            .first()
            .copied()
            .unwrap_or_default()
    };

    Prediction {
        predicted_class: label(class),
        confidence: probabilities.get(class).copied().unwrap_or_default(),
        probabilities,
        labels,
    }
}

fn number(v: f32) -> Value {
    Value::from(f64::from(v))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::{
        arch::{Sequential, activations::ActFn, layers::Dense},
        image::PooledExtractor,
    };

    #[test]
    fn single_unit_is_thresholded() {
        let labels = vec![Value::from("no"), Value::from("yes")];
        let pick = |p: f32| classify(array![p].view(), |i| labels[i].clone(), None);

        let yes = pick(0.8);
        assert_eq!(yes.predicted_class, "yes");
        assert!((yes.confidence - 0.8).abs() < 1e-6);
        assert_eq!(yes.probabilities.len(), 2);

        let no = pick(0.3);
        assert_eq!(no.predicted_class, "no");
        assert!((no.confidence - 0.7).abs() < 1e-6);

        assert_eq!(pick(0.5).predicted_class, "no");
    }

    #[test]
    fn softmax_output_picks_argmax() {
        let pred = classify(array![0.1, 0.7, 0.2].view(), Value::from, None);
        assert_eq!(pred.predicted_class, 1);
        assert!((pred.confidence - 0.7).abs() < 1e-6);
        assert_eq!(pred.probabilities, vec![0.1, 0.7, 0.2]);
    }

    #[test]
    fn models_reject_the_wrong_input() {
        let network = Network::new(
            Sequential::new([Dense::new((784, 10), ActFn::Softmax)]),
            vec![0.; 785 * 10],
        )
        .unwrap();
        let digit = TrainedModel::Digit { network };

        let err = digit.predict_row(&Row::new()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);

        let extractor = PooledExtractor::new(0).unwrap();
        let err = digit
            .predict_image("", PredictionType::Classifier, Some(&extractor))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn digit_prediction_is_an_index() {
        let mut params = vec![0.; 785 * 10];
        // bias of class 3
        params[784 * 10 + 3] = 5.;
        let network = Network::new(Sequential::new([Dense::new((784, 10), ActFn::Softmax)]), params).unwrap();
        let digit = TrainedModel::Digit { network };

        let png = crate::image::tests_support::solid_png([255, 255, 255], 28);
        let pred = digit.predict_image(&png, PredictionType::Mnist, None).unwrap();

        assert_eq!(pred.predicted_class, 3);
        assert!(pred.confidence > 0.9);
        assert_eq!(pred.probabilities.len(), 10);
    }
}
