use serde::{Deserialize, Serialize};

/// Whether the network predicts a category or a continuous value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    Classification,
    Regression,
}

/// The specification for an activation function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationSpec {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

/// The specification for kernel weight initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitializerSpec {
    #[default]
    GlorotUniform,
    GlorotNormal,
    HeUniform,
    HeNormal,
    #[serde(alias = "lecunUniform")]
    LeCunUniform,
    #[serde(alias = "lecunNormal")]
    LeCunNormal,
    RandomUniform,
    RandomNormal,
    Zeros,
    Ones,
}

/// The specification for kernel regularization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegularizationSpec {
    #[serde(alias = "L1")]
    L1,
    #[serde(alias = "L2")]
    L2,
    #[serde(alias = "L1L2", alias = "l1_l2")]
    L1l2,
}

/// The metrics to track, the UI sends either a single name or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metrics {
    One(String),
    Many(Vec<String>),
}

impl Default for Metrics {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Metrics {
    /// Returns whether accuracy was requested.
    pub fn wants_accuracy(&self) -> bool {
        let is_acc = |m: &str| matches!(m, "accuracy" | "acc");
        match self {
            Metrics::One(m) => is_acc(m),
            Metrics::Many(ms) => ms.iter().any(|m| is_acc(m)),
        }
    }
}

/// Optimizer, loss and metrics of a network.
///
/// Names are kept as strings here and resolved by the model builder, so an unknown
/// name becomes a configuration error of the request instead of a protocol error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    pub optimizer: String,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_function: Option<String>,
    #[serde(default)]
    pub metrics: Metrics,
}

fn default_learning_rate() -> f32 {
    0.001
}

/// Declarative shape of a feed-forward network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub neurons_per_layer: Vec<usize>,
    pub problem_type: ProblemType,
    #[serde(default)]
    pub activation_function: Option<ActivationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regularization: Option<RegularizationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regularization_rate: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_initializer: Option<InitializerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_options: Option<CompileOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_size: Option<usize>,
    /// Output width appended after `neurons_per_layer` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_layer_size: Option<usize>,
}

impl ModelConfig {
    /// Creates a config with library defaults for everything but the shape.
    pub fn new(neurons_per_layer: Vec<usize>, problem_type: ProblemType) -> Self {
        Self {
            neurons_per_layer,
            problem_type,
            activation_function: None,
            regularization: None,
            regularization_rate: None,
            kernel_initializer: None,
            compile_options: None,
            input_size: None,
            last_layer_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_config_from_ui_payload() {
        let cfg: ModelConfig = serde_json::from_value(serde_json::json!({
            "neuronsPerLayer": [8, 4],
            "problemType": "classification",
            "activationFunction": "relu",
            "regularization": "l1l2",
            "regularizationRate": 0.01,
            "kernelInitializer": "heNormal",
            "compileOptions": {
                "optimizer": "adam",
                "learningRate": 0.01,
                "lossFunction": "categoricalCrossentropy",
                "metrics": "accuracy"
            },
            "inputSize": 3,
            "lastLayerSize": 3
        }))
        .unwrap();

        assert_eq!(cfg.activation_function, Some(ActivationSpec::Relu));
        assert_eq!(cfg.regularization, Some(RegularizationSpec::L1l2));
        assert_eq!(cfg.kernel_initializer, Some(InitializerSpec::HeNormal));
        assert!(cfg.compile_options.unwrap().metrics.wants_accuracy());
        assert_eq!(cfg.last_layer_size, Some(3));
    }

    #[test]
    fn metrics_list_without_accuracy() {
        let metrics = Metrics::Many(vec!["mse".into()]);
        assert!(!metrics.wants_accuracy());
        assert!(Metrics::One("acc".into()).wants_accuracy());
    }
}
