use comms::specs::{ActivationSpec, CompileOptions, Metrics, ModelConfig, ProblemType};
use log::debug;
use ndarray::{Array2, ArrayView2};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    MlErr, Result,
    arch::{
        Network, Sequential,
        activations::ActFn,
        init,
        layers::Dense,
        loss::{BinaryCrossEntropy, CategoricalCrossEntropy, LossFn, Mae, Mse},
        metrics::EpochStats,
        regularizer::Regularizer,
    },
    optimization::{self, BoxedOptimizer},
};

/// A boxed loss function that can move into a training thread.
pub type BoxedLoss = Box<dyn LossFn + Send + Sync>;

/// Resolves the widths of every layer of the network, output layer included.
///
/// `lastLayerSize` is appended unless `neuronsPerLayer` already ends with it. The
/// caller's config is left untouched.
///
/// # Arguments
/// * `config` - The declarative network shape.
/// * `input_width` - The amount of feature columns.
///
/// # Returns
/// The ordered layer widths or a configuration error.
pub fn resolve_layers(config: &ModelConfig, input_width: usize) -> Result<Vec<usize>> {
    if let Some(declared) = config.input_size
        && declared != input_width
    {
        return Err(MlErr::invalid(format!(
            "inputSize is {declared} but the data has {input_width} feature columns"
        )));
    }

    let mut widths = config.neurons_per_layer.clone();
    if let Some(last) = config.last_layer_size
        && widths.last() != Some(&last)
    {
        widths.push(last);
    }

    if widths.is_empty() {
        return Err(MlErr::invalid("the network has no layers"));
    }
    if widths.contains(&0) {
        return Err(MlErr::invalid("every layer needs at least one neuron"));
    }

    Ok(widths)
}

/// Checks the output width against the target.
fn check_output(problem: ProblemType, classes: Option<usize>, output: usize) -> Result<()> {
    match (problem, classes) {
        (ProblemType::Classification, Some(classes)) => {
            if output == classes || (classes == 2 && output == 1) {
                Ok(())
            } else {
                Err(MlErr::OutputMismatch { classes, output })
            }
        }
        (ProblemType::Regression, _) if output != 1 => {
            Err(MlErr::OutputMismatch { classes: 1, output })
        }
        _ => Ok(()),
    }
}

fn output_act_fn(problem: ProblemType, output: usize) -> ActFn {
    match problem {
        ProblemType::Classification if output == 1 => ActFn::Sigmoid,
        ProblemType::Classification => ActFn::Softmax,
        ProblemType::Regression => ActFn::Linear,
    }
}

fn default_loss(problem: ProblemType, output: usize) -> &'static str {
    match problem {
        ProblemType::Regression => "meanSquaredError",
        ProblemType::Classification if output <= 2 => "binaryCrossentropy",
        ProblemType::Classification => "categoricalCrossentropy",
    }
}

/// Resolves a loss function by its camelCase or snake_case name.
pub fn loss_by_name(name: &str) -> Result<BoxedLoss> {
    let loss: BoxedLoss = match name {
        "meanSquaredError" | "mean_squared_error" | "mse" => Box::new(Mse),
        "meanAbsoluteError" | "mean_absolute_error" | "mae" => Box::new(Mae),
        "binaryCrossentropy" | "binary_crossentropy" => Box::new(BinaryCrossEntropy),
        "categoricalCrossentropy" | "categorical_crossentropy" => {
            Box::new(CategoricalCrossEntropy)
        }
        other => return Err(MlErr::UnknownLoss(other.to_string())),
    };

    Ok(loss)
}

/// A network with its parameters, optimizer and loss, ready to be fitted.
pub struct CompiledModel {
    model: Sequential,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: BoxedOptimizer,
    loss: BoxedLoss,
    track_accuracy: bool,
}

impl CompiledModel {
    pub fn model(&self) -> &Sequential {
        &self.model
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn output_size(&self) -> usize {
        self.model.output_size()
    }

    pub fn loss_name(&self) -> &'static str {
        self.loss.name()
    }

    pub fn tracks_accuracy(&self) -> bool {
        self.track_accuracy
    }

    /// Runs one pass over `batches`, updating the parameters after each one.
    pub fn train_epoch<'a, I>(&mut self, batches: I) -> Result<EpochStats>
    where
        I: Iterator<Item = (ArrayView2<'a, f32>, ArrayView2<'a, f32>)>,
    {
        self.model.backprop(
            &mut self.params,
            &mut self.grad,
            self.loss.as_ref(),
            self.optimizer.as_mut(),
            self.track_accuracy,
            batches,
        )
    }

    pub fn evaluate(&self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<EpochStats> {
        self.model
            .evaluate(&self.params, self.loss.as_ref(), self.track_accuracy, x, y)
    }

    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.model.predict(&self.params, x)
    }

    /// Freezes the trained weights into an inference-only `Network`.
    pub fn into_network(self) -> Result<Network> {
        Network::new(self.model, self.params)
    }
}

/// Builds `CompiledModel`s given a `ModelConfig`.
#[derive(Debug, Default, Clone)]
pub struct ModelBuilder {
    seed: Option<u64>,
}

impl ModelBuilder {
    /// Creates a new `ModelBuilder` that initializes weights from OS entropy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes weight initialization reproducible.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Builds and compiles a network.
    ///
    /// # Arguments
    /// * `config` - The declarative network shape and compile options.
    /// * `input_width` - The amount of feature columns.
    /// * `classes` - The amount of distinct target classes, if the target is categorical.
    ///
    /// # Returns
    /// The compiled model or a configuration error.
    pub fn build(
        &self,
        config: &ModelConfig,
        input_width: usize,
        classes: Option<usize>,
    ) -> Result<CompiledModel> {
        if input_width == 0 {
            return Err(MlErr::EmptyFeatures);
        }

        let widths = resolve_layers(config, input_width)?;
        let output = widths.last().copied().unwrap_or_default();
        check_output(config.problem_type, classes, output)?;

        let default_compile = CompileOptions {
            optimizer: "adam".to_string(),
            learning_rate: 0.001,
            loss_function: None,
            metrics: Metrics::One("accuracy".to_string()),
        };
        let compile = config.compile_options.as_ref().unwrap_or(&default_compile);

        let hidden_act = ActFn::from(config.activation_function.unwrap_or(ActivationSpec::Linear));
        let regularizer = config
            .regularization
            .map(|spec| Regularizer::from_spec(spec, config.regularization_rate));
        let initializer = config.kernel_initializer.unwrap_or_default();

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut layers = Vec::with_capacity(widths.len());
        let mut params = Vec::new();
        let mut fan_in = input_width;
        for (i, &units) in widths.iter().enumerate() {
            let layer = if i + 1 == widths.len() {
                Dense::new((fan_in, units), output_act_fn(config.problem_type, units))
            } else {
                Dense::new((fan_in, units), hidden_act).with_regularizer(regularizer)
            };

            params.extend(init::kernel(initializer, &mut rng, fan_in, units)?);
            params.extend(std::iter::repeat_n(0., units));
            layers.push(layer);
            fan_in = units;
        }

        let model = Sequential::new(layers);
        let optimizer = optimization::by_name(&compile.optimizer, params.len(), compile.learning_rate)?;
        let loss = loss_by_name(
            compile
                .loss_function
                .as_deref()
                .unwrap_or(default_loss(config.problem_type, output)),
        )?;
        let track_accuracy =
            config.problem_type == ProblemType::Classification && compile.metrics.wants_accuracy();

        debug!(
            optimizer = compile.optimizer.as_str(),
            loss = loss.name();
            "model built\n{}",
            model.summary()
        );

        Ok(CompiledModel {
            grad: vec![0.; params.len()],
            model,
            params,
            optimizer,
            loss,
            track_accuracy,
        })
    }
}
