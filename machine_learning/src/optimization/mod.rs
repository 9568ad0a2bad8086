mod adadelta;
mod adagrad;
mod adam;
mod adamax;
mod gradient_descent;
mod momentum;
mod optimizer;
mod rmsprop;

pub use adadelta::Adadelta;
pub use adagrad::Adagrad;
pub use adam::Adam;
pub use adamax::Adamax;
pub use gradient_descent::GradientDescent;
pub use momentum::GradientDescentWithMomentum;
pub use optimizer::Optimizer;
pub use rmsprop::RmsProp;

use crate::{MlErr, Result};

/// A boxed optimizer that can move into a training thread.
pub type BoxedOptimizer = Box<dyn Optimizer + Send>;

const EPSILON: f32 = 1e-7;

/// Creates an optimizer from its UI name, using library defaults for everything but the
/// learning rate.
///
/// # Arguments
/// * `name` - The optimizer name, e.g. `adam`.
/// * `len` - The amount of parameters to optimize.
/// * `learning_rate` - The step length.
///
/// # Returns
/// The optimizer or `UnknownOptimizer`.
pub fn by_name(name: &str, len: usize, learning_rate: f32) -> Result<BoxedOptimizer> {
    let optimizer: BoxedOptimizer = match name {
        "sgd" => Box::new(GradientDescent::new(learning_rate)),
        "momentum" => Box::new(GradientDescentWithMomentum::new(len, learning_rate, 0.9)),
        "adam" => Box::new(Adam::new(len, learning_rate, 0.9, 0.999, EPSILON)),
        "adamax" => Box::new(Adamax::new(len, learning_rate, 0.9, 0.999, EPSILON)),
        "rmsprop" => Box::new(RmsProp::new(len, learning_rate, 0.9, EPSILON)),
        "adagrad" => Box::new(Adagrad::new(len, learning_rate, 0.1)),
        "adadelta" => Box::new(Adadelta::new(len, learning_rate, 0.95, EPSILON)),
        other => return Err(MlErr::UnknownOptimizer(other.to_string())),
    };

    Ok(optimizer)
}
