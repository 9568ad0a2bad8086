use super::Optimizer;

#[derive(Debug)]
pub struct Adagrad {
    learning_rate: f32,
    accum: Box<[f32]>,
}

impl Adagrad {
    /// Creates a new `Adagrad` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The base step length.
    /// * `initial_accumulator` - The starting value of the squared gradient sums.
    pub fn new(len: usize, learning_rate: f32, initial_accumulator: f32) -> Self {
        Self {
            learning_rate,
            accum: vec![initial_accumulator; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for Adagrad {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        let lr = self.learning_rate;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.accum.iter_mut())
            .for_each(|((w, g), acc)| {
                *acc += g * g;
                *w -= lr * g / acc.sqrt();
            });
    }
}
