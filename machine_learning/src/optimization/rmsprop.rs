use super::Optimizer;

#[derive(Debug)]
pub struct RmsProp {
    learning_rate: f32,
    decay: f32,
    epsilon: f32,
    ms: Box<[f32]>,
}

impl RmsProp {
    pub fn new(len: usize, learning_rate: f32, decay: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            decay,
            epsilon,
            ms: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for RmsProp {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        let (lr, rho, eps) = (self.learning_rate, self.decay, self.epsilon);

        params
            .iter_mut()
            .zip(grad)
            .zip(self.ms.iter_mut())
            .for_each(|((w, g), ms)| {
                *ms = rho * *ms + (1. - rho) * g * g;
                *w -= lr * g / (*ms + eps).sqrt();
            });
    }
}
