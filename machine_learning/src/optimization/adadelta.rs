use super::Optimizer;

#[derive(Debug)]
pub struct Adadelta {
    learning_rate: f32,
    rho: f32,
    epsilon: f32,
    accum_grad: Box<[f32]>,
    accum_update: Box<[f32]>,
}

impl Adadelta {
    pub fn new(len: usize, learning_rate: f32, rho: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            rho,
            epsilon,
            accum_grad: vec![0.; len].into_boxed_slice(),
            accum_update: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for Adadelta {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        let (lr, rho, eps) = (self.learning_rate, self.rho, self.epsilon);

        params
            .iter_mut()
            .zip(grad)
            .zip(self.accum_grad.iter_mut())
            .zip(self.accum_update.iter_mut())
            .for_each(|(((w, g), ag), au)| {
                *ag = rho * *ag + (1. - rho) * g * g;
                let update = (*au + eps).sqrt() / (*ag + eps).sqrt() * g;
                *au = rho * *au + (1. - rho) * update * update;
                *w -= lr * update;
            });
    }
}
