use super::Optimizer;

/// Adam variant that scales by the infinity norm of past gradients.
#[derive(Debug)]
pub struct Adamax {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    m: Box<[f32]>,
    u: Box<[f32]>,
    epsilon: f32,
}

impl Adamax {
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            m: vec![0.; len].into_boxed_slice(),
            u: vec![0.; len].into_boxed_slice(),
            epsilon,
        }
    }
}

impl Optimizer for Adamax {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);

        self.beta1_t *= b1;
        let step_size = self.learning_rate / (1. - self.beta1_t);

        params
            .iter_mut()
            .zip(grad)
            .zip(self.m.iter_mut())
            .zip(self.u.iter_mut())
            .for_each(|(((w, g), m), u)| {
                *m = b1 * *m + (1. - b1) * g;
                *u = (b2 * *u).max(g.abs());
                *w -= step_size * *m / (*u + eps);
            });
    }
}
