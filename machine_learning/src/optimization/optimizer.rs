/// An algorithm that updates the parameters given their gradient.
pub trait Optimizer {
    /// Updates the parameters according to the algorithm's learning rule.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient used for taking the step.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]);
}
