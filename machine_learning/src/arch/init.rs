use comms::specs::InitializerSpec;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::{MlErr, Result};

fn uniform<R: Rng>(rng: &mut R, n: usize, limit: f32) -> Result<Vec<f32>> {
    let dist = Uniform::new_inclusive(-limit, limit).map_err(|e| MlErr::invalid(e.to_string()))?;
    Ok(dist.sample_iter(rng).take(n).collect())
}

fn normal<R: Rng>(rng: &mut R, n: usize, std_dev: f32) -> Result<Vec<f32>> {
    let dist = Normal::new(0., std_dev).map_err(|e| MlErr::invalid(e.to_string()))?;
    Ok(dist.sample_iter(rng).take(n).collect())
}

/// Samples the kernel weights of a `fan_in x fan_out` layer.
///
/// # Arguments
/// * `spec` - The initialization scheme.
/// * `rng` - A random number generator.
/// * `fan_in` - The number of input units of the layer.
/// * `fan_out` - The number of output units of the layer.
///
/// # Returns
/// `fan_in * fan_out` weights, or an error if the scheme's range is invalid.
pub fn kernel<R: Rng>(
    spec: InitializerSpec,
    rng: &mut R,
    fan_in: usize,
    fan_out: usize,
) -> Result<Vec<f32>> {
    let n = fan_in * fan_out;
    let (fin, fout) = (fan_in.max(1) as f32, fan_out.max(1) as f32);

    match spec {
        InitializerSpec::GlorotUniform => uniform(rng, n, (6. / (fin + fout)).sqrt()),
        InitializerSpec::GlorotNormal => normal(rng, n, (2. / (fin + fout)).sqrt()),
        InitializerSpec::HeUniform => uniform(rng, n, (6. / fin).sqrt()),
        InitializerSpec::HeNormal => normal(rng, n, (2. / fin).sqrt()),
        InitializerSpec::LeCunUniform => uniform(rng, n, (3. / fin).sqrt()),
        InitializerSpec::LeCunNormal => normal(rng, n, (1. / fin).sqrt()),
        InitializerSpec::RandomUniform => uniform(rng, n, 0.05),
        InitializerSpec::RandomNormal => normal(rng, n, 0.05),
        InitializerSpec::Zeros => Ok(vec![0.; n]),
        InitializerSpec::Ones => Ok(vec![1.; n]),
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn glorot_uniform_within_limit() {
        let mut rng = StdRng::seed_from_u64(42);
        let w = kernel(InitializerSpec::GlorotUniform, &mut rng, 4, 2).unwrap();

        let limit = 1.0;
        assert_eq!(w.len(), 8);
        assert!(w.iter().all(|w| w.abs() <= limit));
    }

    #[test]
    fn constant_schemes() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(kernel(InitializerSpec::Zeros, &mut rng, 3, 3).unwrap().iter().all(|&w| w == 0.));
        assert!(kernel(InitializerSpec::Ones, &mut rng, 3, 3).unwrap().iter().all(|&w| w == 1.));
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let a = kernel(InitializerSpec::HeNormal, &mut StdRng::seed_from_u64(7), 5, 5).unwrap();
        let b = kernel(InitializerSpec::HeNormal, &mut StdRng::seed_from_u64(7), 5, 5).unwrap();
        assert_eq!(a, b);
    }
}
