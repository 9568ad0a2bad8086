use comms::specs::Normalization;
use ndarray::Array2;

/// A fitted numeric rescaling of a column, with its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scaler {
    MinMax { min: f32, max: f32 },
    ZScore { mean: f32, std: f32 },
}

impl Scaler {
    /// Fits a scaler over a column.
    ///
    /// # Arguments
    /// * `normalization` - The requested rescaling.
    /// * `values` - Every value of the column.
    ///
    /// # Returns
    /// `None` when no rescaling was requested.
    pub fn fit(normalization: Normalization, values: &[f32]) -> Option<Self> {
        let n = values.len().max(1) as f32;

        match normalization {
            Normalization::None => None,
            Normalization::MinMax => {
                let (min, max) = values
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                        (lo.min(v), hi.max(v))
                    });
                let (min, max) = if values.is_empty() { (0., 1.) } else { (min, max) };
                Some(Self::MinMax { min, max })
            }
            Normalization::ZScore => {
                let mean = values.iter().sum::<f32>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
                Some(Self::ZScore {
                    mean,
                    std: var.sqrt(),
                })
            }
        }
    }

    // A zero spread is replaced by 1 so constant columns stay invertible.
    fn spread(&self) -> f32 {
        let spread = match *self {
            Self::MinMax { min, max } => max - min,
            Self::ZScore { std, .. } => std,
        };

        if spread == 0. { 1. } else { spread }
    }

    fn origin(&self) -> f32 {
        match *self {
            Self::MinMax { min, .. } => min,
            Self::ZScore { mean, .. } => mean,
        }
    }

    pub fn scale(&self, x: f32) -> f32 {
        (x - self.origin()) / self.spread()
    }

    /// Inverts `scale`.
    pub fn decode(&self, y: f32) -> f32 {
        y * self.spread() + self.origin()
    }

    /// Scales a column into a single column tensor block.
    pub fn transform(&self, values: &[f32]) -> Array2<f32> {
        Array2::from_shape_fn((values.len(), 1), |(i, _)| self.scale(values[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minmax_maps_to_unit_range() {
        let values = [2.0, 4.0, 6.0];
        let scaler = Scaler::fit(Normalization::MinMax, &values).unwrap();

        assert_eq!(scaler.scale(2.0), 0.0);
        assert_eq!(scaler.scale(6.0), 1.0);
        assert_eq!(scaler.transform(&values).column(0).to_vec(), [0.0, 0.5, 1.0]);
    }

    #[test]
    fn round_trips_within_tolerance() {
        let values = [-3.5, 0.25, 7.0, 12.75, 100.0];

        for norm in [Normalization::MinMax, Normalization::ZScore] {
            let scaler = Scaler::fit(norm, &values).unwrap();
            for &x in &values {
                assert!((scaler.decode(scaler.scale(x)) - x).abs() < 1e-4 * x.abs().max(1.));
            }
        }
    }

    #[test]
    fn zscore_uses_population_std() {
        let scaler = Scaler::fit(Normalization::ZScore, &[1.0, 3.0]).unwrap();
        assert_eq!(scaler, Scaler::ZScore { mean: 2.0, std: 1.0 });
    }

    #[test]
    fn constant_column_is_invertible() {
        let scaler = Scaler::fit(Normalization::MinMax, &[5.0, 5.0]).unwrap();
        assert_eq!(scaler.scale(5.0), 0.0);
        assert_eq!(scaler.decode(0.0), 5.0);
        assert!(Scaler::fit(Normalization::None, &[1.0]).is_none());
    }
}
