use comms::specs::InitializerSpec;
use image::{RgbImage, imageops::FilterType};
use ndarray::{Array2, Array3};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    MlErr, Result,
    arch::{ModelSnapshot, Network, Sequential, activations::ActFn, init, layers::Dense},
};

/// The side of the square the feature extractor reads.
pub const EXTRACTOR_SIDE: u32 = 224;

/// The width of the embeddings produced by the built-in extractor.
pub const EMBEDDING_SIZE: usize = 1024;

/// A frozen network that turns an image into a fixed length embedding.
///
/// It is loaded once per process and shared read-only between every session.
pub trait FeatureExtractor: Send + Sync {
    /// The length of the embeddings.
    fn embedding_size(&self) -> usize;

    /// Computes the embedding of a `(EXTRACTOR_SIDE, EXTRACTOR_SIDE, 3)` image in `[0, 1]`.
    fn extract(&self, pixels: &Array3<f32>) -> Result<Vec<f32>>;

    /// Resizes, normalizes and embeds an image.
    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>> {
        self.extract(&normalized_pixels(image))
    }
}

/// Resizes an image to the extractor input and scales its values to `[0, 1]`.
pub fn normalized_pixels(image: &RgbImage) -> Array3<f32> {
    let resized = image::imageops::resize(
        image,
        EXTRACTOR_SIDE,
        EXTRACTOR_SIDE,
        FilterType::Triangle,
    );

    let side = EXTRACTOR_SIDE as usize;
    Array3::from_shape_fn((side, side, 3), |(y, x, c)| {
        resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.
    })
}

/// The built-in extractor: grid average pooling followed by a frozen ReLU projection.
#[derive(Debug, Clone)]
pub struct PooledExtractor {
    grid: usize,
    head: Network,
}

impl PooledExtractor {
    pub const GRID: usize = 8;

    /// The length of the pooled vector fed to the projection.
    pub const fn pooled_size() -> usize {
        Self::GRID * Self::GRID * 3
    }

    /// Creates an extractor whose projection is sampled from `seed`.
    ///
    /// # Arguments
    /// * `seed` - The seed of the frozen Xavier projection.
    pub fn new(seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let dim = (Self::pooled_size(), EMBEDDING_SIZE);

        let mut params = init::kernel(InitializerSpec::GlorotUniform, &mut rng, dim.0, dim.1)?;
        params.extend(std::iter::repeat_n(0., dim.1));

        let model = Sequential::new([Dense::new(dim, ActFn::Relu)]);
        Self::with_head(Network::new(model, params)?)
    }

    /// Creates an extractor whose projection is loaded from a snapshot.
    pub fn from_snapshot(snapshot: ModelSnapshot) -> Result<Self> {
        Self::with_head(Network::from_snapshot(snapshot)?)
    }

    fn with_head(head: Network) -> Result<Self> {
        if head.input_size() != Self::pooled_size() {
            return Err(MlErr::SizeMismatch {
                a: "extractor head input",
                b: "pooled features",
                got: head.input_size(),
                expected: Self::pooled_size(),
            });
        }

        Ok(Self {
            grid: Self::GRID,
            head,
        })
    }

    /// Averages every channel over a `grid x grid` partition of the image.
    fn pool(&self, pixels: &Array3<f32>) -> Array2<f32> {
        let (h, w, c) = pixels.dim();
        let g = self.grid;
        let mut pooled = Array2::zeros((1, g * g * c));
        let mut counts = vec![0usize; g * g];

        for ((y, x, ch), &v) in pixels.indexed_iter() {
            let cell = (y * g / h.max(1)) * g + (x * g / w.max(1));
            pooled[[0, cell * c + ch]] += v;
            if ch == 0 {
                counts[cell] += 1;
            }
        }

        for (i, v) in pooled.iter_mut().enumerate() {
            *v /= counts[i / c].max(1) as f32;
        }

        pooled
    }
}

impl FeatureExtractor for PooledExtractor {
    fn embedding_size(&self) -> usize {
        self.head.output_size()
    }

    fn extract(&self, pixels: &Array3<f32>) -> Result<Vec<f32>> {
        let pooled = self.pool(pixels);
        let embedding = self.head.predict(pooled.view())?;
        Ok(embedding.into_iter().collect())
    }
}
