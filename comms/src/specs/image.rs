use std::{collections::BTreeMap, error::Error, fmt};

use serde::{Deserialize, Serialize};

/// One entry of a classifier training request, class name to base64 samples.
pub type ClassSamples = BTreeMap<String, Vec<String>>;

/// Returned when appending to a class that already holds the maximum samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLimitReached {
    pub limit: usize,
}

impl fmt::Display for SampleLimitReached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image class is full, at most {} samples", self.limit)
    }
}

impl Error for SampleLimitReached {}

/// A teachable-machine class: a name plus the images captured for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageClass {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub samples: Vec<String>,
    #[serde(default)]
    pub color: String,
}

impl ImageClass {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            samples: Vec::new(),
            color: color.into(),
        }
    }

    /// Appends a captured sample.
    ///
    /// # Arguments
    /// * `sample` - A base64 (or data url) encoded image.
    /// * `limit` - The maximum amount of samples the class may hold.
    ///
    /// # Returns
    /// `SampleLimitReached` if the class is already full.
    pub fn push(&mut self, sample: String, limit: usize) -> Result<(), SampleLimitReached> {
        if self.samples.len() >= limit {
            return Err(SampleLimitReached { limit });
        }

        self.samples.push(sample);
        Ok(())
    }

    /// Removes the sample at `index`, if any.
    pub fn remove(&mut self, index: usize) -> Option<String> {
        (index < self.samples.len()).then(|| self.samples.remove(index))
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Converts a list of classes into the `{className: samples}` request inputs.
    pub fn into_inputs(classes: impl IntoIterator<Item = ImageClass>) -> Vec<ClassSamples> {
        classes
            .into_iter()
            .map(|class| ClassSamples::from([(class.name, class.samples)]))
            .collect()
    }
}
