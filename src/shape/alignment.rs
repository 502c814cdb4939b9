use crate::error::ShapeError;
use crate::float_trait::Float;
use crate::shape::Vertices;

use std::collections::HashMap;

/// Label-addressed collection of shape samples
///
/// The counterpart of a sequence alignment for shapes: every sample is a
/// vertex set with a label to be matched against a tree tip name. All
/// samples must agree on the vertex count, mismatches are rejected at
/// construction.
#[derive(Clone, Debug)]
pub struct ShapeAlignment<T>
where
    T: Float,
{
    labels: Vec<String>,
    samples: Vec<Vertices<T>>,
    by_label: HashMap<String, usize>,
}

impl<T> ShapeAlignment<T>
where
    T: Float,
{
    pub fn new(pairs: Vec<(String, Vertices<T>)>) -> Result<Self, ShapeError> {
        if pairs.is_empty() {
            return Err(ShapeError::EmptyAlignment);
        }
        let nvertices = pairs[0].1.len();
        let mut labels = Vec::with_capacity(pairs.len());
        let mut samples = Vec::with_capacity(pairs.len());
        let mut by_label = HashMap::with_capacity(pairs.len());
        for (index, (label, vertices)) in pairs.into_iter().enumerate() {
            if vertices.len() != nvertices {
                return Err(ShapeError::VertexCountMismatch {
                    index,
                    expected: nvertices,
                    actual: vertices.len(),
                });
            }
            if by_label.insert(label.clone(), index).is_some() {
                return Err(ShapeError::DuplicateLabel { label });
            }
            labels.push(label);
            samples.push(vertices);
        }
        Ok(Self {
            labels,
            samples,
            by_label,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Vertex count shared by every sample
    #[inline]
    pub fn nvertices(&self) -> usize {
        self.samples[0].len()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.by_label.contains_key(label)
    }

    pub fn get(&self, label: &str) -> Option<&Vertices<T>> {
        self.by_label.get(label).map(|&index| &self.samples[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Vertices<T>)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.samples.iter())
    }
}
