use crate::error::ShapeError;
use crate::float_trait::Float;

use itertools::Itertools;
use ndarray::{Array2, ArrayView1, ArrayView2};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Fitting mode of [VertexVectorMapper]
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum TranslatorMode {
    /// Fit the reference configuration from the per-vertex mean of all
    /// samples
    #[default]
    NetworkLocal,
    /// Fit the reference configuration from the first sample alone
    ///
    /// Legacy behavior kept for backward compatibility, prefer
    /// [TranslatorMode::NetworkLocal].
    Reference,
}

/// Bidirectional mapping between vertex coordinates and the vector
/// representation used by motion models
///
/// Fitting selects, for every vertex but the first, the nearest
/// `num_anchors` vertices of a reference configuration and stores the
/// reference distances to them. [VertexVectorMapper::to_vectors] encodes a
/// shape as distance *ratios* against those reference distances, so a
/// shape close to the reference encodes close to 1 everywhere.
/// [VertexVectorMapper::to_vertices] decodes by relaxing vertex positions
/// back onto the encoded distances, which is lossy whenever the encoding
/// has fewer degrees of freedom than the coordinates.
///
/// Immutable after construction.
#[derive(Clone, Debug)]
pub struct VertexVectorMapper<T>
where
    T: Float,
{
    reference: Array2<T>,
    /// Anchor vertex ids, row `i` holds the anchors of vertex `i + 1`
    anchors: Array2<usize>,
    /// Reference distances, same layout as `anchors`, all positive
    ref_dists: Array2<T>,
    num_refine_iter: usize,
    mode: TranslatorMode,
}

impl<T> VertexVectorMapper<T>
where
    T: Float,
{
    /// Fit a mapper from the coordinate arrays of every sample
    ///
    /// All samples must share the vertex count. `num_anchors` is clamped
    /// to `[1, nvertices - 1]`; `num_refine_iter` is the number of
    /// relaxation sweeps used by [VertexVectorMapper::to_vertices].
    pub fn new(
        samples: &[ArrayView2<'_, T>],
        mode: TranslatorMode,
        num_anchors: usize,
        num_refine_iter: usize,
    ) -> Result<Self, ShapeError> {
        let first = samples.first().ok_or(ShapeError::EmptyAlignment)?;
        let nvertices = first.nrows();
        for (index, sample) in samples.iter().enumerate() {
            if sample.ncols() != 3 {
                return Err(ShapeError::NotThreeDimensional {
                    ncols: sample.ncols(),
                });
            }
            if sample.nrows() != nvertices {
                return Err(ShapeError::VertexCountMismatch {
                    index,
                    expected: nvertices,
                    actual: sample.nrows(),
                });
            }
        }
        if nvertices < 2 {
            return Err(ShapeError::TooFewVertices);
        }

        let reference = match mode {
            TranslatorMode::NetworkLocal => {
                let sum = samples
                    .iter()
                    .fold(Array2::<T>::zeros((nvertices, 3)), |acc, sample| {
                        acc + sample
                    });
                sum / T::approx_from_usize(samples.len())
            }
            TranslatorMode::Reference => first.to_owned(),
        };

        let num_anchors = num_anchors.clamp(1, nvertices - 1);
        let mut anchors = Array2::zeros((nvertices - 1, num_anchors));
        let mut ref_dists = Array2::zeros((nvertices - 1, num_anchors));
        for i in 1..nvertices {
            let candidates = (0..nvertices)
                .filter(|&j| j != i)
                .map(|j| (distance(reference.row(i), reference.row(j)), j))
                .sorted_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
                .take(num_anchors);
            for (slot, (dist, j)) in candidates.enumerate() {
                if dist <= T::zero() {
                    return Err(ShapeError::CoincidentReferenceVertices { a: i, b: j });
                }
                anchors[[i - 1, slot]] = j;
                ref_dists[[i - 1, slot]] = dist;
            }
        }

        Ok(Self {
            reference,
            anchors,
            ref_dists,
            num_refine_iter,
            mode,
        })
    }

    #[inline]
    pub fn nvertices(&self) -> usize {
        self.reference.nrows()
    }

    /// Shape of the encoded array: `(nvertices - 1, num_anchors)`
    #[inline]
    pub fn vector_shape(&self) -> (usize, usize) {
        self.ref_dists.dim()
    }

    /// Flattened length of the encoded array
    #[inline]
    pub fn vector_dim(&self) -> usize {
        self.ref_dists.len()
    }

    #[inline]
    pub fn mode(&self) -> TranslatorMode {
        self.mode
    }

    #[inline]
    pub fn num_refine_iter(&self) -> usize {
        self.num_refine_iter
    }

    /// Encode one sample's coordinates into the vector representation
    ///
    /// Pure function of the input and the fitted state.
    pub fn to_vectors(&self, coords: ArrayView2<'_, T>) -> Result<Array2<T>, ShapeError> {
        if coords.dim() != self.reference.dim() {
            return Err(ShapeError::ArrayShapeMismatch {
                expected: self.reference.dim(),
                actual: coords.dim(),
            });
        }
        let (nrows, num_anchors) = self.vector_shape();
        let mut vectors = Array2::zeros((nrows, num_anchors));
        for i in 0..nrows {
            for slot in 0..num_anchors {
                let j = self.anchors[[i, slot]];
                vectors[[i, slot]] =
                    distance(coords.row(i + 1), coords.row(j)) / self.ref_dists[[i, slot]];
            }
        }
        Ok(vectors)
    }

    /// Decode a vector representation back into vertex coordinates
    ///
    /// Starts from the reference configuration with vertex 0 pinned and
    /// runs `num_refine_iter` relaxation sweeps moving every other vertex
    /// onto its encoded anchor distances. Deterministic; the result is
    /// exact only up to the information the encoding retains.
    pub fn to_vertices(&self, vectors: ArrayView2<'_, T>) -> Result<Array2<T>, ShapeError> {
        if vectors.dim() != self.vector_shape() {
            return Err(ShapeError::ArrayShapeMismatch {
                expected: self.vector_shape(),
                actual: vectors.dim(),
            });
        }
        let (nrows, num_anchors) = self.vector_shape();
        let mut coords = self.reference.clone();
        for _ in 0..self.num_refine_iter {
            for i in 1..=nrows {
                let mut pos = [T::zero(); 3];
                for slot in 0..num_anchors {
                    let j = self.anchors[[i - 1, slot]];
                    let target = vectors[[i - 1, slot]] * self.ref_dists[[i - 1, slot]];
                    let here = distance(coords.row(i), coords.row(j));
                    for axis in 0..3 {
                        let direction = if here > T::zero() {
                            (coords[[i, axis]] - coords[[j, axis]]) / here
                        } else {
                            // Degenerate collapse, fall back to the
                            // reference direction (positive by fit).
                            (self.reference[[i, axis]] - self.reference[[j, axis]])
                                / self.ref_dists[[i - 1, slot]]
                        };
                        pos[axis] += coords[[j, axis]] + target * direction;
                    }
                }
                let weight = T::approx_from_usize(num_anchors);
                for axis in 0..3 {
                    coords[[i, axis]] = pos[axis] / weight;
                }
            }
        }
        Ok(coords)
    }
}

fn distance<T>(a: ArrayView1<'_, T>, b: ArrayView1<'_, T>) -> T
where
    T: Float,
{
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y) * (x - y))
        .fold(T::zero(), |acc, v| acc + v)
        .sqrt()
}
