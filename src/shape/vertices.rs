use crate::error::ShapeError;
use crate::float_trait::Float;

use ndarray::{Array2, ArrayView2};

/// Vertex set of one shape sample
///
/// Coordinates are an `(nvertices, 3)` array. Per-vertex RGB colors are
/// optional and carried through untouched, the reconstruction core never
/// reads them.
#[derive(Clone, Debug, PartialEq)]
pub struct Vertices<T>
where
    T: Float,
{
    coords: Array2<T>,
    colors: Option<Array2<u8>>,
}

impl<T> Vertices<T>
where
    T: Float,
{
    pub fn new(coords: Array2<T>) -> Result<Self, ShapeError> {
        if coords.ncols() != 3 {
            return Err(ShapeError::NotThreeDimensional {
                ncols: coords.ncols(),
            });
        }
        Ok(Self {
            coords,
            colors: None,
        })
    }

    pub fn with_colors(coords: Array2<T>, colors: Array2<u8>) -> Result<Self, ShapeError> {
        let vertices = Self::new(coords)?;
        if colors.nrows() != vertices.len() {
            return Err(ShapeError::ColorCountMismatch {
                nvertices: vertices.len(),
                ncolors: colors.nrows(),
            });
        }
        Ok(Self {
            colors: Some(colors),
            ..vertices
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coords.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.nrows() == 0
    }

    #[inline]
    pub fn coords(&self) -> ArrayView2<'_, T> {
        self.coords.view()
    }

    #[inline]
    pub fn colors(&self) -> Option<ArrayView2<'_, u8>> {
        self.colors.as_ref().map(|c| c.view())
    }

    pub fn into_coords(self) -> Array2<T> {
        self.coords
    }
}
