use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display, LowerExp};

/// Scalar trait used by the shape containers and the vertex–vector
/// translator
///
/// Implemented for `f32` and `f64`. The inference pipeline itself works in
/// `f64`, the container types stay generic so shapes can be carried at
/// single precision.
pub trait Float:
    'static
    + num_traits::Float
    + num_traits::FloatConst
    + num_traits::NumAssign
    + num_traits::FromPrimitive
    + num_traits::ToPrimitive
    + ndarray::ScalarOperand
    + Debug
    + Display
    + LowerExp
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + JsonSchema
{
    fn half() -> Self;
    fn two() -> Self;

    /// Lossy conversion from a collection size, for averaging
    fn approx_from_usize(n: usize) -> Self;
}

impl Float for f32 {
    #[inline]
    fn half() -> Self {
        0.5
    }

    #[inline]
    fn two() -> Self {
        2.0
    }

    #[inline]
    fn approx_from_usize(n: usize) -> Self {
        n as f32
    }
}

impl Float for f64 {
    #[inline]
    fn half() -> Self {
        0.5
    }

    #[inline]
    fn two() -> Self {
        2.0
    }

    #[inline]
    fn approx_from_usize(n: usize) -> Self {
        n as f64
    }
}
