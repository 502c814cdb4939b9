use crate::symbolic::{Expr, LnFn, Symbol};

use enum_dispatch::enum_dispatch;
use ndarray::ArrayView2;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

mod brownian;
pub use brownian::Brownian;

/// Statistical model of shape-vector change along one tree branch
#[enum_dispatch]
pub trait MotionModelTrait: Clone + Debug + Send + Serialize + DeserializeOwned {
    /// Symbolic log-likelihood contribution of a single branch
    ///
    /// `time` is the branch length, `from_states`/`to_states` the parent
    /// and child vector representations. Any of them may mix constants
    /// and free symbols. `ln` is the caller-supplied logarithm, see
    /// [crate::symbolic::LnFn].
    fn branch_ln_like(
        &self,
        time: &Expr,
        from_states: ArrayView2<'_, Expr>,
        to_states: ArrayView2<'_, Expr>,
        ln: &LnFn,
    ) -> Expr;

    /// The model's own free parameter symbols, in model-defined order
    fn parameters(&self) -> Vec<Symbol>;
}

/// All motion models are available as variants of this enum
///
/// New models register a new variant, the likelihood builder stays
/// unchanged.
#[enum_dispatch(MotionModelTrait)]
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[non_exhaustive]
pub enum MotionModel {
    Brownian,
}

impl Default for MotionModel {
    fn default() -> Self {
        Brownian::default().into()
    }
}
