use crate::models::MotionModelTrait;
use crate::symbolic::{Expr, LnFn, Symbol};

use macro_const::macro_const;
use ndarray::ArrayView2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

macro_const! {
    const DOC: &str = r#"
Brownian-motion model of shape evolution

Every component of the child vector is normally distributed around the
corresponding parent component with variance $\sigma^2 t$, where $t$ is the
branch length and $\sigma^2$ the single free rate parameter:

$$
\ln L = \sum_i \left( -\frac12 \ln(2 \pi \sigma^2 t) - \frac{(x_i - \mu_i)^2}{2 \sigma^2 t} \right).
$$

- Number of free parameters: **1**

"#;
}

#[doc = DOC!()]
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Brownian {}

impl Brownian {
    /// Name of the rate parameter symbol
    pub const RATE_SYMBOL: &'static str = "sigma2";

    pub fn new() -> Self {
        Self {}
    }

    pub fn doc() -> &'static str {
        DOC
    }

    fn rate(&self) -> Symbol {
        Symbol::new(Self::RATE_SYMBOL)
    }
}

impl MotionModelTrait for Brownian {
    fn branch_ln_like(
        &self,
        time: &Expr,
        from_states: ArrayView2<'_, Expr>,
        to_states: ArrayView2<'_, Expr>,
        ln: &LnFn,
    ) -> Expr {
        debug_assert_eq!(from_states.dim(), to_states.dim());
        let variance = Expr::from(self.rate()) * time.clone();
        from_states
            .iter()
            .zip(to_states.iter())
            .map(|(from, to)| {
                let squared = (to.clone() - from.clone()).powi(2);
                -(ln(variance.clone() * TAU) * 0.5) - squared / (variance.clone() * 2.0)
            })
            .sum()
    }

    fn parameters(&self) -> Vec<Symbol> {
        vec![self.rate()]
    }
}
