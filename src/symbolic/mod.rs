//! Symbolic scalar expressions and their compilation to numeric tapes
//!
//! The likelihood builder assembles an [Expr] graph over free [Symbol]s,
//! [compile] flattens the graph into a linear tape of elementary
//! operations. A forward sweep over the tape evaluates the expression, a
//! reverse adjoint sweep over the same tape yields the exact gradient.

mod compile;
mod expr;

pub use compile::{CompiledExpr, compile};
pub use expr::{Expr, LnFn, Symbol, natural_ln};

pub(crate) use expr::ExprNode;
