use crate::error::SymbolicError;
use crate::symbolic::{Expr, ExprNode, Symbol};

use ndarray::{Array1, ArrayView1};
use std::collections::HashMap;

/// Elementary tape operation
///
/// Operands are tape slot indices of previously computed values. `Powi`
/// carries its integer exponent inline.
#[derive(Clone, Copy, Debug)]
enum Op {
    Const(f64),
    Var(u32),
    Add(u32, u32),
    Sub(u32, u32),
    Mul(u32, u32),
    Div(u32, u32),
    Neg(u32),
    Ln(u32),
    Powi(u32, i32),
}

/// Expression compiled to a linear tape
///
/// Produced by [compile]. [CompiledExpr::value] runs a forward sweep,
/// [CompiledExpr::value_and_grad] adds a reverse adjoint sweep for the
/// exact gradient with respect to the compilation variable order.
#[derive(Clone, Debug)]
pub struct CompiledExpr {
    ops: Vec<Op>,
    nvars: usize,
}

/// Flatten an expression graph into a [CompiledExpr]
///
/// `variables` fixes the slot order of the free variables, every symbol
/// reachable from `expr` must appear in it. Shared subexpressions are
/// emitted once.
pub fn compile(expr: &Expr, variables: &[Symbol]) -> Result<CompiledExpr, SymbolicError> {
    let var_slots: HashMap<&str, u32> = variables
        .iter()
        .enumerate()
        .map(|(slot, symbol)| (symbol.name(), slot as u32))
        .collect();

    enum Frame<'a> {
        Enter(&'a Expr),
        Exit(&'a Expr),
    }

    let mut slots: HashMap<usize, u32> = HashMap::new();
    let mut ops = Vec::new();
    let mut stack = vec![Frame::Enter(expr)];
    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(e) => {
                if slots.contains_key(&e.key()) {
                    continue;
                }
                stack.push(Frame::Exit(e));
                match e.node() {
                    ExprNode::Const(_) | ExprNode::Sym(_) => {}
                    ExprNode::Add(a, b)
                    | ExprNode::Sub(a, b)
                    | ExprNode::Mul(a, b)
                    | ExprNode::Div(a, b) => {
                        stack.push(Frame::Enter(b));
                        stack.push(Frame::Enter(a));
                    }
                    ExprNode::Neg(a) | ExprNode::Ln(a) | ExprNode::Powi(a, _) => {
                        stack.push(Frame::Enter(a));
                    }
                }
            }
            Frame::Exit(e) => {
                if slots.contains_key(&e.key()) {
                    continue;
                }
                let op = match e.node() {
                    ExprNode::Const(value) => Op::Const(*value),
                    ExprNode::Sym(symbol) => {
                        let slot =
                            var_slots
                                .get(symbol.name())
                                .ok_or_else(|| SymbolicError::UnboundSymbol {
                                    name: symbol.name().to_owned(),
                                })?;
                        Op::Var(*slot)
                    }
                    ExprNode::Add(a, b) => Op::Add(slots[&a.key()], slots[&b.key()]),
                    ExprNode::Sub(a, b) => Op::Sub(slots[&a.key()], slots[&b.key()]),
                    ExprNode::Mul(a, b) => Op::Mul(slots[&a.key()], slots[&b.key()]),
                    ExprNode::Div(a, b) => Op::Div(slots[&a.key()], slots[&b.key()]),
                    ExprNode::Neg(a) => Op::Neg(slots[&a.key()]),
                    ExprNode::Ln(a) => Op::Ln(slots[&a.key()]),
                    ExprNode::Powi(a, exp) => Op::Powi(slots[&a.key()], *exp),
                };
                slots.insert(e.key(), ops.len() as u32);
                ops.push(op);
            }
        }
    }

    Ok(CompiledExpr {
        ops,
        nvars: variables.len(),
    })
}

impl CompiledExpr {
    #[inline]
    pub fn nvars(&self) -> usize {
        self.nvars
    }

    /// Tape length, the number of elementary operations
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn forward(&self, x: ArrayView1<'_, f64>, vals: &mut [f64]) -> f64 {
        for (i, op) in self.ops.iter().enumerate() {
            vals[i] = match *op {
                Op::Const(value) => value,
                Op::Var(slot) => x[slot as usize],
                Op::Add(a, b) => vals[a as usize] + vals[b as usize],
                Op::Sub(a, b) => vals[a as usize] - vals[b as usize],
                Op::Mul(a, b) => vals[a as usize] * vals[b as usize],
                Op::Div(a, b) => vals[a as usize] / vals[b as usize],
                Op::Neg(a) => -vals[a as usize],
                Op::Ln(a) => vals[a as usize].ln(),
                Op::Powi(a, exp) => vals[a as usize].powi(exp),
            };
        }
        vals.last().copied().unwrap_or(0.0)
    }

    pub fn value(&self, x: ArrayView1<'_, f64>) -> f64 {
        debug_assert_eq!(x.len(), self.nvars);
        let mut vals = vec![0.0; self.ops.len()];
        self.forward(x, &mut vals)
    }

    pub fn value_and_grad(&self, x: ArrayView1<'_, f64>) -> (f64, Array1<f64>) {
        debug_assert_eq!(x.len(), self.nvars);
        let mut vals = vec![0.0; self.ops.len()];
        let value = self.forward(x, &mut vals);

        let mut grad = Array1::zeros(self.nvars);
        let mut adj = vec![0.0; self.ops.len()];
        if let Some(last) = adj.last_mut() {
            *last = 1.0;
        }
        for i in (0..self.ops.len()).rev() {
            let a_i = adj[i];
            if a_i == 0.0 {
                continue;
            }
            match self.ops[i] {
                Op::Const(_) => {}
                Op::Var(slot) => grad[slot as usize] += a_i,
                Op::Add(a, b) => {
                    adj[a as usize] += a_i;
                    adj[b as usize] += a_i;
                }
                Op::Sub(a, b) => {
                    adj[a as usize] += a_i;
                    adj[b as usize] -= a_i;
                }
                Op::Mul(a, b) => {
                    adj[a as usize] += a_i * vals[b as usize];
                    adj[b as usize] += a_i * vals[a as usize];
                }
                Op::Div(a, b) => {
                    adj[a as usize] += a_i / vals[b as usize];
                    adj[b as usize] -= a_i * vals[i] / vals[b as usize];
                }
                Op::Neg(a) => adj[a as usize] -= a_i,
                Op::Ln(a) => adj[a as usize] += a_i / vals[a as usize],
                Op::Powi(a, exp) => {
                    adj[a as usize] += a_i * f64::from(exp) * vals[a as usize].powi(exp - 1);
                }
            }
        }
        (value, grad)
    }
}
