#![doc = include_str!("../README.md")]


mod basin_hopping;
pub use basin_hopping::{BasinHopping, MinimizeResult};

mod error;
pub use error::{ReconstructionError, ShapeError, SymbolicError, TreeError};

mod float_trait;
pub use float_trait::Float;

mod likelihood;

mod models;
pub use models::{Brownian, MotionModel, MotionModelTrait};

mod phylo;
pub use phylo::{MAX_ATTEMPTS, MlOptions, PhyloShape, VectInverseTransform, VectTransform};

mod shape;
pub use shape::{ShapeAlignment, Vertices};

pub mod symbolic;
pub use symbolic::{CompiledExpr, Expr, LnFn, Symbol};

mod translator;
pub use translator::{TranslatorMode, VertexVectorMapper};

mod tree;
pub use tree::{Node, Tree};

pub use ndarray;
