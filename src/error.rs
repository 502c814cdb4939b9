/// Error returned from shape containers and the vertex–vector translator
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("vertex coordinates must have three columns, got {ncols}")]
    NotThreeDimensional { ncols: usize },

    #[error("vertex colors length {ncolors} does not match vertex count {nvertices}")]
    ColorCountMismatch { nvertices: usize, ncolors: usize },

    #[error("sample {index} has {actual} vertices while the first sample has {expected}")]
    VertexCountMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate shape label {label:?}")]
    DuplicateLabel { label: String },

    #[error("at least one shape sample is required")]
    EmptyAlignment,

    #[error("at least two vertices are required to build a vector representation")]
    TooFewVertices,

    #[error("reference vertices {a} and {b} coincide, distance ratios are undefined")]
    CoincidentReferenceVertices { a: usize, b: usize },

    #[error("expected an array of shape {expected:?}, got {actual:?}")]
    ArrayShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Error returned from [crate::Tree] construction
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("names, parents and branch lengths must have equal lengths")]
    InputLengthMismatch,

    #[error("a tree needs at least two tips and one internal node, got {nnodes} nodes")]
    TooFewNodes { nnodes: usize },

    #[error("node {index} refers to parent {parent} outside of {nnodes} nodes")]
    ParentOutOfRange {
        index: usize,
        parent: usize,
        nnodes: usize,
    },

    #[error("the tree must have exactly one root, found {found}")]
    RootCount { found: usize },

    #[error("the root must be the last node index, found root at {index}")]
    RootNotLast { index: usize },

    #[error("leaves must occupy the leading indices, found leaf at {index} after an internal node")]
    LeafIndexOrder { index: usize },

    #[error("node {index} is not reachable from the root")]
    Unreachable { index: usize },

    #[error("branch length of node {index} must be finite and non-negative")]
    InvalidBranchLength { index: usize },
}

/// Error returned from symbolic expression compilation
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SymbolicError {
    #[error("symbol {name:?} does not appear in the compilation variable order")]
    UnboundSymbol { name: String },
}

/// Error returned from the [crate::PhyloShape] reconstruction pipeline
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ReconstructionError {
    #[error("shape data must include every tip in the tree, missing {name:?}")]
    MissingTipShape { name: String },

    #[error("vect_transform and vect_inverse_transform must be supplied together")]
    UnpairedTransform,

    #[error("{operation} requires {requires} to have run first")]
    NotReady {
        operation: &'static str,
        requires: &'static str,
    },

    #[error("vector transform returned {actual} arrays for {expected} tip samples")]
    TransformArity { expected: usize, actual: usize },

    #[error("tip vector shapes disagree: {expected:?} vs {actual:?}")]
    VectorShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("optimization failed: no successful attempt out of {attempts}")]
    OptimizationExhausted { attempts: u32 },

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Symbolic(#[from] SymbolicError),
}
