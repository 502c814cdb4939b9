use crate::basin_hopping::BasinHopping;
use crate::error::ReconstructionError;
use crate::likelihood::{build_log_like, tip_vector_shape, unpack_result, variable_order};
use crate::models::{MotionModel, MotionModelTrait};
use crate::shape::{ShapeAlignment, Vertices};
use crate::symbolic::{CompiledExpr, Expr, LnFn, compile, natural_ln};
use crate::translator::{TranslatorMode, VertexVectorMapper};
use crate::tree::Tree;

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2, s};
use rand::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum number of randomized optimization attempts per reconstruction
pub const MAX_ATTEMPTS: u32 = 200;

/// Forward vector transform applied to the full set of tip vector arrays,
/// e.g. a dimensionality-reducing projection
pub type VectTransform = Box<dyn Fn(&[Array2<f64>]) -> Vec<Array2<f64>>>;

/// Exact inverse of [VectTransform], applied to a single node's vectors
pub type VectInverseTransform = Box<dyn Fn(&Array2<f64>) -> Array2<f64>>;

/// Options of [PhyloShape::reconstruct_ancestral_shapes_ml]
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct MlOptions {
    pub mode: TranslatorMode,
    pub num_anchors: usize,
    pub num_refine_iter: usize,
    /// Accepted for interface compatibility and deliberately unused:
    /// optimization attempts always run sequentially in-process
    pub num_workers: usize,
    /// Seed of the initial-guess random stream
    pub seed: u64,
    pub algorithm: BasinHopping,
}

impl MlOptions {
    pub fn new(
        mode: TranslatorMode,
        num_anchors: usize,
        num_refine_iter: usize,
        num_workers: usize,
        seed: u64,
        algorithm: BasinHopping,
    ) -> Self {
        assert!(num_anchors > 0, "num_anchors must be positive");
        assert!(num_workers > 0, "num_workers must be positive");
        Self {
            mode,
            num_anchors,
            num_refine_iter,
            num_workers,
            seed,
            algorithm,
        }
    }

    #[inline]
    pub fn default_num_anchors() -> usize {
        20
    }

    #[inline]
    pub fn default_num_refine_iter() -> usize {
        5
    }

    #[inline]
    pub fn default_num_workers() -> usize {
        1
    }

    #[inline]
    pub fn default_seed() -> u64 {
        0
    }
}

impl Default for MlOptions {
    fn default() -> Self {
        Self::new(
            TranslatorMode::default(),
            Self::default_num_anchors(),
            Self::default_num_refine_iter(),
            Self::default_num_workers(),
            Self::default_seed(),
            BasinHopping::default(),
        )
    }
}

/// Ancestral shape reconstruction over one tree and one shape alignment
///
/// Owns the tree binding, the fitted translator and the likelihood
/// formula exclusively; concurrent reconstructions never share state.
/// The main entry point is
/// [PhyloShape::reconstruct_ancestral_shapes_ml], the intermediate stages
/// are public for step-by-step use and fail with
/// [ReconstructionError::NotReady] when invoked out of order.
pub struct PhyloShape {
    tree: Tree,
    shapes: ShapeAlignment<f64>,
    model: MotionModel,
    vect_transform: Option<VectTransform>,
    vect_inverse_transform: Option<VectInverseTransform>,
    vv_translator: Option<VertexVectorMapper<f64>>,
    loglike_form: Option<Expr>,
    negloglike: Option<CompiledExpr>,
}

impl PhyloShape {
    /// Bind a tree and a shape alignment
    ///
    /// Every tip name must have a matching sample; the first unmatched
    /// tip fails the construction before any computation. A forward
    /// vector transform and its inverse must be supplied together or not
    /// at all.
    pub fn new(
        mut tree: Tree,
        shapes: ShapeAlignment<f64>,
        model: MotionModel,
        vect_transform: Option<VectTransform>,
        vect_inverse_transform: Option<VectInverseTransform>,
    ) -> Result<Self, ReconstructionError> {
        if vect_transform.is_some() != vect_inverse_transform.is_some() {
            return Err(ReconstructionError::UnpairedTransform);
        }
        for node_id in 0..tree.ntips() {
            let name = tree[node_id].name.clone();
            let vertices = shapes
                .get(&name)
                .ok_or(ReconstructionError::MissingTipShape { name })?
                .clone();
            tree[node_id].vertices = Some(vertices);
        }
        Ok(Self {
            tree,
            shapes,
            model,
            vect_transform,
            vect_inverse_transform,
            vv_translator: None,
            loglike_form: None,
            negloglike: None,
        })
    }

    #[inline]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    #[inline]
    pub fn model(&self) -> &MotionModel {
        &self.model
    }

    #[inline]
    pub fn translator(&self) -> Option<&VertexVectorMapper<f64>> {
        self.vv_translator.as_ref()
    }

    /// Compiled negative log-likelihood, available after
    /// [PhyloShape::functionalize_log_like]
    #[inline]
    pub fn negloglike(&self) -> Option<&CompiledExpr> {
        self.negloglike.as_ref()
    }

    /// Fit the vertex–vector translator from all samples
    ///
    /// Invalidates any previously built formula.
    pub fn build_vv_translator(
        &mut self,
        mode: TranslatorMode,
        num_anchors: usize,
        num_refine_iter: usize,
    ) -> Result<(), ReconstructionError> {
        let coords: Vec<ArrayView2<'_, f64>> = self
            .shapes
            .iter()
            .map(|(_, vertices)| vertices.coords())
            .collect();
        let translator = VertexVectorMapper::new(&coords, mode, num_anchors, num_refine_iter)?;
        info!(
            "vertex:vector ({}:{}) translator built",
            translator.nvertices(),
            translator.vector_shape().0
        );
        self.vv_translator = Some(translator);
        self.loglike_form = None;
        self.negloglike = None;
        Ok(())
    }

    /// Encode every tip's vertices into its vector representation
    ///
    /// Applies the forward vector transform, when one was supplied, to
    /// the full set of tip vector arrays.
    pub fn build_tip_vectors(&mut self) -> Result<(), ReconstructionError> {
        let translator =
            self.vv_translator
                .as_ref()
                .ok_or(ReconstructionError::NotReady {
                    operation: "build_tip_vectors",
                    requires: "build_vv_translator",
                })?;

        let ntips = self.tree.ntips();
        let mut vectors_list = Vec::with_capacity(ntips);
        for node_id in 0..ntips {
            let vertices =
                self.tree[node_id]
                    .vertices
                    .as_ref()
                    .ok_or(ReconstructionError::NotReady {
                        operation: "build_tip_vectors",
                        requires: "tip shape binding",
                    })?;
            vectors_list.push(translator.to_vectors(vertices.coords())?);
        }

        if let Some(transform) = &self.vect_transform {
            let transformed = transform(&vectors_list);
            if transformed.len() != ntips {
                return Err(ReconstructionError::TransformArity {
                    expected: ntips,
                    actual: transformed.len(),
                });
            }
            info!(
                "dimension {:?} -> {:?}",
                vectors_list[0].dim(),
                transformed[0].dim()
            );
            vectors_list = transformed;
        }

        let shape = vectors_list[0].dim();
        for vectors in &vectors_list {
            if vectors.dim() != shape {
                return Err(ReconstructionError::VectorShapeMismatch {
                    expected: shape,
                    actual: vectors.dim(),
                });
            }
        }
        for (node_id, vectors) in vectors_list.into_iter().enumerate() {
            self.tree[node_id].vectors = Some(vectors);
        }
        info!("vectors for {ntips} tips built");
        self.loglike_form = None;
        self.negloglike = None;
        Ok(())
    }

    /// Assemble the symbolic log-likelihood over the whole tree
    ///
    /// `ln` is the logarithm hook handed to the motion model, use
    /// [natural_ln] for the built-in tape back-end.
    pub fn formularize_log_like(&mut self, ln: &LnFn) -> Result<(), ReconstructionError> {
        let loglike = build_log_like(&self.model, &self.tree, ln)?;
        info!(
            "log-likelihood formula constructed over {} branches",
            self.tree.nnodes() - 1
        );
        self.loglike_form = Some(loglike);
        self.negloglike = None;
        Ok(())
    }

    /// Compile the formula into the callable negative log-likelihood
    ///
    /// The sign is flipped here, the optimization driver minimizes.
    pub fn functionalize_log_like(&mut self) -> Result<(), ReconstructionError> {
        let loglike = self
            .loglike_form
            .as_ref()
            .ok_or(ReconstructionError::NotReady {
                operation: "functionalize_log_like",
                requires: "formularize_log_like",
            })?;
        let shape = tip_vector_shape(&self.tree)?;
        let variables = variable_order(&self.model, &self.tree, shape.0 * shape.1);
        let negated = -loglike.clone();
        self.negloglike = Some(compile(&negated, &variables)?);
        debug!("negative log-likelihood compiled over {} variables", variables.len());
        Ok(())
    }

    /// Search for the maximum-likelihood free-variable assignment
    ///
    /// Runs up to [MAX_ATTEMPTS] seeded basin-hopping attempts, each from
    /// a fresh random initial guess whose ancestral-vector block is drawn
    /// within ±0.5% of 1 (ancestral shapes are expected close to the
    /// normalized reference). The first successful attempt wins and is
    /// unpacked onto the tree; later attempts never start and successes
    /// are not compared. Exhausting all attempts fails with
    /// [ReconstructionError::OptimizationExhausted] and leaves the tree
    /// untouched.
    ///
    /// `num_workers` is accepted for interface compatibility and ignored:
    /// attempts always run sequentially.
    pub fn minimize_negloglike(
        &mut self,
        algorithm: &BasinHopping,
        seed: u64,
        num_workers: usize,
    ) -> Result<(), ReconstructionError> {
        let negloglike = self
            .negloglike
            .as_ref()
            .ok_or(ReconstructionError::NotReady {
                operation: "minimize_negloglike",
                requires: "functionalize_log_like",
            })?;
        if num_workers != 1 {
            debug!("num_workers={num_workers} requested, attempts run sequentially");
        }

        let shape = tip_vector_shape(&self.tree)?;
        let nvals = shape.0 * shape.1;
        let nparams = self.model.parameters().len();
        let nvars = nparams + self.tree.nancestral() * nvals;

        let mut rng = StdRng::seed_from_u64(seed);
        info!("searching for the best solution ..");
        for attempt in 0..MAX_ATTEMPTS {
            let mut x0 = Array1::from_shape_fn(nvars, |_| rng.random::<f64>());
            for value in x0.slice_mut(s![nparams..]).iter_mut() {
                *value = 1.0 - (*value - 0.5) * 0.01;
            }
            let result = algorithm.minimize(negloglike, x0);
            if result.success {
                info!("attempt {attempt}: log-likelihood {:e}", -result.fun);
                let params = unpack_result(&self.model, &mut self.tree, shape, &result.x);
                for (symbol, value) in self.model.parameters().iter().zip(&params) {
                    info!("{}={:e}", symbol.name(), value);
                }
                return Ok(());
            }
            debug!("attempt {attempt} did not converge");
        }
        Err(ReconstructionError::OptimizationExhausted {
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Decode every ancestral node's optimized vectors into vertices
    ///
    /// Applies the inverse vector transform first, when one was supplied.
    pub fn build_ancestral_vertices(&mut self) -> Result<(), ReconstructionError> {
        let translator =
            self.vv_translator
                .as_ref()
                .ok_or(ReconstructionError::NotReady {
                    operation: "build_ancestral_vertices",
                    requires: "build_vv_translator",
                })?;
        for node_id in self.tree.ntips()..self.tree.nnodes() {
            let coords = {
                let vectors =
                    self.tree[node_id]
                        .vectors
                        .as_ref()
                        .ok_or(ReconstructionError::NotReady {
                            operation: "build_ancestral_vertices",
                            requires: "minimize_negloglike",
                        })?;
                match &self.vect_inverse_transform {
                    Some(inverse) => translator.to_vertices(inverse(vectors).view())?,
                    None => translator.to_vertices(vectors.view())?,
                }
            };
            self.tree[node_id].vertices = Some(Vertices::new(coords)?);
        }
        info!(
            "vertices for {} ancestral nodes reconstructed",
            self.tree.nancestral()
        );
        Ok(())
    }

    /// Reconstruct ancestral shapes by maximum likelihood
    ///
    /// Runs the whole pipeline. On success every internal tree node
    /// carries reconstructed vertices; on any failure the error
    /// propagates and no partial result is reported.
    pub fn reconstruct_ancestral_shapes_ml(
        &mut self,
        options: &MlOptions,
    ) -> Result<(), ReconstructionError> {
        self.build_vv_translator(options.mode, options.num_anchors, options.num_refine_iter)?;
        self.build_tip_vectors()?;
        self.formularize_log_like(&natural_ln)?;
        self.functionalize_log_like()?;
        self.minimize_negloglike(&options.algorithm, options.seed, options.num_workers)?;
        self.build_ancestral_vertices()?;
        Ok(())
    }
}

impl std::fmt::Debug for PhyloShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhyloShape")
            .field("tree", &self.tree)
            .field("model", &self.model)
            .field("transforms", &self.vect_transform.is_some())
            .field("vv_translator", &self.vv_translator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{quartet_alignment, quartet_tree, random_shape, star_alignment, star_tree};

    use approx::assert_relative_eq;

    fn star_phylo() -> PhyloShape {
        PhyloShape::new(
            star_tree(),
            star_alignment(),
            MotionModel::default(),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn missing_tip_shape_fails_before_any_computation() {
        let alignment = ShapeAlignment::new(vec![(
            "a".to_string(),
            Vertices::new(random_shape(&mut StdRng::seed_from_u64(0), 4)).unwrap(),
        )])
        .unwrap();
        let err = PhyloShape::new(star_tree(), alignment, MotionModel::default(), None, None)
            .unwrap_err();
        assert_eq!(
            err,
            ReconstructionError::MissingTipShape { name: "b".into() }
        );
    }

    #[test]
    fn forward_transform_alone_is_rejected() {
        let transform: VectTransform = Box::new(|vectors| vectors.to_vec());
        let err = PhyloShape::new(
            star_tree(),
            star_alignment(),
            MotionModel::default(),
            Some(transform),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ReconstructionError::UnpairedTransform);
    }

    #[test]
    fn inverse_transform_alone_is_rejected() {
        let inverse: VectInverseTransform = Box::new(|vectors| vectors.clone());
        let err = PhyloShape::new(
            star_tree(),
            star_alignment(),
            MotionModel::default(),
            None,
            Some(inverse),
        )
        .unwrap_err();
        assert_eq!(err, ReconstructionError::UnpairedTransform);
    }

    #[test]
    fn stages_fail_out_of_order() {
        let mut phylo = star_phylo();
        assert!(matches!(
            phylo.build_tip_vectors(),
            Err(ReconstructionError::NotReady {
                operation: "build_tip_vectors",
                ..
            })
        ));
        assert!(matches!(
            phylo.functionalize_log_like(),
            Err(ReconstructionError::NotReady {
                operation: "functionalize_log_like",
                ..
            })
        ));
        assert!(matches!(
            phylo.minimize_negloglike(&BasinHopping::default(), 0, 1),
            Err(ReconstructionError::NotReady {
                operation: "minimize_negloglike",
                ..
            })
        ));
    }

    #[test]
    fn reconstructs_the_star_tree_root() {
        let mut phylo = star_phylo();
        phylo
            .reconstruct_ancestral_shapes_ml(&MlOptions::default())
            .unwrap();

        let tree = phylo.tree();
        assert_eq!(tree.nancestral(), 1);
        let root = &tree[tree.root()];
        let vectors = root.vectors.as_ref().unwrap();
        assert_eq!(vectors.dim(), (3, 3));
        let vertices = root.vertices.as_ref().unwrap();
        assert_eq!(vertices.len(), 4);

        // Tips encode near 1, the root must land in the same range.
        for &v in vectors.iter() {
            assert!((0.5..2.0).contains(&v), "root component {v} out of range");
        }
    }

    #[test]
    fn reconstructs_every_internal_node_of_a_quartet() {
        let mut phylo = PhyloShape::new(
            quartet_tree(),
            quartet_alignment(),
            MotionModel::default(),
            None,
            None,
        )
        .unwrap();
        phylo
            .reconstruct_ancestral_shapes_ml(&MlOptions::default())
            .unwrap();

        let tree = phylo.tree();
        assert_eq!(tree.nancestral(), 3);
        for node_id in tree.ntips()..tree.nnodes() {
            let node = &tree[node_id];
            assert_eq!(node.vectors.as_ref().unwrap().dim(), (3, 3));
            assert_eq!(node.vertices.as_ref().unwrap().len(), 4);
        }
    }

    #[test]
    fn unpacked_layout_matches_the_declared_model() {
        let mut phylo = star_phylo();
        phylo.build_vv_translator(TranslatorMode::default(), 20, 5).unwrap();
        phylo.build_tip_vectors().unwrap();
        phylo.formularize_log_like(&natural_ln).unwrap();
        phylo.functionalize_log_like().unwrap();

        let shape = tip_vector_shape(phylo.tree()).unwrap();
        let nvals = shape.0 * shape.1;
        let nparams = phylo.model().parameters().len();
        let nvars = phylo.negloglike().unwrap().nvars();
        assert_eq!(nvars, nparams + phylo.tree().nancestral() * nvals);

        phylo
            .minimize_negloglike(&BasinHopping::default(), 42, 1)
            .unwrap();
        let tree = phylo.tree();
        for node_id in tree.ntips()..tree.nnodes() {
            assert_eq!(tree[node_id].vectors.as_ref().unwrap().dim(), shape);
        }
        assert_eq!(nparams, 1);
    }

    #[test]
    fn reconstruction_is_deterministic_under_a_fixed_seed() {
        let options = MlOptions {
            seed: 7,
            ..MlOptions::default()
        };

        let mut first = star_phylo();
        first.reconstruct_ancestral_shapes_ml(&options).unwrap();
        let mut second = star_phylo();
        second.reconstruct_ancestral_shapes_ml(&options).unwrap();

        let root = first.tree().root();
        let a = first.tree()[root].vectors.as_ref().unwrap();
        let b = second.tree()[root].vectors.as_ref().unwrap();
        assert_eq!(a, b);
        assert_eq!(
            first.tree()[root].vertices.as_ref().unwrap(),
            second.tree()[root].vertices.as_ref().unwrap()
        );
    }

    #[test]
    fn exhausted_attempts_fail_and_leave_the_tree_untouched() {
        let options = MlOptions {
            // An iteration cap of zero makes every local solve terminate
            // without convergence, so all attempts fail.
            algorithm: BasinHopping {
                inner_max_iters: 0,
                ..BasinHopping::default()
            },
            ..MlOptions::default()
        };

        let mut phylo = star_phylo();
        let err = phylo.reconstruct_ancestral_shapes_ml(&options).unwrap_err();
        assert_eq!(
            err,
            ReconstructionError::OptimizationExhausted {
                attempts: MAX_ATTEMPTS
            }
        );

        let tree = phylo.tree();
        for node_id in tree.ntips()..tree.nnodes() {
            assert!(tree[node_id].vectors.is_none());
            assert!(tree[node_id].vertices.is_none());
        }
    }

    #[test]
    fn paired_transforms_run_through_the_pipeline() {
        // A scale-halving projection with its exact inverse.
        let transform: VectTransform =
            Box::new(|vectors| vectors.iter().map(|v| v * 0.5).collect());
        let inverse: VectInverseTransform = Box::new(|vectors| vectors * 2.0);

        let mut phylo = PhyloShape::new(
            star_tree(),
            star_alignment(),
            MotionModel::default(),
            Some(transform),
            Some(inverse),
        )
        .unwrap();
        phylo
            .reconstruct_ancestral_shapes_ml(&MlOptions::default())
            .unwrap();

        let tree = phylo.tree();
        let root = &tree[tree.root()];
        // Vectors are stored in the transformed space, near 0.5.
        for &v in root.vectors.as_ref().unwrap().iter() {
            assert_relative_eq!(v, 0.5, max_relative = 0.5);
        }
        assert_eq!(root.vertices.as_ref().unwrap().len(), 4);
    }

    #[test]
    fn ml_options_serialization_round_trip() {
        let options = MlOptions::default();
        let restored: MlOptions =
            serde_json::from_str(&serde_json::to_string(&options).unwrap()).unwrap();
        assert_eq!(options, restored);
    }
}
