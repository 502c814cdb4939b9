use criterion::{Criterion, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use phyloshape::symbolic::natural_ln;
use phyloshape::{MlOptions, MotionModel, PhyloShape, ShapeAlignment, Tree, Vertices};
use rand::prelude::*;
use std::hint::black_box;

const NVERTICES: usize = 20;

fn quartet_tree() -> Tree {
    Tree::from_parents(
        vec![
            "a".into(),
            "b".into(),
            "c".into(),
            "d".into(),
            "n4".into(),
            "n5".into(),
            "root".into(),
        ],
        vec![Some(4), Some(4), Some(5), Some(5), Some(6), Some(6), None],
        vec![1.0, 1.0, 1.0, 1.0, 0.5, 0.5, 0.0],
    )
    .unwrap()
}

fn random_shape(rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_fn((NVERTICES, 3), |(i, axis)| {
        (i * (axis + 1)) as f64 * 0.7 + 0.1 * rng.random::<f64>()
    })
}

fn quartet_phylo() -> PhyloShape {
    let mut rng = StdRng::seed_from_u64(0);
    let alignment = ShapeAlignment::new(
        ["a", "b", "c", "d"]
            .into_iter()
            .map(|label| {
                (
                    label.to_string(),
                    Vertices::new(random_shape(&mut rng)).unwrap(),
                )
            })
            .collect(),
    )
    .unwrap();
    PhyloShape::new(quartet_tree(), alignment, MotionModel::default(), None, None).unwrap()
}

fn bench_translator(c: &mut Criterion) {
    let mut phylo = quartet_phylo();
    let options = MlOptions::default();
    phylo
        .build_vv_translator(options.mode, options.num_anchors, options.num_refine_iter)
        .unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let shape = random_shape(&mut rng);
    let translator = phylo.translator().unwrap();

    c.bench_function("to_vectors", |b| {
        b.iter(|| black_box(translator.to_vectors(shape.view()).unwrap()))
    });
    let vectors = translator.to_vectors(shape.view()).unwrap();
    c.bench_function("to_vertices", |b| {
        b.iter(|| black_box(translator.to_vertices(vectors.view()).unwrap()))
    });
}

fn bench_likelihood(c: &mut Criterion) {
    let mut phylo = quartet_phylo();
    let options = MlOptions::default();
    phylo
        .build_vv_translator(options.mode, options.num_anchors, options.num_refine_iter)
        .unwrap();
    phylo.build_tip_vectors().unwrap();

    c.bench_function("formularize_and_compile", |b| {
        b.iter(|| {
            phylo.formularize_log_like(&natural_ln).unwrap();
            phylo.functionalize_log_like().unwrap();
        })
    });

    phylo.formularize_log_like(&natural_ln).unwrap();
    phylo.functionalize_log_like().unwrap();
    let tape = phylo.negloglike().unwrap();
    let x = Array1::from_elem(tape.nvars(), 1.01);

    c.bench_function("negloglike_value", |b| {
        b.iter(|| black_box(tape.value(x.view())))
    });
    c.bench_function("negloglike_value_and_grad", |b| {
        b.iter(|| black_box(tape.value_and_grad(x.view())))
    });
}

criterion_group!(benches, bench_translator, bench_likelihood);
criterion_main!(benches);
