use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::prelude::*;
use rand::rngs::StdRng;
use tensorfg::tensor::{LogTensor, MarginalOp, Shape, Tensor, TensorBuilder};
use tensorfg::Error;

fn shape(dims: &[u32], sizes: &[usize]) -> Shape {
    Shape::new(dims.to_vec(), sizes.to_vec()).unwrap()
}

fn assert_tensors_eq(a: &Tensor, b: &Tensor) {
    assert_eq!(a.shape(), b.shape());
    for k in 0..a.shape().num_keys() {
        assert!(
            (a.value_at(k) - b.value_at(k)).abs() < 1e-9,
            "mismatch at key {}: {} vs {}",
            k,
            a.value_at(k),
            b.value_at(k)
        );
    }
}

/// Random tensor over `shape` with roughly `fill` of its keys nonzero.
/// Low fill keeps the builder's sparse representation.
fn random_tensor(shape: &Shape, fill: f64, rng: &mut StdRng) -> Tensor {
    let mut builder = TensorBuilder::new(shape.clone());
    for k in 0..shape.num_keys() {
        if rng.gen::<f64>() < fill {
            let key = shape.dim_key(k);
            builder.put(&key, rng.gen_range(0.1..10.0)).unwrap();
        }
    }
    builder.build()
}

#[test]
fn key_num_round_trip_exhaustive() {
    let shape = shape(&[0, 3, 7], &[4, 3, 5]);
    for k in 0..shape.num_keys() {
        assert_eq!(shape.key_num(&shape.dim_key(k)).unwrap(), k);
    }
}

#[test]
fn product_commutes_and_associates() {
    let mut rng = StdRng::seed_from_u64(11);
    let a = random_tensor(&shape(&[0, 1], &[3, 4]), 0.8, &mut rng);
    let b = random_tensor(&shape(&[1, 2], &[4, 2]), 0.8, &mut rng);
    let c = random_tensor(&shape(&[0, 2], &[3, 2]), 0.8, &mut rng);

    assert_tensors_eq(&a.product(&b).unwrap(), &b.product(&a).unwrap());
    let left = a.product(&b).unwrap().product(&c).unwrap();
    let right = a.product(&b.product(&c).unwrap()).unwrap();
    assert_tensors_eq(&left, &right);
}

#[test]
fn marginalize_preserves_grand_total() {
    let mut rng = StdRng::seed_from_u64(12);
    let t = random_tensor(&shape(&[0, 1, 2], &[3, 4, 5]), 0.5, &mut rng);
    let total = t.sum();
    for dims in [&[0u32][..], &[1, 2], &[0, 1, 2]] {
        let m = t.marginalize(dims, MarginalOp::Sum);
        assert!((m.sum() - total).abs() < 1e-9);
    }
    let scalar = t.marginalize(&[0, 1, 2], MarginalOp::Sum);
    assert_eq!(scalar.shape().rank(), 0);
    assert!((scalar.value_at(0) - total).abs() < 1e-9);
}

#[test]
fn max_marginal_picks_literal_maximum() {
    let t = Tensor::from_values(
        shape(&[0, 1], &[2, 3]),
        vec![1.0, 5.0, 2.0, 4.0, 0.0, 3.0],
    )
    .unwrap();
    let m = t.marginalize(&[1], MarginalOp::Max);
    assert_eq!(m.get(&[0]).unwrap(), 5.0);
    assert_eq!(m.get(&[1]).unwrap(), 4.0);
    let m0 = t.marginalize(&[0], MarginalOp::Max);
    assert_eq!(m0.get(&[0]).unwrap(), 4.0);
    assert_eq!(m0.get(&[1]).unwrap(), 5.0);
    assert_eq!(m0.get(&[2]).unwrap(), 3.0);
}

#[test]
fn sparse_and_dense_agree() {
    let mut rng = StdRng::seed_from_u64(13);
    // Large enough that a 5% fill stays sparse.
    let s = shape(&[0, 1, 2], &[8, 9, 10]);
    let sparse = random_tensor(&s, 0.05, &mut rng);
    assert!(sparse.is_sparse());
    let dense = sparse.to_dense();
    assert!(!dense.is_sparse());

    let other_sparse = random_tensor(&shape(&[1, 2], &[9, 10]), 0.05, &mut rng);
    let other_dense = other_sparse.to_dense();

    assert_tensors_eq(
        &sparse.product(&other_sparse).unwrap(),
        &dense.product(&other_dense).unwrap(),
    );
    assert_tensors_eq(
        &sparse.marginalize(&[1], MarginalOp::Sum),
        &dense.marginalize(&[1], MarginalOp::Sum),
    );
    assert_tensors_eq(
        &sparse.marginalize(&[0, 2], MarginalOp::Max),
        &dense.marginalize(&[0, 2], MarginalOp::Max),
    );
    assert_tensors_eq(
        &sparse.relabel(&[5, 1, 0]).unwrap(),
        &dense.relabel(&[5, 1, 0]).unwrap(),
    );
}

#[test]
fn relabel_round_trips() {
    let mut rng = StdRng::seed_from_u64(14);
    let t = random_tensor(&shape(&[0, 1, 2], &[3, 4, 5]), 0.6, &mut rng);
    let relabeled = t.relabel(&[2, 0, 1]).unwrap();
    assert_eq!(relabeled.shape().dims(), &[0, 1, 2]);
    assert_eq!(relabeled.shape().sizes(), &[4, 5, 3]);
    // Applying the inverse permutation restores the original.
    let back = relabeled.relabel(&[1, 2, 0]).unwrap();
    assert_tensors_eq(&back, &t);
}

#[test]
fn shape_mismatch_fails_fast() {
    let a = Tensor::from_values(shape(&[0, 1], &[2, 3]), vec![0.0; 6]).unwrap();
    let b = Tensor::from_values(shape(&[1], &[4]), vec![0.0; 4]).unwrap();
    assert!(matches!(
        a.product(&b),
        Err(Error::ShapeMismatch { dim: 1, .. })
    ));
    assert!(matches!(
        a.add(&b),
        Err(Error::ShapeMismatch { dim: 1, .. })
    ));
}

#[test]
fn slice_fixes_and_drops_dims() {
    let t = Tensor::from_values(
        shape(&[0, 1], &[2, 3]),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
    )
    .unwrap();
    let row = t.slice(&[0], &[1]).unwrap();
    assert_eq!(row.shape().dims(), &[1]);
    assert_eq!(row.get(&[0]).unwrap(), 4.0);
    assert_eq!(row.get(&[2]).unwrap(), 6.0);
    assert!(t.slice(&[5], &[0]).is_err());
    assert!(t.slice(&[0], &[2]).is_err());
}

#[test]
fn inner_and_outer_products() {
    let a = Tensor::from_values(shape(&[0, 1], &[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let v = Tensor::from_values(shape(&[1], &[2]), vec![5.0, 6.0]).unwrap();
    // Matrix-vector contraction over dim 1.
    let mv = a.inner_product(&v).unwrap();
    assert_eq!(mv.shape().dims(), &[0]);
    assert_eq!(mv.get(&[0]).unwrap(), 17.0);
    assert_eq!(mv.get(&[1]).unwrap(), 39.0);

    let w = Tensor::from_values(shape(&[2], &[2]), vec![1.0, 10.0]).unwrap();
    let outer = v.outer_product(&w).unwrap();
    assert_eq!(outer.shape().dims(), &[1, 2]);
    assert_eq!(outer.get(&[1, 1]).unwrap(), 60.0);
    assert!(matches!(
        v.outer_product(&v),
        Err(Error::DuplicateDimension(1))
    ));
}

#[test]
fn largest_entries_ranked_by_weight() {
    let t = Tensor::from_values(
        shape(&[0], &[5]),
        vec![0.5, 3.0, 0.0, 3.0, 1.0],
    )
    .unwrap();
    let top = t.largest_entries(3);
    assert_eq!(top, vec![(1, 3.0), (3, 3.0), (4, 1.0)]);
    assert_eq!(t.max_key_num(), 1);
}

#[test]
fn log_space_agrees_with_linear() {
    let mut rng = StdRng::seed_from_u64(15);
    let s = shape(&[0, 1], &[4, 6]);
    let a = random_tensor(&s, 0.7, &mut rng);
    let b = random_tensor(&s, 0.7, &mut rng);

    let log_product = LogTensor::from_linear(&a)
        .product(&LogTensor::from_linear(&b))
        .unwrap();
    assert_tensors_eq(&log_product.to_linear(), &a.product(&b).unwrap());

    let log_marginal = log_product.marginalize(&[1], MarginalOp::Sum).to_linear();
    let linear_marginal = a.product(&b).unwrap().marginalize(&[1], MarginalOp::Sum);
    assert_tensors_eq(&log_marginal, &linear_marginal);

    let log_max = log_product.marginalize(&[0], MarginalOp::Max).to_linear();
    let linear_max = a.product(&b).unwrap().marginalize(&[0], MarginalOp::Max);
    assert_tensors_eq(&log_max, &linear_max);
}

#[test]
fn dense_values_round_trip_through_ndarray() {
    let array = ndarray::ArrayD::random(ndarray::IxDyn(&[4, 5]), Uniform::new(0.1, 1.0));
    let values: Vec<f64> = array.iter().copied().collect();
    let t = Tensor::from_values(shape(&[0, 1], &[4, 5]), values).unwrap();
    for i in 0..4 {
        for j in 0..5 {
            assert_eq!(t.get(&[i, j]).unwrap(), array[[i, j]]);
        }
    }
    assert!((t.sum() - array.sum()).abs() < 1e-9);
}

#[test]
fn builder_representation_choice() {
    let s = shape(&[0, 1], &[40, 40]);
    let mut sparse_builder = TensorBuilder::new(s.clone());
    sparse_builder.put(&[3, 7], 1.0).unwrap();
    sparse_builder.put(&[20, 1], 2.0).unwrap();
    assert!(sparse_builder.build().is_sparse());

    let mut dense_builder = TensorBuilder::new(s);
    for i in 0..40 {
        for j in 0..40 {
            dense_builder.put(&[i, j], (i + j) as f64 + 1.0).unwrap();
        }
    }
    assert!(!dense_builder.build().is_sparse());
}
