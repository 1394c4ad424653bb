#![cfg(feature = "nalgebra")]

use ift::nalgebra_support::{
    dense_from_dmatrix, dense_to_dmatrix, field_from_dvector, field_to_dvector,
};
use ift::{Domain, Field, Operator};
use nalgebra::{DMatrix, DVector};

#[test]
fn field_round_trips_through_dvector() {
    let f = Field::new(Domain::unstructured(3), vec![1.0_f64, -2.0, 0.5]).unwrap();
    let v = field_to_dvector(&f);
    assert_eq!(v.len(), 3);
    assert_eq!(field_from_dvector(f.domain().clone(), &v).unwrap(), f);
}

#[test]
fn dense_operator_agrees_with_nalgebra() {
    let m = DMatrix::from_row_slice(2, 3, &[1.0_f64, 2.0, 0.0, 0.0, -1.0, 3.0]);
    let dense = dense_from_dmatrix(Domain::unstructured(3), Domain::unstructured(2), &m).unwrap();
    assert_eq!(dense_to_dmatrix(&dense), m);

    let op: Operator<f64> = dense.into();
    let x = DVector::from_vec(vec![1.0, 1.0, 2.0]);
    let y = op
        .times(&field_from_dvector(Domain::unstructured(3), &x).unwrap())
        .unwrap();
    assert_eq!(field_to_dvector(&y), &m * &x);

    let w = DVector::from_vec(vec![1.0, -1.0]);
    let z = op
        .adjoint_times(&field_from_dvector(Domain::unstructured(2), &w).unwrap())
        .unwrap();
    assert_eq!(field_to_dvector(&z), m.transpose() * &w);
}

#[test]
fn wrong_matrix_shape_is_rejected() {
    let m = DMatrix::<f64>::zeros(3, 3);
    assert!(dense_from_dmatrix(Domain::unstructured(3), Domain::unstructured(2), &m).is_err());
}
