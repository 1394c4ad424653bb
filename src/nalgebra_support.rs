//! nalgebra adapters for fields and dense operators.

use nalgebra::{DMatrix, DVector};

use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;
use crate::operator::DenseOperator;

/// Flat values of `field` as a column vector.
pub fn field_to_dvector<F: Float>(field: &Field<F>) -> DVector<F> {
    DVector::from_column_slice(field.values())
}

pub fn field_from_dvector<F: Float>(domain: Domain, v: &DVector<F>) -> Result<Field<F>> {
    Field::new(domain, v.as_slice().to_vec())
}

/// Dense operator from a `target.size() × domain.size()` matrix.
pub fn dense_from_dmatrix<F: Float>(
    domain: Domain,
    target: Domain,
    m: &DMatrix<F>,
) -> Result<DenseOperator<F>> {
    if m.shape() != (target.size(), domain.size()) {
        return Err(OperatorError::Construction(format!(
            "matrix of shape {:?} does not map {domain} to {target}",
            m.shape()
        )));
    }
    // nalgebra stores column-major; the operator wants rows.
    let rows: Vec<F> = m.transpose().as_slice().to_vec();
    DenseOperator::new(domain, target, rows)
}

pub fn dense_to_dmatrix<F: Float>(op: &DenseOperator<F>) -> DMatrix<F> {
    DMatrix::from_row_slice(op.rows(), op.cols(), op.matrix())
}
