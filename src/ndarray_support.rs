//! ndarray adapters for fields and dense operators.

use ndarray::{Array2, ArrayD, ArrayViewD, IxDyn};

use crate::domain::Domain;
use crate::error::{OperatorError, Result};
use crate::field::Field;
use crate::float::Float;
use crate::operator::DenseOperator;

/// Values of `field` shaped like its domain (a multi-field is flat).
pub fn field_to_ndarray<F: Float>(field: &Field<F>) -> Result<ArrayD<F>> {
    ArrayD::from_shape_vec(IxDyn(&field.domain().shape()), field.to_vec())
        .map_err(|e| OperatorError::Construction(e.to_string()))
}

/// Field on `domain` from an array of the domain's shape, read in logical
/// (row-major) order.
pub fn field_from_ndarray<F: Float>(domain: Domain, array: ArrayViewD<'_, F>) -> Result<Field<F>> {
    if array.shape() != domain.shape().as_slice() {
        return Err(OperatorError::Construction(format!(
            "array of shape {:?} does not fit {domain}",
            array.shape()
        )));
    }
    Field::new(domain, array.iter().copied().collect())
}

/// Dense operator from a `target.size() × domain.size()` matrix.
pub fn dense_from_ndarray<F: Float>(
    domain: Domain,
    target: Domain,
    matrix: &Array2<F>,
) -> Result<DenseOperator<F>> {
    if matrix.dim() != (target.size(), domain.size()) {
        return Err(OperatorError::Construction(format!(
            "matrix of shape {:?} does not map {domain} to {target}",
            matrix.dim()
        )));
    }
    DenseOperator::new(domain, target, matrix.iter().copied().collect())
}

pub fn dense_to_ndarray<F: Float>(op: &DenseOperator<F>) -> Result<Array2<F>> {
    Array2::from_shape_vec((op.rows(), op.cols()), op.matrix().to_vec())
        .map_err(|e| OperatorError::Construction(e.to_string()))
}
