pub mod check;
pub mod domain;
pub mod dual;
pub mod energy_operators;
pub mod error;
pub mod field;
pub mod float;
pub mod linearization;
pub mod model;
pub mod operator;
pub mod random;

#[cfg(feature = "nalgebra")]
pub mod nalgebra_support;
#[cfg(feature = "ndarray")]
pub mod ndarray_support;
#[cfg(feature = "serde")]
mod serde_support;

pub use check::{check_linear_operator, check_value_gradient_consistency};
pub use domain::{Domain, Space, SpaceKind};
pub use dual::Dual;
pub use energy_operators::{GaussianEnergy, StandardHamiltonian};
pub use error::{OperatorError, Result};
pub use field::Field;
pub use float::Float;
pub use linearization::Linearization;
pub use model::{ChainModel, LinearModel, Model, Pointwise, PointwiseFn, SumModel};
pub use operator::{
    BlockDiagonalOperator, Capability, ChainOperator, ContractionOperator, DenseOperator,
    DiagonalOperator, LinearMap, Mode, NullOperator, Operator, SandwichOperator,
    ScalingOperator, SumOperator, VdotOperator,
};
pub use random::RandomContext;

/// Type alias for fields over `f64`.
pub type Field64 = Field<f64>;
/// Type alias for fields over `f32`.
pub type Field32 = Field<f32>;
/// Type alias for operators over `f64`.
pub type Operator64 = Operator<f64>;
