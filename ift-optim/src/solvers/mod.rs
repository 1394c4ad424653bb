pub mod descent;
pub mod lbfgs;
pub mod newton;

use ift::{Float, Result};

use crate::energy::Energy;
use crate::result::MinimizationResult;

/// Anything that minimizes an [`Energy`] from a starting snapshot.
pub trait Minimizer<F: Float> {
    fn minimize(&mut self, energy: Box<dyn Energy<F>>) -> Result<MinimizationResult<F>>;
}
