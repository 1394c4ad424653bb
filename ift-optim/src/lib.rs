pub mod adapter;
pub mod conjugate_gradient;
pub mod energy;
pub mod inversion_enabler;
pub mod iteration_controller;
pub mod kl;
pub mod line_search;
pub mod quadratic;
pub mod result;
pub mod solvers;

pub use adapter::EnergyAdapter;
pub use conjugate_gradient::ConjugateGradient;
pub use energy::{Energy, EnergySum, Memo};
pub use inversion_enabler::InversionEnabler;
pub use iteration_controller::{
    AbsDeltaEnergyController, DeltaEnergyConfig, DeltaEnergyController, GradInfNormController,
    GradientNormConfig, GradientNormController, IterationController, StepSizeController,
};
pub use kl::{KlConfig, MetricGaussianKl, SampleList};
pub use line_search::{
    backtracking_armijo, strong_wolfe, ArmijoParams, LineEnergy, LineSearch, LineSearchResult,
    StrongWolfeParams,
};
pub use quadratic::QuadraticEnergy;
pub use result::{MinimizationResult, Status};
pub use solvers::descent::{
    steepest_descent, Callback, DescentDirection, DescentMinimizer, SteepestDescent,
};
pub use solvers::lbfgs::{Lbfgs, LbfgsConfig};
pub use solvers::newton::{NewtonCg, NewtonCgConfig, RelaxedNewton};
pub use solvers::Minimizer;
