//! Minimizers on quadratics and on the Rosenbrock function.

use std::ops::ControlFlow;

use ift::{DenseOperator, Domain, Field, Operator, Result};
use ift_optim::{
    steepest_descent, AbsDeltaEnergyController, ArmijoParams, ConjugateGradient,
    DeltaEnergyConfig, DescentMinimizer, Energy, GradientNormConfig, GradientNormController,
    IterationController, LbfgsConfig, LineSearch, Minimizer, QuadraticEnergy, Status,
};

fn gradient_controller(tol: f64, limit: usize) -> Box<dyn IterationController<f64>> {
    Box::new(GradientNormController::new(GradientNormConfig {
        tol_abs: Some(tol),
        iteration_limit: Some(limit),
        ..Default::default()
    }))
}

/// `0.5 x^† A x - b^† x` with `A = diag(1, 2, 4, 8)` and `b = 1`.
fn diagonal_quadratic() -> Box<dyn Energy<f64>> {
    let d = Domain::unstructured(4);
    let a = Operator::diagonal(Field::new(d.clone(), vec![1.0, 2.0, 4.0, 8.0]).unwrap());
    let b = Field::full(d.clone(), 1.0);
    Box::new(QuadraticEnergy::new(Field::zeros(d), a, Some(b)).unwrap())
}

fn assert_at_solution(x: &Field<f64>, tol: f64) {
    let expected = [1.0, 0.5, 0.25, 0.125];
    for (got, want) in x.values().iter().zip(expected) {
        assert!((got - want).abs() < tol, "got {got}, want {want}");
    }
}

// ══════════════════════════════════════════════
//  Quadratic problems
// ══════════════════════════════════════════════

#[test]
fn steepest_descent_solves_quadratic() {
    let mut minimizer = steepest_descent(gradient_controller(1e-8, 500));
    let result = minimizer.minimize(diagonal_quadratic()).unwrap();
    assert_eq!(result.status, Status::Converged);
    assert_at_solution(result.position(), 1e-6);
}

#[test]
fn steepest_descent_with_armijo_solves_quadratic() {
    let mut minimizer = steepest_descent(gradient_controller(1e-8, 2000))
        .with_line_search(LineSearch::Armijo(ArmijoParams::default()));
    let result = minimizer.minimize(diagonal_quadratic()).unwrap();
    assert_eq!(result.status, Status::Converged);
    assert_at_solution(result.position(), 1e-6);
}

#[test]
fn lbfgs_solves_quadratic() {
    let mut minimizer =
        DescentMinimizer::lbfgs(gradient_controller(1e-10, 100), LbfgsConfig::default());
    let result = minimizer.minimize(diagonal_quadratic()).unwrap();
    assert_eq!(result.status, Status::Converged);
    assert_at_solution(result.position(), 1e-8);
    assert!(result.iterations < 30, "took {} iterations", result.iterations);
}

#[test]
fn newton_cg_solves_quadratic() {
    let mut minimizer = DescentMinimizer::newton_cg(gradient_controller(1e-8, 100));
    let result = minimizer.minimize(diagonal_quadratic()).unwrap();
    assert_eq!(result.status, Status::Converged);
    assert_at_solution(result.position(), 1e-5);
}

#[test]
fn relaxed_newton_takes_one_step() {
    let mut minimizer = DescentMinimizer::relaxed_newton(gradient_controller(1e-10, 10));
    let result = minimizer.minimize(diagonal_quadratic()).unwrap();
    assert_eq!(result.status, Status::Converged);
    assert_eq!(result.iterations, 1);
    assert_at_solution(result.position(), 1e-12);
}

#[test]
fn conjugate_gradient_as_minimizer() {
    let mut cg = ConjugateGradient::new(gradient_controller(1e-12, 10));
    let result = cg.minimize(diagonal_quadratic()).unwrap();
    assert_eq!(result.status, Status::Converged);
    assert!(result.iterations <= 4);
    assert_at_solution(result.position(), 1e-10);
}

#[test]
fn energy_change_controller_stops_lbfgs() {
    let controller = AbsDeltaEnergyController::new(DeltaEnergyConfig {
        tol: 1e-14,
        convergence_level: 2,
        iteration_limit: Some(200),
    });
    let mut minimizer = DescentMinimizer::lbfgs(Box::new(controller), LbfgsConfig::default());
    let result = minimizer.minimize(diagonal_quadratic()).unwrap();
    assert_eq!(result.status, Status::Converged);
    assert_at_solution(result.position(), 1e-5);
}

// ══════════════════════════════════════════════
//  Failure modes and control
// ══════════════════════════════════════════════

#[test]
fn newton_cg_reports_indefinite_metric() {
    let d = Domain::unstructured(2);
    let a = Operator::diagonal(Field::new(d.clone(), vec![1.0, -2.0]).unwrap());
    let b = Field::full(d.clone(), 1.0);
    let energy = QuadraticEnergy::new(Field::zeros(d), a, Some(b)).unwrap();
    let mut minimizer = DescentMinimizer::newton_cg(gradient_controller(1e-8, 100));
    let result = minimizer.minimize(Box::new(energy)).unwrap();
    assert_eq!(result.status, Status::Error);
    assert!(!result.status.is_usable());
}

#[test]
fn iteration_limit_is_reported() {
    let mut minimizer = steepest_descent(gradient_controller(1e-30, 2));
    let result = minimizer.minimize(diagonal_quadratic()).unwrap();
    assert_eq!(result.status, Status::IterationLimit);
    assert_eq!(result.iterations, 2);
}

#[test]
fn callback_aborts_minimization() {
    let mut minimizer = steepest_descent(gradient_controller(1e-30, 100)).with_callback(
        |_energy: &dyn Energy<f64>, iteration| {
            if iteration >= 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        },
    );
    let result = minimizer.minimize(diagonal_quadratic()).unwrap();
    assert_eq!(result.status, Status::Aborted);
    assert_eq!(result.iterations, 3);
}

#[test]
fn already_converged_start_is_returned() {
    let d = Domain::unstructured(2);
    let a = Operator::identity(d.clone());
    let energy = QuadraticEnergy::new(Field::zeros(d), a, None).unwrap();
    let mut minimizer = steepest_descent(gradient_controller(1e-8, 100));
    let result = minimizer.minimize(Box::new(energy)).unwrap();
    assert_eq!(result.status, Status::Converged);
    assert_eq!(result.iterations, 0);
}

// ══════════════════════════════════════════════
//  Rosenbrock
// ══════════════════════════════════════════════

/// `(1 - x)² + 100 (y - x²)²` with its exact Hessian as metric.
#[derive(Debug)]
struct Rosenbrock {
    position: Field<f64>,
}

impl Rosenbrock {
    fn new(x: f64, y: f64) -> Self {
        Rosenbrock {
            position: Field::new(Domain::unstructured(2), vec![x, y]).unwrap(),
        }
    }

    fn xy(&self) -> (f64, f64) {
        (self.position.values()[0], self.position.values()[1])
    }
}

impl Energy<f64> for Rosenbrock {
    fn position(&self) -> &Field<f64> {
        &self.position
    }

    fn at(&self, position: Field<f64>) -> Result<Box<dyn Energy<f64>>> {
        Ok(Box::new(Rosenbrock { position }))
    }

    fn value(&self) -> Result<f64> {
        let (x, y) = self.xy();
        Ok((1.0 - x).powi(2) + 100.0 * (y - x * x).powi(2))
    }

    fn gradient(&self) -> Result<Field<f64>> {
        let (x, y) = self.xy();
        let t = y - x * x;
        Field::new(
            self.position.domain().clone(),
            vec![-2.0 * (1.0 - x) - 400.0 * x * t, 200.0 * t],
        )
    }

    fn metric(&self) -> Result<Operator<f64>> {
        let (x, y) = self.xy();
        let hxx = 2.0 - 400.0 * (y - x * x) + 800.0 * x * x;
        let hxy = -400.0 * x;
        let d = self.position.domain().clone();
        Ok(DenseOperator::new(d.clone(), d, vec![hxx, hxy, hxy, 200.0])?.into())
    }
}

#[test]
fn lbfgs_minimizes_rosenbrock() {
    let mut minimizer =
        DescentMinimizer::lbfgs(gradient_controller(1e-8, 1000), LbfgsConfig::default());
    let result = minimizer.minimize(Box::new(Rosenbrock::new(-1.2, 1.0))).unwrap();
    assert_eq!(result.status, Status::Converged);
    let x = result.position().values();
    assert!((x[0] - 1.0).abs() < 1e-5, "x = {x:?}");
    assert!((x[1] - 1.0).abs() < 1e-5, "x = {x:?}");
}

#[test]
fn newton_cg_minimizes_rosenbrock_near_optimum() {
    // The Hessian is positive definite in this neighbourhood.
    let mut minimizer = DescentMinimizer::newton_cg(gradient_controller(1e-8, 200));
    let result = minimizer.minimize(Box::new(Rosenbrock::new(1.1, 1.2))).unwrap();
    assert_eq!(result.status, Status::Converged);
    let x = result.position().values();
    assert!((x[0] - 1.0).abs() < 1e-5, "x = {x:?}");
    assert!((x[1] - 1.0).abs() < 1e-5, "x = {x:?}");
}
