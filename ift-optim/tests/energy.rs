//! Arithmetic on boxed energies and minimization of the resulting sums.

use std::sync::Arc;

use approx::assert_relative_eq;
use ift::{ChainModel, Domain, Field, GaussianEnergy, Model, Operator, Pointwise, PointwiseFn};
use ift_optim::{
    DescentMinimizer, Energy, EnergyAdapter, GradientNormConfig, GradientNormController,
    Minimizer, QuadraticEnergy, Status,
};

fn domain() -> Domain {
    Domain::unstructured(3)
}

/// `0.5 |x - m|²` with `m = (1, -1, 2)`, metric requested.
fn gaussian_at(x: &Field<f64>) -> Box<dyn Energy<f64>> {
    let mean = Field::new(domain(), vec![1.0, -1.0, 2.0]).unwrap();
    let model: Arc<dyn Model<f64>> =
        Arc::new(GaussianEnergy::new(domain(), Some(mean), None).unwrap());
    Box::new(EnergyAdapter::new(x.clone(), model, true).unwrap())
}

/// `0.5 x^† diag(1, 2, 3) x - <1, x>`.
fn quadratic_at(x: &Field<f64>) -> Box<dyn Energy<f64>> {
    let a = Operator::diagonal(Field::new(domain(), vec![1.0, 2.0, 3.0]).unwrap());
    let b = Field::full(domain(), 1.0);
    Box::new(QuadraticEnergy::new(x.clone(), a, Some(b)).unwrap())
}

fn point() -> Field<f64> {
    Field::new(domain(), vec![0.5, 0.25, -1.0]).unwrap()
}

// ══════════════════════════════════════════════
//  Sums
// ══════════════════════════════════════════════

#[test]
fn sum_adds_values_and_gradients() {
    let x = point();
    let (v1, g1) = {
        let e = gaussian_at(&x);
        (e.value().unwrap(), e.gradient().unwrap())
    };
    let (v2, g2) = {
        let e = quadratic_at(&x);
        (e.value().unwrap(), e.gradient().unwrap())
    };
    let sum = (gaussian_at(&x) + quadratic_at(&x)).unwrap();
    assert_relative_eq!(sum.value().unwrap(), v1 + v2, epsilon = 1e-14);
    let g = sum.gradient().unwrap();
    for ((a, b), c) in g.values().iter().zip(g1.values()).zip(g2.values()) {
        assert_relative_eq!(*a, b + c, epsilon = 1e-14);
    }
}

#[test]
fn scaled_difference() {
    let x = point();
    let v1 = gaussian_at(&x).value().unwrap();
    let v2 = quadratic_at(&x).value().unwrap();
    let e = (gaussian_at(&x) * 3.0 - quadratic_at(&x)).unwrap();
    assert_relative_eq!(e.value().unwrap(), 3.0 * v1 - v2, epsilon = 1e-14);
    let n = -e;
    assert_relative_eq!(n.value().unwrap(), v2 - 3.0 * v1, epsilon = 1e-14);
}

#[test]
fn sum_jumps_every_term() {
    let x = point();
    let y = Field::new(domain(), vec![2.0, 0.0, 1.0]).unwrap();
    let sum = (gaussian_at(&x) + quadratic_at(&x)).unwrap();
    let moved = sum.at(y.clone()).unwrap();
    assert_eq!(moved.position(), &y);
    let expected = gaussian_at(&y).value().unwrap() + quadratic_at(&y).value().unwrap();
    assert_relative_eq!(moved.value().unwrap(), expected, epsilon = 1e-14);
    // the original snapshot is untouched
    assert_eq!(sum.position(), &x);
}

#[test]
fn sum_metric_adds_metrics() {
    let x = point();
    let sum = (gaussian_at(&x) + quadratic_at(&x)).unwrap();
    let v = Field::full(domain(), 1.0);
    assert_eq!(sum.apply_metric(&v).unwrap().values(), &[2.0, 3.0, 4.0]);
}

#[test]
fn terms_at_different_positions_do_not_add() {
    let a = gaussian_at(&point());
    let b = quadratic_at(&Field::zeros(domain()));
    assert!((a + b).is_err());
}

// ══════════════════════════════════════════════
//  Minimization
// ══════════════════════════════════════════════

#[test]
fn newton_cg_minimizes_sum() {
    // Gradient (x - m) + (A x - 1) = 0  =>  x = (m + 1) / (1 + diag(A)).
    let x0 = Field::zeros(domain());
    let sum = (gaussian_at(&x0) + quadratic_at(&x0)).unwrap();
    let controller = GradientNormController::new(GradientNormConfig {
        tol_abs: Some(1e-10),
        iteration_limit: Some(50),
        ..Default::default()
    });
    let mut minimizer = DescentMinimizer::newton_cg(Box::new(controller));
    let result = minimizer.minimize(sum).unwrap();
    assert_eq!(result.status, Status::Converged);
    let expected = [1.0, 0.0, 0.75];
    for (got, want) in result.position().values().iter().zip(expected) {
        assert_relative_eq!(*got, want, epsilon = 1e-8);
    }
}

#[test]
fn nan_value_is_reported_as_infinity() {
    // 0.5 ln(x)² is NaN for negative x.
    let d = Domain::unstructured(1);
    let model: Arc<dyn Model<f64>> = Arc::new(
        ChainModel::new(vec![
            Arc::new(GaussianEnergy::standard(d.clone())) as Arc<dyn Model<f64>>,
            Arc::new(Pointwise::new(d.clone(), PointwiseFn::Ln)),
        ])
        .unwrap(),
    );
    let far = Field::new(d.clone(), vec![-1.0]).unwrap();
    let plain = EnergyAdapter::new(far.clone(), model.clone(), false).unwrap();
    assert!(plain.value().unwrap().is_nan());
    let guarded = EnergyAdapter::new(far, model, false).unwrap().nan_is_inf(true);
    assert_eq!(guarded.value().unwrap(), f64::INFINITY);
}
