//! Metric Gaussian variational inference on a linear Gaussian problem,
//! where the optimal mean is the Wiener filter solution.

use std::sync::Arc;

use ift::{
    ChainModel, Domain, Field, GaussianEnergy, LinearModel, Model, Operator, RandomContext,
    StandardHamiltonian,
};
use ift_optim::{
    DescentMinimizer, Energy, GradientNormConfig, GradientNormController, KlConfig,
    MetricGaussianKl, Minimizer, Status,
};

/// Diagonal response `R = diag(1, 2, 0.5)`, noise `N^{-1} = diag(4, 1, 2)`
/// and data `(1, -1, 2)`; the posterior mean is `(0.8, -0.4, 4/3)`.
fn hamiltonian() -> Arc<dyn Model<f64>> {
    let d = Domain::unstructured(3);
    let r = Operator::diagonal(Field::new(d.clone(), vec![1.0, 2.0, 0.5]).unwrap());
    let data = Field::new(d.clone(), vec![1.0, -1.0, 2.0]).unwrap();
    let n_inv = Operator::diagonal(Field::new(d.clone(), vec![4.0, 1.0, 2.0]).unwrap());
    let lh = GaussianEnergy::new(d, Some(data), Some(n_inv)).unwrap();
    let chain = ChainModel::new(vec![
        Arc::new(lh) as Arc<dyn Model<f64>>,
        Arc::new(LinearModel::new(r)),
    ])
    .unwrap();
    Arc::new(StandardHamiltonian::new(Arc::new(chain)).unwrap())
}

const POSTERIOR_MEAN: [f64; 3] = [0.8, -0.4, 4.0 / 3.0];
const POSTERIOR_VARIANCE: [f64; 3] = [0.2, 0.2, 1.0 / 1.5];

#[test]
fn mgvi_finds_wiener_filter_mean() {
    let h = hamiltonian();
    let mut context = RandomContext::new(42);
    let mut mean = Field::zeros(h.domain().clone());

    for _ in 0..3 {
        let kl = MetricGaussianKl::new(mean, h.clone(), KlConfig::default(), &mut context).unwrap();
        let controller = GradientNormController::new(GradientNormConfig {
            tol_abs: Some(1e-10),
            iteration_limit: Some(20),
            ..Default::default()
        });
        let mut minimizer = DescentMinimizer::newton_cg(Box::new(controller));
        let result = minimizer.minimize(Box::new(kl)).unwrap();
        assert!(result.status.is_usable(), "status {}", result.status);
        mean = result.position().clone();
    }

    for (got, want) in mean.values().iter().zip(POSTERIOR_MEAN) {
        assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
    }
}

#[test]
fn kl_gradient_vanishes_at_posterior_mean() {
    let h = hamiltonian();
    let mut context = RandomContext::new(1);
    let mean = Field::new(h.domain().clone(), POSTERIOR_MEAN.to_vec()).unwrap();
    let kl = MetricGaussianKl::new(mean, h, KlConfig::default(), &mut context).unwrap();
    assert!(kl.gradient_norm().unwrap() < 1e-8);
}

#[test]
fn sample_variance_approaches_posterior_variance() {
    let h = hamiltonian();
    let mut context = RandomContext::new(9);
    let mean = Field::new(h.domain().clone(), POSTERIOR_MEAN.to_vec()).unwrap();
    let config = KlConfig {
        n_samples: 2000,
        ..KlConfig::default()
    };
    let kl = MetricGaussianKl::new(mean, h, config, &mut context).unwrap();
    let (m, v) = kl.samples().sample_stat(|s| Ok(s.clone())).unwrap();
    for (got, want) in m.values().iter().zip(POSTERIOR_MEAN) {
        assert!((got - want).abs() < 1e-10);
    }
    for (got, want) in v.values().iter().zip(POSTERIOR_VARIANCE) {
        assert!((got - want).abs() < 0.1 * want, "got {got}, want {want}");
    }
}

#[test]
fn resampling_moves_the_samples() {
    let h = hamiltonian();
    let mut context = RandomContext::new(4);
    let mean = Field::zeros(h.domain().clone());
    let kl = MetricGaussianKl::new(mean, h, KlConfig::default(), &mut context).unwrap();
    let shifted = Field::full(kl.position().domain().clone(), 1.0);
    let moved = kl.resample_at(shifted.clone(), &mut context).unwrap();
    assert_eq!(moved.position(), &shifted);
    assert_eq!(moved.samples().len(), kl.samples().len());
}
