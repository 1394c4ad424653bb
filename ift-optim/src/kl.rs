//! Metric Gaussian variational inference.
//!
//! The posterior is approximated by a Gaussian around a mean whose
//! covariance is the inverse metric of the Hamiltonian at that mean. The KL
//! divergence to the true posterior is estimated with residual samples
//! drawn from that Gaussian and minimized with respect to the mean only.

use std::sync::Arc;

use log::debug;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use ift::{
    Field, Float, Model, Operator, OperatorError, RandomContext, Result, SumOperator,
};

use crate::energy::{Energy, Memo};
use crate::inversion_enabler::InversionEnabler;
use crate::iteration_controller::{GradientNormConfig, GradientNormController};

/// Configuration of a [`MetricGaussianKl`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KlConfig<F> {
    /// Number of independent residual draws (default: 5).
    pub n_samples: usize,
    /// Also use the negated residual of every draw (default: true).
    pub mirror_samples: bool,
    /// Stopping rule of the CG solves that turn metric samples into
    /// inverse-metric samples (default: `|r| <= 1e-8`, at most 250
    /// iterations).
    pub sampling: GradientNormConfig<F>,
}

impl Default for KlConfig<f64> {
    fn default() -> Self {
        KlConfig {
            n_samples: 5,
            mirror_samples: true,
            sampling: GradientNormConfig {
                tol_abs: Some(1e-8),
                iteration_limit: Some(250),
                ..GradientNormConfig::default()
            },
        }
    }
}

impl Default for KlConfig<f32> {
    fn default() -> Self {
        KlConfig {
            n_samples: 5,
            mirror_samples: true,
            sampling: GradientNormConfig {
                tol_abs: Some(1e-4),
                iteration_limit: Some(250),
                ..GradientNormConfig::default()
            },
        }
    }
}

/// A mean together with residuals; sample `i` is `mean ± residual_i`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleList<F: Float> {
    mean: Field<F>,
    residuals: Vec<Field<F>>,
    neg: Vec<bool>,
}

impl<F: Float> SampleList<F> {
    pub fn new(mean: Field<F>, residuals: Vec<Field<F>>, neg: Vec<bool>) -> Result<Self> {
        if residuals.len() != neg.len() {
            return Err(OperatorError::Construction(format!(
                "{} residuals but {} signs",
                residuals.len(),
                neg.len()
            )));
        }
        if let Some(r) = residuals.iter().find(|r| r.domain() != mean.domain()) {
            return Err(OperatorError::mismatch(mean.domain(), r.domain()));
        }
        Ok(SampleList {
            mean,
            residuals,
            neg,
        })
    }

    pub fn len(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residuals.is_empty()
    }

    pub fn mean(&self) -> &Field<F> {
        &self.mean
    }

    /// Residuals with their sign flags.
    pub fn residuals(&self) -> impl Iterator<Item = (&Field<F>, bool)> {
        self.residuals.iter().zip(self.neg.iter().copied())
    }

    pub fn get(&self, i: usize) -> Option<Field<F>> {
        let r = self.residuals.get(i)?;
        Some(if self.neg[i] {
            &self.mean - r
        } else {
            &self.mean + r
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Field<F>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Same residuals around another mean.
    pub fn at(&self, mean: Field<F>) -> Result<Self> {
        Self::new(mean, self.residuals.clone(), self.neg.clone())
    }

    /// Average of `op` over the samples.
    pub fn average(&self, op: impl Fn(&Field<F>) -> Result<Field<F>>) -> Result<Field<F>> {
        Ok(self.sample_stat(op)?.0)
    }

    /// Sample mean and unbiased sample variance of `op` over the samples
    /// (Welford's algorithm). A single sample has zero variance.
    pub fn sample_stat(
        &self,
        op: impl Fn(&Field<F>) -> Result<Field<F>>,
    ) -> Result<(Field<F>, Field<F>)> {
        let mut samples = self.iter();
        let first = match samples.next() {
            Some(s) => op(&s)?,
            None => {
                return Err(OperatorError::Unavailable(
                    "statistics of an empty sample list".into(),
                ))
            }
        };
        let mut mean = first.clone();
        let mut m2 = Field::zeros(first.domain().clone());
        let mut count = F::one();
        for s in samples {
            let x = op(&s)?;
            count = count + F::one();
            let delta = &x - &mean;
            mean = mean.add_scaled(count.recip(), &delta);
            m2 = m2 + &delta * &(&x - &mean);
        }
        let var = if count > F::one() {
            m2 / (count - F::one())
        } else {
            m2
        };
        Ok((mean, var))
    }
}

/// Sampled estimate of the KL divergence between the MGVI Gaussian at the
/// mean and the posterior defined by `hamiltonian` (up to a constant).
///
/// `value`, `gradient` and `metric` are averages of the Hamiltonian's over
/// the samples. [`Energy::at`] keeps the residuals;
/// [`resample_at`](Self::resample_at) draws new ones.
#[derive(Debug)]
pub struct MetricGaussianKl<F: Float> {
    hamiltonian: Arc<dyn Model<F>>,
    samples: SampleList<F>,
    config: KlConfig<F>,
    value_gradient: Memo<(F, Field<F>)>,
    metric: Memo<Operator<F>>,
}

impl<F: Float> MetricGaussianKl<F> {
    /// Draw residuals at `mean` and build the energy there.
    ///
    /// `hamiltonian` must be scalar-valued and attach a metric (e.g. a
    /// `StandardHamiltonian`).
    pub fn new(
        mean: Field<F>,
        hamiltonian: Arc<dyn Model<F>>,
        config: KlConfig<F>,
        context: &mut RandomContext,
    ) -> Result<Self> {
        let samples = draw_samples(&mean, hamiltonian.as_ref(), &config, context)?;
        Self::from_samples(hamiltonian, samples, config)
    }

    /// Build the energy from residuals drawn earlier.
    pub fn from_samples(
        hamiltonian: Arc<dyn Model<F>>,
        samples: SampleList<F>,
        config: KlConfig<F>,
    ) -> Result<Self> {
        if !hamiltonian.target().is_scalar() {
            return Err(OperatorError::Construction(format!(
                "Hamiltonian target {} is not scalar",
                hamiltonian.target()
            )));
        }
        if samples.mean().domain() != hamiltonian.domain() {
            return Err(OperatorError::mismatch(
                hamiltonian.domain(),
                samples.mean().domain(),
            ));
        }
        if samples.is_empty() {
            return Err(OperatorError::Construction(
                "MGVI needs at least one sample".into(),
            ));
        }
        Ok(MetricGaussianKl {
            hamiltonian,
            samples,
            config,
            value_gradient: Memo::new(),
            metric: Memo::new(),
        })
    }

    pub fn samples(&self) -> &SampleList<F> {
        &self.samples
    }

    pub fn config(&self) -> &KlConfig<F> {
        &self.config
    }

    /// The energy at `mean` with freshly drawn residuals.
    pub fn resample_at(&self, mean: Field<F>, context: &mut RandomContext) -> Result<Self> {
        Self::new(mean, self.hamiltonian.clone(), self.config.clone(), context)
    }

    fn value_and_gradient(&self) -> Result<&(F, Field<F>)> {
        self.value_gradient.get_or_try_init(|| {
            let n = F::from_usize(self.samples.len()).unwrap_or_else(F::nan);
            let mut value = F::zero();
            let mut gradient = Field::zeros(self.samples.mean().domain().clone());
            for s in self.samples.iter() {
                let lin = self.hamiltonian.linearize(&s, false)?;
                value = value + lin.value().scalar_value()?;
                gradient = gradient + lin.gradient()?;
            }
            Ok((value / n, gradient / n))
        })
    }
}

fn draw_samples<F: Float>(
    mean: &Field<F>,
    hamiltonian: &dyn Model<F>,
    config: &KlConfig<F>,
    context: &mut RandomContext,
) -> Result<SampleList<F>> {
    let metric = hamiltonian
        .linearize(mean, true)?
        .metric()
        .cloned()
        .ok_or_else(|| OperatorError::Unavailable("Hamiltonian provides no metric".into()))?;
    let controller = GradientNormController::new(config.sampling.clone()).named("MGVI sampling");
    let sampler = InversionEnabler::new(metric, Box::new(controller), None)?;
    let children = context.spawn(config.n_samples);
    debug!("drawing {} MGVI samples", children.len());

    let draw = |child: &RandomContext| -> Result<Field<F>> {
        let mut rng = child.rng();
        ift::LinearMap::draw_sample(&sampler, &mut rng, true)
    };
    #[cfg(feature = "parallel")]
    let drawn = children.par_iter().map(draw).collect::<Result<Vec<_>>>()?;
    #[cfg(not(feature = "parallel"))]
    let drawn = children.iter().map(draw).collect::<Result<Vec<_>>>()?;

    let mut residuals = Vec::with_capacity(2 * drawn.len());
    let mut neg = Vec::with_capacity(2 * drawn.len());
    for r in drawn {
        residuals.push(r.clone());
        neg.push(false);
        if config.mirror_samples {
            residuals.push(r);
            neg.push(true);
        }
    }
    SampleList::new(mean.clone(), residuals, neg)
}

impl<F: Float> Energy<F> for MetricGaussianKl<F> {
    fn position(&self) -> &Field<F> {
        self.samples.mean()
    }

    fn at(&self, position: Field<F>) -> Result<Box<dyn Energy<F>>> {
        let kl = MetricGaussianKl::from_samples(
            self.hamiltonian.clone(),
            self.samples.at(position)?,
            self.config.clone(),
        )?;
        Ok(Box::new(kl))
    }

    fn value(&self) -> Result<F> {
        Ok(self.value_and_gradient()?.0)
    }

    fn gradient(&self) -> Result<Field<F>> {
        Ok(self.value_and_gradient()?.1.clone())
    }

    fn metric(&self) -> Result<Operator<F>> {
        self.metric
            .get_or_try_init(|| {
                let metrics = self
                    .samples
                    .iter()
                    .map(|s| {
                        self.hamiltonian.linearize(&s, true)?.metric().cloned().ok_or_else(
                            || OperatorError::Unavailable("Hamiltonian provides no metric".into()),
                        )
                    })
                    .collect::<Result<Vec<_>>>()?;
                let n = F::from_usize(metrics.len()).unwrap_or_else(F::nan);
                let neg = vec![false; metrics.len()];
                SumOperator::make(metrics, neg)?.scale(n.recip())
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ift::{Domain, GaussianEnergy, LinearModel, Mode, StandardHamiltonian};

    /// Hamiltonian of a linear Gaussian problem `d = R s + n` with diagonal
    /// response and noise.
    fn linear_hamiltonian() -> Arc<dyn Model<f64>> {
        let d = Domain::unstructured(3);
        let r = Operator::diagonal(Field::new(d.clone(), vec![1.0, 2.0, 0.5]).unwrap());
        let data = Field::new(d.clone(), vec![1.0, -1.0, 2.0]).unwrap();
        let n_inv = Operator::diagonal(Field::new(d.clone(), vec![4.0, 1.0, 2.0]).unwrap());
        let lh = GaussianEnergy::new(d.clone(), Some(data), Some(n_inv)).unwrap();
        let chain = ift::ChainModel::new(vec![
            Arc::new(lh) as Arc<dyn Model<f64>>,
            Arc::new(LinearModel::new(r)),
        ])
        .unwrap();
        Arc::new(StandardHamiltonian::new(Arc::new(chain)).unwrap())
    }

    #[test]
    fn sample_list_stats() {
        let d = Domain::unstructured(2);
        let mean = Field::new(d.clone(), vec![1.0, 1.0]).unwrap();
        let r = Field::new(d, vec![1.0, 2.0]).unwrap();
        let list = SampleList::new(mean, vec![r.clone(), r], vec![false, true]).unwrap();
        let (m, v) = list.sample_stat(|s| Ok(s.clone())).unwrap();
        assert_eq!(m.values(), &[1.0, 1.0]);
        // samples (2, 3) and (0, -1): unbiased variance 2 and 8
        assert_relative_eq!(v.values()[0], 2.0);
        assert_relative_eq!(v.values()[1], 8.0);
    }

    #[test]
    fn sample_list_rejects_mismatched_flags() {
        let d = Domain::unstructured(2);
        let mean = Field::<f64>::zeros(d.clone());
        assert!(SampleList::new(mean, vec![Field::zeros(d)], vec![]).is_err());
    }

    #[test]
    fn mirrored_samples_come_in_pairs() {
        let h = linear_hamiltonian();
        let mut ctx = RandomContext::new(7);
        let mean = Field::zeros(h.domain().clone());
        let kl = MetricGaussianKl::new(mean, h, KlConfig::default(), &mut ctx).unwrap();
        assert_eq!(kl.samples().len(), 10);
        let avg = kl.samples().average(|s| Ok(s.clone())).unwrap();
        for v in avg.values() {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn at_keeps_residuals() {
        let h = linear_hamiltonian();
        let mut ctx = RandomContext::new(3);
        let mean = Field::zeros(h.domain().clone());
        let config = KlConfig {
            n_samples: 2,
            ..KlConfig::default()
        };
        let kl = MetricGaussianKl::new(mean, h, config, &mut ctx).unwrap();
        let p = Field::full(kl.position().domain().clone(), 0.5);
        let moved = kl.at(p.clone()).unwrap();
        assert_eq!(moved.position(), &p);
        let fresh = kl.resample_at(p, &mut ctx).unwrap();
        let residuals = |k: &MetricGaussianKl<f64>| -> Vec<Field<f64>> {
            k.samples().residuals().map(|(r, _)| r.clone()).collect()
        };
        assert_ne!(residuals(&fresh), residuals(&kl));
    }

    #[test]
    fn linear_problem_gradient_is_exact_at_mean() {
        // For a quadratic Hamiltonian mirrored samples cancel: the KL
        // gradient equals the Hamiltonian gradient at the mean.
        let h = linear_hamiltonian();
        let mut ctx = RandomContext::new(11);
        let mean = Field::new(h.domain().clone(), vec![0.3, -0.2, 0.1]).unwrap();
        let kl = MetricGaussianKl::new(mean.clone(), h.clone(), KlConfig::default(), &mut ctx)
            .unwrap();
        let g = h.linearize(&mean, false).unwrap().gradient().unwrap();
        let gk = kl.gradient().unwrap();
        for (a, b) in gk.values().iter().zip(g.values()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-10);
        }
        assert!(kl.metric().unwrap().capability().contains(Mode::Times));
    }
}
