use std::collections::VecDeque;

use log::debug;

use ift::{Field, Float, Result};

use crate::energy::Energy;
use crate::iteration_controller::IterationController;
use crate::line_search::LineSearch;
use crate::solvers::descent::{DescentDirection, DescentMinimizer};

/// Configuration for the L-BFGS direction.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LbfgsConfig {
    /// Number of recent (s, y) pairs to store (default: 10).
    pub memory: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        LbfgsConfig { memory: 10 }
    }
}

/// Limited-memory BFGS direction.
///
/// The secant pairs are taken from consecutive calls: `s = x_k - x_{k-1}`,
/// `y = g_k - g_{k-1}`. Pairs with `s^† y <= 0` are skipped.
#[derive(Debug, Clone)]
pub struct Lbfgs<F: Float> {
    memory: usize,
    last: Option<(Field<F>, Field<F>)>,
    s_hist: VecDeque<Field<F>>,
    y_hist: VecDeque<Field<F>>,
    rho_hist: VecDeque<F>,
}

impl<F: Float> Lbfgs<F> {
    pub fn new(config: LbfgsConfig) -> Self {
        let m = config.memory.max(1);
        Lbfgs {
            memory: m,
            last: None,
            s_hist: VecDeque::with_capacity(m),
            y_hist: VecDeque::with_capacity(m),
            rho_hist: VecDeque::with_capacity(m),
        }
    }

    /// Number of stored secant pairs.
    pub fn history_len(&self) -> usize {
        self.s_hist.len()
    }

    fn push(&mut self, s: Field<F>, y: Field<F>) {
        let sy = s.vdot(&y);
        if sy <= F::zero() {
            debug!("L-BFGS: skipping pair with s·y = {sy}");
            return;
        }
        if self.s_hist.len() == self.memory {
            self.s_hist.pop_front();
            self.y_hist.pop_front();
            self.rho_hist.pop_front();
        }
        self.rho_hist.push_back(F::one() / sy);
        self.s_hist.push_back(s);
        self.y_hist.push_back(y);
    }

    /// Two-loop recursion: `-H_k g`.
    fn two_loop_recursion(&self, grad: &Field<F>) -> Field<F> {
        let k = self.s_hist.len();
        let mut q = grad.clone();

        // Newest to oldest.
        let mut alpha = vec![F::zero(); k];
        for i in (0..k).rev() {
            alpha[i] = self.rho_hist[i] * self.s_hist[i].vdot(&q);
            q = q.add_scaled(-alpha[i], &self.y_hist[i]);
        }

        // H_0 = gamma I with gamma = s^† y / y^† y from the newest pair.
        let mut r = q;
        if let (Some(s), Some(y)) = (self.s_hist.back(), self.y_hist.back()) {
            let yy = y.vdot(y);
            if yy > F::zero() {
                r = r * (s.vdot(y) / yy);
            }
        }

        // Oldest to newest.
        for i in 0..k {
            let beta = self.rho_hist[i] * self.y_hist[i].vdot(&r);
            r = r.add_scaled(alpha[i] - beta, &self.s_hist[i]);
        }

        -r
    }
}

impl<F: Float> DescentDirection<F> for Lbfgs<F> {
    fn direction(&mut self, energy: &dyn Energy<F>) -> Result<Option<Field<F>>> {
        let x = energy.position().clone();
        let g = energy.gradient()?;
        if let Some((x_prev, g_prev)) = self.last.take() {
            self.push(&x - &x_prev, &g - &g_prev);
        }
        let d = self.two_loop_recursion(&g);
        self.last = Some((x, g));
        Ok(Some(d))
    }

    fn reset(&mut self) {
        self.last = None;
        self.s_hist.clear();
        self.y_hist.clear();
        self.rho_hist.clear();
    }
}

impl<F: Float> DescentMinimizer<F, Lbfgs<F>>
where
    LineSearch<F>: Default,
{
    pub fn lbfgs(controller: Box<dyn IterationController<F>>, config: LbfgsConfig) -> Self {
        DescentMinimizer::new(controller, Lbfgs::new(config))
    }
}
