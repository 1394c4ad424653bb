//! One-dimensional searches along a descent direction.

use log::{debug, warn};

use ift::{Field, Float, Result};

use crate::energy::Energy;

/// An energy restricted to the line `x_0 + t d`.
#[derive(Debug)]
pub struct LineEnergy<'a, F: Float> {
    start: &'a dyn Energy<F>,
    direction: &'a Field<F>,
    line_position: F,
    energy: Box<dyn Energy<F>>,
}

impl<'a, F: Float> LineEnergy<'a, F> {
    pub fn new(
        start: &'a dyn Energy<F>,
        direction: &'a Field<F>,
        line_position: F,
    ) -> Result<Self> {
        let x = start.position().add_scaled(line_position, direction);
        let energy = start.at(x)?;
        Ok(LineEnergy {
            start,
            direction,
            line_position,
            energy,
        })
    }

    /// The same line at another parameter.
    pub fn at(&self, line_position: F) -> Result<Self> {
        Self::new(self.start, self.direction, line_position)
    }

    pub fn line_position(&self) -> F {
        self.line_position
    }

    pub fn energy(&self) -> &dyn Energy<F> {
        self.energy.as_ref()
    }

    pub fn into_energy(self) -> Box<dyn Energy<F>> {
        self.energy
    }

    pub fn value(&self) -> Result<F> {
        self.energy.value()
    }

    /// Derivative of the value with respect to the line parameter.
    pub fn directional_derivative(&self) -> Result<F> {
        Ok(self.energy.gradient()?.vdot(self.direction))
    }
}

/// Parameters for the strong Wolfe line search.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StrongWolfeParams<F> {
    /// Sufficient decrease parameter (default: 1e-4).
    pub c1: F,
    /// Curvature parameter (default: 0.9).
    pub c2: F,
    /// Largest admissible step (default: 1e9).
    pub max_step_size: F,
    /// Bracketing iterations before giving up (default: 100).
    pub max_iterations: usize,
    /// Zoom iterations before giving up (default: 100).
    pub max_zoom_iterations: usize,
}

impl Default for StrongWolfeParams<f64> {
    fn default() -> Self {
        StrongWolfeParams {
            c1: 1e-4,
            c2: 0.9,
            max_step_size: 1e9,
            max_iterations: 100,
            max_zoom_iterations: 100,
        }
    }
}

impl Default for StrongWolfeParams<f32> {
    fn default() -> Self {
        StrongWolfeParams {
            c1: 1e-4,
            c2: 0.9,
            max_step_size: 1e9,
            max_iterations: 100,
            max_zoom_iterations: 100,
        }
    }
}

/// Parameters for the backtracking Armijo line search.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArmijoParams<F> {
    /// Sufficient decrease parameter (default: 1e-4).
    pub c: F,
    /// Backtracking factor (default: 0.5).
    pub rho: F,
    /// Minimum step size before declaring failure (default: 1e-16).
    pub alpha_min: F,
}

impl Default for ArmijoParams<f64> {
    fn default() -> Self {
        ArmijoParams {
            c: 1e-4,
            rho: 0.5,
            alpha_min: 1e-16,
        }
    }
}

impl Default for ArmijoParams<f32> {
    fn default() -> Self {
        ArmijoParams {
            c: 1e-4,
            rho: 0.5,
            alpha_min: 1e-8,
        }
    }
}

/// Result of a successful line search.
#[derive(Debug)]
pub struct LineSearchResult<F: Float> {
    /// Energy at the accepted point.
    pub energy: Box<dyn Energy<F>>,
    /// The accepted step size.
    pub alpha: F,
    /// Number of energy evaluations used.
    pub evals: usize,
}

/// A line search strategy.
#[derive(Debug, Clone)]
pub enum LineSearch<F> {
    StrongWolfe(StrongWolfeParams<F>),
    Armijo(ArmijoParams<F>),
}

impl Default for LineSearch<f64> {
    fn default() -> Self {
        LineSearch::StrongWolfe(StrongWolfeParams::default())
    }
}

impl Default for LineSearch<f32> {
    fn default() -> Self {
        LineSearch::StrongWolfe(StrongWolfeParams::default())
    }
}

impl<F: Float> LineSearch<F> {
    /// Search along `direction` from `energy`.
    ///
    /// `initial_step` is the first trial step; without one the strong Wolfe
    /// search guesses from the previous energy value `previous_value`.
    /// Returns `None` if no acceptable step was found; an `Err` only for
    /// structural failures.
    pub fn search(
        &self,
        energy: &dyn Energy<F>,
        direction: &Field<F>,
        previous_value: Option<F>,
        initial_step: Option<F>,
    ) -> Result<Option<LineSearchResult<F>>> {
        match self {
            LineSearch::StrongWolfe(p) => {
                strong_wolfe(energy, direction, previous_value, initial_step, p)
            }
            LineSearch::Armijo(p) => {
                backtracking_armijo(energy, direction, initial_step.unwrap_or_else(F::one), p)
            }
        }
    }
}

/// Largest step allowed by both the parameters and the energy itself.
fn step_limit<F: Float>(energy: &dyn Energy<F>, direction: &Field<F>, max_step: F) -> F {
    match energy.longest_step(direction) {
        Some(s) => s.min(max_step),
        None => max_step,
    }
}

/// Backtracking line search satisfying the Armijo (sufficient decrease)
/// condition `E(x + alpha d) <= E(x) + c alpha g^† d`.
///
/// Returns `None` for a non-descent direction or if `alpha` falls below
/// `alpha_min`.
pub fn backtracking_armijo<F: Float>(
    energy: &dyn Energy<F>,
    direction: &Field<F>,
    alpha_init: F,
    params: &ArmijoParams<F>,
) -> Result<Option<LineSearchResult<F>>> {
    let f_x = energy.value()?;
    let dg = energy.gradient()?.vdot(direction);
    if dg >= F::zero() {
        return Ok(None);
    }

    let mut alpha = alpha_init.min(step_limit(energy, direction, F::infinity()));
    let mut evals = 0;
    loop {
        if alpha < params.alpha_min {
            return Ok(None);
        }
        let trial = energy.at(energy.position().add_scaled(alpha, direction))?;
        let f_new = trial.value()?;
        evals += 1;
        if f_new <= f_x + params.c * alpha * dg {
            return Ok(Some(LineSearchResult {
                energy: trial,
                alpha,
                evals,
            }));
        }
        alpha = alpha * params.rho;
    }
}

/// Line search satisfying the strong Wolfe conditions (Nocedal & Wright,
/// algorithms 3.5 and 3.6).
pub fn strong_wolfe<F: Float>(
    energy: &dyn Energy<F>,
    direction: &Field<F>,
    previous_value: Option<F>,
    initial_step: Option<F>,
    params: &StrongWolfeParams<F>,
) -> Result<Option<LineSearchResult<F>>> {
    let le0 = LineEnergy::new(energy, direction, F::zero())?;
    let phi_0 = le0.value()?;
    let phiprime_0 = le0.directional_derivative()?;
    if phiprime_0 == F::zero() {
        debug!("strong Wolfe: directional derivative is zero, staying put");
        return Ok(Some(LineSearchResult {
            energy: le0.into_energy(),
            alpha: F::zero(),
            evals: 1,
        }));
    }
    if phiprime_0 > F::zero() {
        warn!("strong Wolfe: not a descent direction");
        return Ok(None);
    }

    let max_step = step_limit(energy, direction, params.max_step_size);
    let mut alpha1 = match (initial_step, previous_value) {
        (Some(a), _) => a,
        (None, Some(prev)) if phi_0 != prev => {
            let guess = F::lit(1.01) * F::lit(2.0) * (phi_0 - prev) / phiprime_0;
            if guess > F::zero() {
                guess.min(F::one())
            } else {
                F::one()
            }
        }
        _ => F::one(),
    };
    alpha1 = alpha1.min(max_step);

    let mut evals = 1;
    let mut alpha0 = F::zero();
    let mut phi_alpha0 = phi_0;
    let mut phiprime_alpha0 = phiprime_0;
    let wolfe = Wolfe {
        le0: &le0,
        phi_0,
        phiprime_0,
        params,
    };

    for i in 0..params.max_iterations {
        if alpha1 <= F::zero() {
            warn!("strong Wolfe: step size vanished");
            return Ok(None);
        }
        let le1 = le0.at(alpha1)?;
        let phi_alpha1 = le1.value()?;
        evals += 1;

        if phi_alpha1 > phi_0 + params.c1 * alpha1 * phiprime_0
            || (i > 0 && phi_alpha1 >= phi_alpha0)
        {
            return wolfe.zoom(
                Bracket::new(alpha0, phi_alpha0, phiprime_alpha0, alpha1, phi_alpha1),
                evals,
            );
        }

        let phiprime_alpha1 = le1.directional_derivative()?;
        if phiprime_alpha1.abs() <= -params.c2 * phiprime_0 {
            return Ok(Some(LineSearchResult {
                energy: le1.into_energy(),
                alpha: alpha1,
                evals,
            }));
        }
        if phiprime_alpha1 >= F::zero() {
            return wolfe.zoom(
                Bracket::new(alpha1, phi_alpha1, phiprime_alpha1, alpha0, phi_alpha0),
                evals,
            );
        }

        if alpha1 >= max_step {
            warn!("strong Wolfe: reached the maximum step size");
            return Ok(Some(LineSearchResult {
                energy: le1.into_energy(),
                alpha: alpha1,
                evals,
            }));
        }
        alpha0 = alpha1;
        phi_alpha0 = phi_alpha1;
        phiprime_alpha0 = phiprime_alpha1;
        alpha1 = (alpha1 * F::lit(2.0)).min(max_step);
    }

    warn!("strong Wolfe: bracketing iteration limit reached");
    Ok(None)
}

/// Interval `[lo, hi]` (in either order) known to contain acceptable steps.
struct Bracket<F> {
    alpha_lo: F,
    phi_lo: F,
    phiprime_lo: F,
    alpha_hi: F,
    phi_hi: F,
}

impl<F> Bracket<F> {
    fn new(alpha_lo: F, phi_lo: F, phiprime_lo: F, alpha_hi: F, phi_hi: F) -> Self {
        Bracket {
            alpha_lo,
            phi_lo,
            phiprime_lo,
            alpha_hi,
            phi_hi,
        }
    }
}

struct Wolfe<'l, 'a, F: Float> {
    le0: &'l LineEnergy<'a, F>,
    phi_0: F,
    phiprime_0: F,
    params: &'l StrongWolfeParams<F>,
}

impl<F: Float> Wolfe<'_, '_, F> {
    fn zoom(&self, mut b: Bracket<F>, mut evals: usize) -> Result<Option<LineSearchResult<F>>> {
        let cubic_delta = F::lit(0.2);
        let quad_delta = F::lit(0.1);
        let mut recent: Option<(F, F)> = None;

        for i in 0..self.params.max_zoom_iterations {
            let delta_alpha = b.alpha_hi - b.alpha_lo;
            let (lo, hi) = if delta_alpha < F::zero() {
                (b.alpha_hi, b.alpha_lo)
            } else {
                (b.alpha_lo, b.alpha_hi)
            };
            let inside = |a: F, margin: F| a > lo + margin && a < hi - margin;

            let cubic = match recent {
                Some((alpha_rec, phi_rec)) if i > 0 => cubic_min(
                    b.alpha_lo,
                    b.phi_lo,
                    b.phiprime_lo,
                    b.alpha_hi,
                    b.phi_hi,
                    alpha_rec,
                    phi_rec,
                )
                .filter(|&a| inside(a, cubic_delta * delta_alpha.abs())),
                _ => None,
            };
            let alpha_j = cubic
                .or_else(|| {
                    quad_min(b.alpha_lo, b.phi_lo, b.phiprime_lo, b.alpha_hi, b.phi_hi)
                        .filter(|&a| inside(a, quad_delta * delta_alpha.abs()))
                })
                .unwrap_or(b.alpha_lo + F::lit(0.5) * delta_alpha);

            let le_j = self.le0.at(alpha_j)?;
            let phi_j = le_j.value()?;
            evals += 1;

            if phi_j > self.phi_0 + self.params.c1 * alpha_j * self.phiprime_0 || phi_j >= b.phi_lo
            {
                recent = Some((b.alpha_hi, b.phi_hi));
                b.alpha_hi = alpha_j;
                b.phi_hi = phi_j;
            } else {
                let phiprime_j = le_j.directional_derivative()?;
                if phiprime_j.abs() <= -self.params.c2 * self.phiprime_0 {
                    return Ok(Some(LineSearchResult {
                        energy: le_j.into_energy(),
                        alpha: alpha_j,
                        evals,
                    }));
                }
                if phiprime_j * delta_alpha >= F::zero() {
                    recent = Some((b.alpha_hi, b.phi_hi));
                    b.alpha_hi = b.alpha_lo;
                    b.phi_hi = b.phi_lo;
                } else {
                    recent = Some((b.alpha_lo, b.phi_lo));
                }
                b.alpha_lo = alpha_j;
                b.phi_lo = phi_j;
                b.phiprime_lo = phiprime_j;
            }
        }
        warn!("strong Wolfe: zoom iteration limit reached");
        Ok(None)
    }
}

/// Minimizer of the cubic through `(a, fa)`, `(b, fb)`, `(c, fc)` with slope
/// `fpa` at `a`.
fn cubic_min<F: Float>(a: F, fa: F, fpa: F, b: F, fb: F, c: F, fc: F) -> Option<F> {
    let db = b - a;
    let dc = c - a;
    let denom = (db * dc) * (db * dc) * (db - dc);
    if denom == F::zero() {
        return None;
    }
    let rb = fb - fa - fpa * db;
    let rc = fc - fa - fpa * dc;
    let ca = (dc * dc * rb - db * db * rc) / denom;
    let cb = (-dc * dc * dc * rb + db * db * db * rc) / denom;
    let radical = cb * cb - F::lit(3.0) * ca * fpa;
    if radical < F::zero() || ca == F::zero() {
        return None;
    }
    let xmin = a + (-cb + radical.sqrt()) / (F::lit(3.0) * ca);
    xmin.is_finite().then_some(xmin)
}

/// Minimizer of the parabola through `(a, fa)`, `(b, fb)` with slope `fpa`
/// at `a`.
fn quad_min<F: Float>(a: F, fa: F, fpa: F, b: F, fb: F) -> Option<F> {
    let db = b - a;
    if db == F::zero() {
        return None;
    }
    let curv = (fb - fa - fpa * db) / (db * db);
    if curv <= F::zero() {
        return None;
    }
    let xmin = a - fpa / (F::lit(2.0) * curv);
    xmin.is_finite().then_some(xmin)
}
