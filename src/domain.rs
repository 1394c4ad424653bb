//! Index spaces that fields and operators live on.
//!
//! A [`Domain`] is either a tuple of atomic [`Space`]s or a multi-domain of
//! named components. Equality and hashing are structural; construction goes
//! through a process-wide interner so equal domains usually share storage
//! and compare by pointer.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::error::{OperatorError, Result};
use crate::float::Float;

/// Geometry of an atomic space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpaceKind {
    /// Plain index set, unit volume per entry.
    Unstructured,
    /// Regular grid in position space.
    Regular,
    /// Regular grid in harmonic (Fourier) space.
    Harmonic,
}

/// Atomic index space: a shape plus per-axis pixel distances.
///
/// Distances are stored as raw bits so the type stays `Eq + Hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Space {
    kind: SpaceKind,
    shape: Vec<usize>,
    distance_bits: Vec<u64>,
}

impl Space {
    /// Unstructured space with unit volume per entry.
    pub fn unstructured(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let distance_bits = vec![1.0f64.to_bits(); shape.len()];
        Space {
            kind: SpaceKind::Unstructured,
            shape,
            distance_bits,
        }
    }

    /// Regular position-space grid.
    pub fn regular(shape: impl Into<Vec<usize>>, distances: &[f64]) -> Result<Self> {
        Self::grid(SpaceKind::Regular, shape.into(), distances)
    }

    /// Regular harmonic-space grid.
    pub fn harmonic(shape: impl Into<Vec<usize>>, distances: &[f64]) -> Result<Self> {
        Self::grid(SpaceKind::Harmonic, shape.into(), distances)
    }

    fn grid(kind: SpaceKind, shape: Vec<usize>, distances: &[f64]) -> Result<Self> {
        if distances.len() != shape.len() {
            return Err(OperatorError::Construction(format!(
                "{} distances given for a {}-dimensional grid",
                distances.len(),
                shape.len()
            )));
        }
        if distances.iter().any(|&d| !(d > 0.0 && d.is_finite())) {
            return Err(OperatorError::Construction(
                "grid distances must be positive and finite".into(),
            ));
        }
        Ok(Space {
            kind,
            shape,
            distance_bits: distances.iter().map(|d| d.to_bits()).collect(),
        })
    }

    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.distance_bits.iter().map(|&b| f64::from_bits(b)).collect()
    }

    /// Volume of one pixel.
    pub fn dvol(&self) -> f64 {
        self.distance_bits.iter().map(|&b| f64::from_bits(b)).product()
    }

    /// Total volume of the space.
    pub fn total_volume(&self) -> f64 {
        self.dvol() * self.size() as f64
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape: Vec<String> = self.shape.iter().map(|n| n.to_string()).collect();
        match self.kind {
            SpaceKind::Unstructured => write!(f, "Unstructured({})", shape.join("x")),
            SpaceKind::Regular => {
                write!(f, "Regular({}, d={:?})", shape.join("x"), self.distances())
            }
            SpaceKind::Harmonic => {
                write!(f, "Harmonic({}, d={:?})", shape.join("x"), self.distances())
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum DomainKind {
    Tuple(Vec<Space>),
    Multi(Vec<(String, Domain)>),
}

/// Immutable, structurally compared description of an index space.
#[derive(Clone)]
pub struct Domain(Arc<DomainKind>);

/// Live domains bucketed by structural hash. Only weak handles are held, so
/// a domain is freed once its last user drops it.
static INTERNED: OnceLock<Mutex<HashMap<u64, Vec<Weak<DomainKind>>>>> = OnceLock::new();

impl Domain {
    fn intern(kind: DomainKind) -> Domain {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        let key = hasher.finish();

        let cache = INTERNED.get_or_init(|| Mutex::new(HashMap::new()));
        let mut map = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.retain(|_, bucket| {
            bucket.retain(|w| w.strong_count() > 0);
            !bucket.is_empty()
        });
        let bucket = map.entry(key).or_default();
        if let Some(existing) = bucket
            .iter()
            .filter_map(Weak::upgrade)
            .find(|d| **d == kind)
        {
            return Domain(existing);
        }
        let inner = Arc::new(kind);
        bucket.push(Arc::downgrade(&inner));
        Domain(inner)
    }

    /// Tuple of atomic spaces.
    pub fn new(spaces: Vec<Space>) -> Domain {
        Self::intern(DomainKind::Tuple(spaces))
    }

    /// Zero-dimensional domain holding a single value.
    pub fn scalar() -> Domain {
        Self::new(Vec::new())
    }

    /// One unstructured axis of length `n`.
    pub fn unstructured(n: usize) -> Domain {
        Self::new(vec![Space::unstructured(vec![n])])
    }

    /// One regular grid.
    pub fn regular(shape: impl Into<Vec<usize>>, distances: &[f64]) -> Result<Domain> {
        Ok(Self::new(vec![Space::regular(shape, distances)?]))
    }

    /// Multi-domain from named components; keys are sorted.
    ///
    /// Components must be tuple domains and keys must be unique.
    pub fn multi<K, I>(components: I) -> Result<Domain>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Domain)>,
    {
        let mut items: Vec<(String, Domain)> =
            components.into_iter().map(|(k, d)| (k.into(), d)).collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        for pair in items.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(OperatorError::Construction(format!(
                    "duplicate multi-domain key '{}'",
                    pair[0].0
                )));
            }
        }
        if let Some((key, _)) = items.iter().find(|(_, d)| d.is_multi()) {
            return Err(OperatorError::Construction(format!(
                "multi-domain component '{key}' is itself a multi-domain"
            )));
        }
        Ok(Self::intern(DomainKind::Multi(items)))
    }

    pub fn is_multi(&self) -> bool {
        matches!(*self.0, DomainKind::Multi(_))
    }

    /// True for the zero-dimensional tuple domain.
    pub fn is_scalar(&self) -> bool {
        matches!(&*self.0, DomainKind::Tuple(s) if s.is_empty())
    }

    /// Atomic spaces (empty for multi-domains).
    pub fn spaces(&self) -> &[Space] {
        match &*self.0 {
            DomainKind::Tuple(s) => s,
            DomainKind::Multi(_) => &[],
        }
    }

    /// Named components in key order (empty for tuple domains).
    pub fn components(&self) -> &[(String, Domain)] {
        match &*self.0 {
            DomainKind::Tuple(_) => &[],
            DomainKind::Multi(c) => c,
        }
    }

    pub fn component(&self, key: &str) -> Option<&Domain> {
        self.components()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, d)| d)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.components().iter().map(|(k, _)| k.as_str())
    }

    /// Flat index ranges of each component, in key order.
    pub fn component_ranges(&self) -> Vec<(&str, &Domain, Range<usize>)> {
        let mut start = 0;
        self.components()
            .iter()
            .map(|(k, d)| {
                let end = start + d.size();
                let r = start..end;
                start = end;
                (k.as_str(), d, r)
            })
            .collect()
    }

    pub fn component_range(&self, key: &str) -> Option<Range<usize>> {
        self.component_ranges()
            .into_iter()
            .find(|(k, _, _)| *k == key)
            .map(|(_, _, r)| r)
    }

    /// Concatenated shape of all spaces; a multi-domain reports its flat size.
    pub fn shape(&self) -> Vec<usize> {
        match &*self.0 {
            DomainKind::Tuple(s) => s.iter().flat_map(|sp| sp.shape().iter().copied()).collect(),
            DomainKind::Multi(_) => vec![self.size()],
        }
    }

    /// Total number of entries.
    pub fn size(&self) -> usize {
        match &*self.0 {
            DomainKind::Tuple(s) => s.iter().map(Space::size).product(),
            DomainKind::Multi(c) => c.iter().map(|(_, d)| d.size()).sum(),
        }
    }

    /// Integration-measure factor `prod(dvol)^power` over the selected spaces.
    pub fn weight_factor(&self, power: i32, spaces: Option<&[usize]>) -> Result<f64> {
        if self.is_multi() {
            return Err(OperatorError::Unavailable(
                "a multi-domain has no single volume factor".into(),
            ));
        }
        let all = self.spaces();
        let dvol = match spaces {
            None => all.iter().map(Space::dvol).product::<f64>(),
            Some(sel) => {
                let mut v = 1.0;
                for &i in sel {
                    let sp = all.get(i).ok_or_else(|| {
                        OperatorError::Construction(format!(
                            "space index {i} out of range for {self}"
                        ))
                    })?;
                    v *= sp.dvol();
                }
                v
            }
        };
        Ok(dvol.powi(power))
    }

    /// Multiply `values` by the integration measure raised to `power`.
    pub fn weight<F: Float>(&self, values: &mut [F], power: i32) {
        debug_assert_eq!(values.len(), self.size());
        match &*self.0 {
            DomainKind::Tuple(s) => {
                let fct = F::lit(s.iter().map(Space::dvol).product::<f64>().powi(power));
                if fct != F::one() {
                    values.iter_mut().for_each(|v| *v = *v * fct);
                }
            }
            DomainKind::Multi(_) => {
                for (_, d, r) in self.component_ranges() {
                    d.weight(&mut values[r], power);
                }
            }
        }
    }
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl Eq for Domain {}

impl Hash for Domain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (*self.0).hash(state)
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            DomainKind::Tuple(s) => {
                let parts: Vec<String> = s.iter().map(|sp| sp.to_string()).collect();
                write!(f, "Domain({})", parts.join(", "))
            }
            DomainKind::Multi(c) => {
                let parts: Vec<String> = c.iter().map(|(k, d)| format!("{k}: {d}")).collect();
                write!(f, "MultiDomain{{{}}}", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_and_interning() {
        let a = Domain::unstructured(8);
        let b = Domain::new(vec![Space::unstructured(vec![8])]);
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_ne!(a, Domain::unstructured(16));
    }

    #[test]
    fn dropped_domains_are_released() {
        let kind = DomainKind::Tuple(vec![Space::unstructured(vec![987_653])]);
        let transient = Domain::unstructured(987_653);
        let handle = Arc::downgrade(&transient.0);
        drop(transient);
        assert!(handle.upgrade().is_none());
        let again = Domain::unstructured(987_653);
        assert_eq!(*again.0, kind);
    }

    #[test]
    fn regular_grid_volume() {
        let d = Domain::regular(vec![4, 2], &[0.5, 0.25]).unwrap();
        assert_eq!(d.shape(), vec![4, 2]);
        assert_eq!(d.size(), 8);
        assert!((d.weight_factor(1, None).unwrap() - 0.125).abs() < 1e-15);
        assert!((d.weight_factor(-1, None).unwrap() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn bad_distances_rejected() {
        assert!(Space::regular(vec![4], &[0.0]).is_err());
        assert!(Space::regular(vec![4, 4], &[1.0]).is_err());
    }

    #[test]
    fn multi_domain_sorted_with_ranges() {
        let m = Domain::multi([("xi", Domain::unstructured(3)), ("amp", Domain::unstructured(2))])
            .unwrap();
        assert!(m.is_multi());
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["amp", "xi"]);
        assert_eq!(m.size(), 5);
        assert_eq!(m.component_range("xi"), Some(2..5));
        assert_eq!(m.component("amp"), Some(&Domain::unstructured(2)));
    }

    #[test]
    fn multi_domain_rejects_duplicates_and_nesting() {
        let d = Domain::unstructured(2);
        assert!(Domain::multi([("a", d.clone()), ("a", d.clone())]).is_err());
        let inner = Domain::multi([("a", d.clone())]).unwrap();
        assert!(Domain::multi([("b", inner)]).is_err());
    }

    #[test]
    fn scalar_domain() {
        let s = Domain::scalar();
        assert!(s.is_scalar());
        assert_eq!(s.size(), 1);
        assert!(s.shape().is_empty());
    }

    #[test]
    fn weight_multi_per_component() {
        let a = Domain::regular(vec![2], &[2.0]).unwrap();
        let b = Domain::unstructured(1);
        let m = Domain::multi([("a", a), ("b", b)]).unwrap();
        let mut v = vec![1.0f64, 1.0, 1.0];
        m.weight(&mut v, 1);
        assert_eq!(v, vec![2.0, 2.0, 1.0]);
    }
}
