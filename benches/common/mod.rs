use ift::{DenseOperator, Domain, Field, Operator, RandomContext};

// ─── Fields and operators ──────────────────────────────────────────────────

pub fn random_field(n: usize, seed: u64) -> Field<f64> {
    let mut rng = RandomContext::new(seed).rng();
    Field::from_random(Domain::unstructured(n), &mut rng)
}

pub fn dense(n: usize, seed: u64) -> Operator<f64> {
    let d = Domain::unstructured(n);
    let m = random_field(n * n, seed);
    DenseOperator::new(d.clone(), d, m.to_vec()).unwrap().into()
}

// Entries in [1, 2).
pub fn positive_diagonal(n: usize) -> Operator<f64> {
    let values = (0..n).map(|i| 1.0 + i as f64 / n as f64).collect();
    Operator::diagonal(Field::new(Domain::unstructured(n), values).unwrap())
}
