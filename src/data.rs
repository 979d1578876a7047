//! Querying the dataset: p-values, association scores, and the subset
//! searches every discovery algorithm is built from.

use crate::comm::Communicator;
use crate::counter::Counter;
use crate::gsquare::g_square;
use crate::set::VarSet;
use crate::{Error, Var};
use lasso::{Key, MiniSpur, Rodeo, RodeoReader};
use once_cell::sync::Lazy;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Sync cadence of the distributed subset search: the number of subsets each
/// rank walks between reductions, overridable through the
/// `CSL_TESTS_THRESHOLD` environment variable.
const DEFAULT_TESTS_THRESHOLD: u32 = 16;

static TESTS_THRESHOLD: Lazy<u32> = Lazy::new(|| {
    std::env::var("CSL_TESTS_THRESHOLD")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TESTS_THRESHOLD)
});

/// Immutable facade over a dataset: the counter, the variable names, and the
/// significance threshold `alpha`.
///
/// Variables are declared independent when `p > alpha`; the boundary
/// `p == alpha` counts as dependent. The association score is `1 − p`.
pub struct DiscreteData<C: Counter> {
    counter: C,
    names: RodeoReader<MiniSpur>,
    alpha: f64,
}

impl<C: Counter> DiscreteData<C> {
    /// Wraps a counter with variable names and the significance threshold.
    ///
    /// Names are interned so that `var_index(var_name(v)) == v`; duplicate
    /// names therefore cannot be represented and are rejected.
    pub fn new(counter: C, names: &[String], alpha: f64) -> Result<Self, Error> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(Error::InvalidAlpha(alpha));
        }
        if names.len() != counter.num_vars() {
            return Err(Error::ShapeMismatch {
                axis: "variable names",
                expected: counter.num_vars(),
                found: names.len(),
            });
        }
        if names.len() > u16::MAX as usize {
            return Err(Error::TooManyVariables(names.len()));
        }
        let mut rodeo = Rodeo::<MiniSpur>::new();
        for name in names {
            let before = rodeo.len();
            rodeo
                .try_get_or_intern(name.as_str())
                .map_err(|_| Error::TooManyVariables(names.len()))?;
            if rodeo.len() == before {
                return Err(Error::DuplicateVariableName(name.clone()));
            }
        }
        Ok(DiscreteData {
            counter,
            names: rodeo.into_reader(),
            alpha,
        })
    }

    /// Number of variables in the dataset.
    pub fn num_vars(&self) -> usize {
        self.counter.num_vars()
    }

    /// Number of observations in the dataset.
    pub fn num_obs(&self) -> usize {
        self.counter.num_obs()
    }

    /// The significance threshold this facade was built with.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The underlying counter.
    pub fn counter(&self) -> &C {
        &self.counter
    }

    /// The name of variable `x`.
    pub fn var_name(&self, x: Var) -> &str {
        self.names
            .resolve(&MiniSpur::try_from_usize(x as usize).expect("variable id in key space"))
    }

    /// The names of all variables in `vars`, in ascending index order.
    pub fn var_names(&self, vars: &VarSet) -> Vec<&str> {
        vars.iter().map(|v| self.var_name(v)).collect()
    }

    /// Looks a variable up by name.
    pub fn var_index(&self, name: &str) -> Option<Var> {
        self.names.get(name).map(|k| k.into_usize() as Var)
    }

    /// The p-value for `I(x; y | given)`.
    ///
    /// An exactly-zero statistic and zero degrees of freedom both mean the
    /// data carries no evidence against independence, so both yield 1.
    /// The (x, y) order is canonicalized first, which makes the result
    /// bitwise symmetric.
    pub fn p_value(&self, x: Var, y: Var, given: &VarSet) -> f64 {
        let (x, y) = if x <= y { (x, y) } else { (y, x) };
        let r = g_square(&self.counter, x, y, given);
        if r.df == 0 || r.g2 == 0.0 {
            return 1.0;
        }
        let dist = ChiSquared::new(r.df as f64).unwrap();
        let p = 1.0 - dist.cdf(r.g2);
        log::debug!("p-value({}, {} | {:?}) = {:e}", x, y, given, p);
        p
    }

    /// The association score `1 − p`.
    pub fn assoc_score(&self, x: Var, y: Var, given: &VarSet) -> f64 {
        1.0 - self.p_value(x, y, given)
    }

    /// Whether `x` and `y` are independent given `given`.
    pub fn is_independent(&self, x: Var, y: Var, given: &VarSet) -> bool {
        self.p_value(x, y, given) > self.alpha
    }

    /// Whether an association score indicates independence.
    pub fn is_independent_score(&self, assoc_score: f64) -> bool {
        1.0 - assoc_score > self.alpha
    }

    /// The minimum association between `x` and `y` over every subset of
    /// `given` with at most `max_size` elements, enumerated radius-major.
    ///
    /// Stops as soon as the running minimum establishes independence.
    pub fn min_assoc_score(&self, x: Var, y: Var, given: &VarSet, max_size: usize) -> f64 {
        let limit = max_size.min(given.len());
        let mut min_score = f64::MAX;
        'radius: for radius in 0..=limit {
            for condition in given.subsets(radius) {
                min_score = min_score.min(self.assoc_score(x, y, &condition));
                if self.is_independent_score(min_score) {
                    break 'radius;
                }
            }
        }
        log::debug!("min_assoc_score({}, {}) = {:e}", x, y, min_score);
        min_score
    }

    /// Like [`min_assoc_score`](Self::min_assoc_score), but every enumerated
    /// subset is unioned with `seed` before testing. The radius is still
    /// measured over `given`.
    pub fn min_assoc_score_seeded(
        &self,
        x: Var,
        y: Var,
        given: &VarSet,
        seed: &VarSet,
        max_size: usize,
    ) -> f64 {
        let limit = max_size.min(given.len());
        let mut min_score = f64::MAX;
        'radius: for radius in 0..=limit {
            for mut condition in given.subsets(radius) {
                condition.union_with(seed);
                min_score = min_score.min(self.assoc_score(x, y, &condition));
                if self.is_independent_score(min_score) {
                    break 'radius;
                }
            }
        }
        min_score
    }

    /// Like [`min_assoc_score`](Self::min_assoc_score), but also returns a
    /// subset achieving the minimum.
    pub fn min_assoc_score_subset(
        &self,
        x: Var,
        y: Var,
        given: &VarSet,
        max_size: usize,
    ) -> (f64, VarSet) {
        let limit = max_size.min(given.len());
        let mut min_score = f64::MAX;
        let mut argmin = VarSet::new(given.domain());
        'radius: for radius in 0..=limit {
            for condition in given.subsets(radius) {
                let score = self.assoc_score(x, y, &condition);
                if score < min_score {
                    min_score = score;
                    argmin = condition;
                }
                if self.is_independent_score(min_score) {
                    break 'radius;
                }
            }
        }
        (min_score, argmin)
    }

    /// Whether `x` and `y` are independent given any subset of `given` with
    /// at most `max_size` elements.
    pub fn is_independent_any_subset(
        &self,
        x: Var,
        y: Var,
        given: &VarSet,
        max_size: usize,
    ) -> bool {
        self.is_independent_score(self.min_assoc_score(x, y, given, max_size))
    }

    /// The seeded variant of
    /// [`is_independent_any_subset`](Self::is_independent_any_subset).
    pub fn is_independent_any_subset_seeded(
        &self,
        x: Var,
        y: Var,
        given: &VarSet,
        seed: &VarSet,
        max_size: usize,
    ) -> bool {
        self.is_independent_score(self.min_assoc_score_seeded(x, y, given, seed, max_size))
    }

    /// Distributed [`is_independent_any_subset`](Self::is_independent_any_subset):
    /// the subset stream is walked identically on every rank, subset `i` is
    /// tested by rank `i mod R`, and the running minima are reduced every
    /// `T · R` walked positions so all ranks can return as soon as any of
    /// them has established independence. A final reduction makes the answer
    /// identical on every rank even when the stream length is not a multiple
    /// of the sync cadence.
    pub fn is_independent_any_subset_dist(
        &self,
        x: Var,
        y: Var,
        given: &VarSet,
        max_size: usize,
        comm: &dyn Communicator,
    ) -> bool {
        let threshold = *TESTS_THRESHOLD;
        let mut mine = 0u32;
        let mut others = 0u32;
        let mut owner = 0usize;
        let mut min_score = f64::MAX;
        let limit = max_size.min(given.len());
        for radius in 0..=limit {
            for condition in given.subsets(radius) {
                if comm.rank() != owner {
                    others += 1;
                } else {
                    mine += 1;
                    // Keep walking after a local hit to stay in sync, but
                    // stop paying for tests.
                    if !self.is_independent_score(min_score) {
                        min_score = min_score.min(self.assoc_score(x, y, &condition));
                    }
                }
                if mine + others == threshold * comm.size() as u32 {
                    min_score = comm.allreduce_min(min_score);
                    if self.is_independent_score(min_score) {
                        return true;
                    }
                    mine = 0;
                    others = 0;
                }
                owner = (owner + 1) % comm.size();
            }
        }
        min_score = comm.allreduce_min(min_score);
        self.is_independent_score(min_score)
    }

    /// Distributed variant of
    /// [`is_independent_any_subset_seeded`](Self::is_independent_any_subset_seeded);
    /// identical protocol, with every enumerated subset unioned with `seed`
    /// before testing.
    pub fn is_independent_any_subset_seeded_dist(
        &self,
        x: Var,
        y: Var,
        given: &VarSet,
        seed: &VarSet,
        max_size: usize,
        comm: &dyn Communicator,
    ) -> bool {
        let threshold = *TESTS_THRESHOLD;
        let mut mine = 0u32;
        let mut others = 0u32;
        let mut owner = 0usize;
        let mut min_score = f64::MAX;
        let limit = max_size.min(given.len());
        for radius in 0..=limit {
            for mut condition in given.subsets(radius) {
                if comm.rank() != owner {
                    others += 1;
                } else {
                    mine += 1;
                    if !self.is_independent_score(min_score) {
                        condition.union_with(seed);
                        min_score = min_score.min(self.assoc_score(x, y, &condition));
                    }
                }
                if mine + others == threshold * comm.size() as u32 {
                    min_score = comm.allreduce_min(min_score);
                    if self.is_independent_score(min_score) {
                        return true;
                    }
                    mine = 0;
                    others = 0;
                }
                owner = (owner + 1) % comm.size();
            }
        }
        min_score = comm.allreduce_min(min_score);
        self.is_independent_score(min_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CtCounter;

    fn xy_dependent() -> DiscreteData<CtCounter> {
        let mut x: Vec<u8> = vec![0; 50];
        x.extend(vec![1; 50]);
        let data: Vec<u8> = x.iter().chain(x.iter()).copied().collect();
        let counter = CtCounter::new(2, 100, data).unwrap();
        DiscreteData::new(counter, &["x".into(), "y".into()], 0.05).unwrap()
    }

    #[test]
    fn names_round_trip() {
        let data = xy_dependent();
        assert_eq!(data.var_index("y"), Some(1));
        assert_eq!(data.var_name(1), "y");
        assert_eq!(data.var_index("z"), None);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let counter = CtCounter::new(2, 2, vec![0, 1, 0, 1]).unwrap();
        assert!(matches!(
            DiscreteData::new(counter, &["x".into(), "x".into()], 0.05),
            Err(Error::DuplicateVariableName(_))
        ));
    }

    #[test]
    fn alpha_outside_unit_interval_is_rejected() {
        let counter = CtCounter::new(2, 2, vec![0, 1, 0, 1]).unwrap();
        assert!(matches!(
            DiscreteData::new(counter, &["x".into(), "y".into()], 1.0),
            Err(Error::InvalidAlpha(_))
        ));
    }

    #[test]
    fn chi_squared_critical_value() {
        // G² = 2m·ln2 with df = 1 sits far beyond the 3.841 critical value.
        let data = xy_dependent();
        let none = VarSet::new(2);
        assert!(data.p_value(0, 1, &none) < 1e-12);
        assert!(!data.is_independent(0, 1, &none));
        assert!(data.assoc_score(0, 1, &none) > 0.999);
    }

    #[test]
    fn min_assoc_over_empty_given_is_the_marginal_score() {
        let data = xy_dependent();
        let none = VarSet::new(2);
        let marginal = data.assoc_score(0, 1, &none);
        assert_eq!(data.min_assoc_score(0, 1, &none, 3), marginal);
        let (score, subset) = data.min_assoc_score_subset(0, 1, &none, 3);
        assert_eq!(score, marginal);
        assert!(subset.is_empty());
    }
}
