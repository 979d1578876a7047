//! The constraint-based discovery algorithms.
//!
//! Two families share one orchestration shell. The direct family (GS, IAMB,
//! Inter-IAMB) builds a Markov blanket candidate by alternating grow and
//! shrink phases; the topological family (MMPC, HITON, SI-HITON-PC, GetPC)
//! builds a parents-and-children candidate by admitting variables that
//! survive an any-subset independence test against the current candidate set
//! and re-screening the members afterwards. Either family answers both the
//! blanket and the parents-and-children query through the usual derivations,
//! and both apply the symmetric AND correction per target.
//!
//! The algorithms follow Margaritis & Thrun (grow-shrink), Tsamardinos et
//! al. (IAMB and max-min parents-and-children), Aliferis et al. (HITON), and
//! Peña et al. (GetPC).

use crate::comm::Communicator;
use crate::counter::Counter;
use crate::data::DiscreteData;
use crate::set::VarSet;
use crate::{Error, Var};
use std::collections::HashMap;

/// The discovery algorithms, a closed set dispatched by [`Learner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    /// Grow-shrink blanket discovery.
    Gs,
    /// Incremental-association blanket discovery.
    Iamb,
    /// IAMB with a shrink pass interleaved after every addition.
    InterIamb,
    /// Max-min parents-and-children with deferred re-screening.
    Mmpc,
    /// HITON-PC with full interleaved re-screening.
    Hiton,
    /// Semi-interleaved HITON-PC.
    SiHitonPc,
    /// GetPC with its per-admission sepset test.
    GetPc,
}

impl Algorithm {
    /// Every supported algorithm, in the order used for error messages.
    pub const ALL: [Algorithm; 7] = [
        Algorithm::Gs,
        Algorithm::Iamb,
        Algorithm::InterIamb,
        Algorithm::Mmpc,
        Algorithm::Hiton,
        Algorithm::SiHitonPc,
        Algorithm::GetPc,
    ];

    /// The command-line name of the algorithm.
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Gs => "gs",
            Algorithm::Iamb => "iamb",
            Algorithm::InterIamb => "inter.iamb",
            Algorithm::Mmpc => "mmpc",
            Algorithm::Hiton => "hiton",
            Algorithm::SiHitonPc => "si.hiton.pc",
            Algorithm::GetPc => "getpc",
        }
    }

    /// Looks an algorithm up by its command-line name.
    pub fn from_name(name: &str) -> Result<Algorithm, Error> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_owned()))
    }

    /// Whether this algorithm discovers the blanket directly (the
    /// alternative being discovery of the parents-and-children set first).
    pub fn is_direct(self) -> bool {
        matches!(self, Algorithm::Gs | Algorithm::Iamb | Algorithm::InterIamb)
    }
}

/// Conditioning sets that established an independence during discovery,
/// keyed by the unordered variable pair.
pub type SepsetMap = HashMap<(Var, Var), Vec<VarSet>>;

pub(crate) fn pair_key(a: Var, b: Var) -> (Var, Var) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Per-target neighborhood discovery over a dataset.
pub struct Learner<'a, C: Counter> {
    pub(crate) data: &'a DiscreteData<C>,
    pub(crate) comm: &'a dyn Communicator,
    pub(crate) algorithm: Algorithm,
    pub(crate) max_conditioning: usize,
    pub(crate) distributed: bool,
}

impl<'a, C: Counter> Learner<'a, C> {
    /// Creates a learner. `max_conditioning` bounds the size of every
    /// conditioning set; `distributed` routes the any-subset searches of
    /// single-target queries through the communicator so all ranks share the
    /// enumeration work.
    pub fn new(
        data: &'a DiscreteData<C>,
        comm: &'a dyn Communicator,
        algorithm: Algorithm,
        max_conditioning: usize,
        distributed: bool,
    ) -> Self {
        Learner {
            data,
            comm,
            algorithm,
            max_conditioning: max_conditioning.min(data.num_vars()),
            distributed,
        }
    }

    /// The Markov blanket of `target`, symmetry-corrected: a variable stays
    /// only if `target` also shows up in its candidate blanket.
    pub fn markov_blanket(&self, target: Var) -> VarSet {
        let mut sepsets = SepsetMap::new();
        let candidate = self.candidate_blanket(target, self.distributed, &mut sepsets);
        let mut blanket = VarSet::new(self.data.num_vars());
        for v in candidate.iter() {
            let mut scratch = SepsetMap::new();
            if self
                .candidate_blanket(v, self.distributed, &mut scratch)
                .contains(target)
            {
                blanket.insert(v);
            }
        }
        log::debug!("MB({}) = {:?}", target, blanket);
        blanket
    }

    /// The parents-and-children set of `target`, symmetry-corrected.
    pub fn parents_children(&self, target: Var) -> VarSet {
        let mut sepsets = SepsetMap::new();
        let candidate = self.candidate_parents_children(target, self.distributed, &mut sepsets);
        let mut pc = VarSet::new(self.data.num_vars());
        for v in candidate.iter() {
            let mut scratch = SepsetMap::new();
            if self
                .candidate_parents_children(v, self.distributed, &mut scratch)
                .contains(target)
            {
                pc.insert(v);
            }
        }
        log::debug!("PC({}) = {:?}", target, pc);
        pc
    }

    /// The blanket or the parents-and-children set, as selected.
    pub fn neighborhood(&self, target: Var, blanket: bool) -> VarSet {
        if blanket {
            self.markov_blanket(target)
        } else {
            self.parents_children(target)
        }
    }

    /// The candidate Markov blanket of `target`, before symmetry correction.
    pub(crate) fn candidate_blanket(
        &self,
        target: Var,
        dist: bool,
        sepsets: &mut SepsetMap,
    ) -> VarSet {
        if self.algorithm.is_direct() {
            self.grow_shrink(target, self.algorithm == Algorithm::InterIamb)
        } else {
            let cpc = self.candidate_parents_children(target, dist, sepsets);
            self.add_spouses(target, &cpc, dist, sepsets)
        }
    }

    /// The candidate parents-and-children set of `target`, before symmetry
    /// correction.
    pub(crate) fn candidate_parents_children(
        &self,
        target: Var,
        dist: bool,
        sepsets: &mut SepsetMap,
    ) -> VarSet {
        if self.algorithm.is_direct() {
            let blanket = self.candidate_blanket(target, dist, sepsets);
            let mut pc = VarSet::new(self.data.num_vars());
            for y in blanket.iter() {
                let rest = blanket.without(y);
                if !self.screened_out(target, y, &rest, dist, sepsets) {
                    pc.insert(y);
                }
            }
            pc
        } else {
            self.topological_parents_children(target, dist, sepsets)
        }
    }

    /// The dependent candidate with the strongest association to `target`
    /// given the current blanket; ties go to the lowest variable index.
    pub(crate) fn strongest_candidate(&self, target: Var, blanket: &VarSet) -> Option<(Var, f64)> {
        let mut best: Option<(Var, f64)> = None;
        for v in 0..self.data.num_vars() as Var {
            if v == target || blanket.contains(v) {
                continue;
            }
            let p = self.data.p_value(target, v, blanket);
            if p > self.data.alpha() {
                continue;
            }
            let score = 1.0 - p;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((v, score));
            }
        }
        best
    }

    /// Grow-shrink blanket construction. With `interleave` a full shrink pass
    /// follows every addition and the loop stops once an iteration leaves the
    /// blanket unchanged; otherwise the blanket grows to a fixed point first
    /// and shrinks once at the end.
    fn grow_shrink(&self, target: Var, interleave: bool) -> VarSet {
        let mut blanket = VarSet::new(self.data.num_vars());
        while let Some((v, _)) = self.strongest_candidate(target, &blanket) {
            let before = blanket.clone();
            blanket.insert(v);
            if interleave {
                self.shrink(target, &mut blanket);
                if blanket == before {
                    break;
                }
            }
        }
        if !interleave {
            self.shrink(target, &mut blanket);
        }
        blanket
    }

    /// Removes every member that is independent of `target` given the rest
    /// of the blanket, rescanning after each removal.
    fn shrink(&self, target: Var, blanket: &mut VarSet) {
        'scan: loop {
            for v in blanket.iter().collect::<Vec<_>>() {
                if self.data.is_independent(target, v, &blanket.without(v)) {
                    blanket.remove(v);
                    continue 'scan;
                }
            }
            break;
        }
    }

    /// Tests whether some subset of `given` separates `target` from `v`,
    /// recording a separating set whenever one exists.
    fn screened_out(
        &self,
        target: Var,
        v: Var,
        given: &VarSet,
        dist: bool,
        sepsets: &mut SepsetMap,
    ) -> bool {
        if dist {
            let independent = self.data.is_independent_any_subset_dist(
                target,
                v,
                given,
                self.max_conditioning,
                self.comm,
            );
            if independent {
                self.record_sepset(target, v, given, sepsets);
            }
            return independent;
        }
        let (score, subset) =
            self.data
                .min_assoc_score_subset(target, v, given, self.max_conditioning);
        if self.data.is_independent_score(score) {
            sepsets.entry(pair_key(target, v)).or_default().push(subset);
            true
        } else {
            false
        }
    }

    /// Recovers an argmin separating subset of `given` and records it.
    /// Every rank replays the same sequential search, so the recorded
    /// sepsets, and the spouse tests and orientations built on them, are
    /// identical on every rank and on the sequential path.
    fn record_sepset(&self, target: Var, v: Var, given: &VarSet, sepsets: &mut SepsetMap) {
        let (score, subset) =
            self.data
                .min_assoc_score_subset(target, v, given, self.max_conditioning);
        if self.data.is_independent_score(score) {
            sepsets.entry(pair_key(target, v)).or_default().push(subset);
        }
    }

    /// The seeded variant: enumerated subsets of `given` are unioned with
    /// `{seed}`. A separating set is recovered by an unseeded search over the
    /// full candidate set, whose enumeration space covers the seeded one.
    fn screened_out_seeded(
        &self,
        target: Var,
        v: Var,
        given: &VarSet,
        seed: Var,
        dist: bool,
        sepsets: &mut SepsetMap,
    ) -> bool {
        let seed_set = VarSet::from_iter_with(given.domain(), [seed]);
        let independent = if dist {
            self.data.is_independent_any_subset_seeded_dist(
                target,
                v,
                given,
                &seed_set,
                self.max_conditioning,
                self.comm,
            )
        } else {
            self.data.is_independent_any_subset_seeded(
                target,
                v,
                given,
                &seed_set,
                self.max_conditioning,
            )
        };
        if independent {
            self.record_sepset(target, v, &given.with(seed), sepsets);
        }
        independent
    }

    fn topological_parents_children(
        &self,
        target: Var,
        dist: bool,
        sepsets: &mut SepsetMap,
    ) -> VarSet {
        let n = self.data.num_vars();
        let empty = VarSet::new(n);
        // Candidates in decreasing order of marginal association, ties to
        // the lowest index.
        let mut queue: Vec<(Var, f64)> = (0..n as Var)
            .filter(|&v| v != target)
            .map(|v| (v, self.data.assoc_score(target, v, &empty)))
            .collect();
        queue.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut cpc = VarSet::new(n);
        for (v, _) in queue {
            if self.screened_out(target, v, &cpc, dist, sepsets) {
                continue;
            }
            cpc.insert(v);
            match self.algorithm {
                Algorithm::Hiton => self.rescreen(target, &mut cpc, dist, sepsets),
                Algorithm::SiHitonPc | Algorithm::GetPc => {
                    self.rescreen_seeded(target, &mut cpc, v, dist, sepsets)
                }
                _ => {}
            }
        }
        if matches!(self.algorithm, Algorithm::Mmpc | Algorithm::GetPc) {
            self.rescreen(target, &mut cpc, dist, sepsets);
        }
        cpc
    }

    /// Re-screens every member of `cpc` against the rest of the set until a
    /// full pass removes nothing.
    fn rescreen(&self, target: Var, cpc: &mut VarSet, dist: bool, sepsets: &mut SepsetMap) {
        'scan: loop {
            for w in cpc.iter().collect::<Vec<_>>() {
                if self.screened_out(target, w, &cpc.without(w), dist, sepsets) {
                    cpc.remove(w);
                    continue 'scan;
                }
            }
            break;
        }
    }

    /// One semi-interleaved pass: members other than the newly admitted
    /// `fresh` are re-screened only against conditioning sets that contain
    /// it.
    fn rescreen_seeded(
        &self,
        target: Var,
        cpc: &mut VarSet,
        fresh: Var,
        dist: bool,
        sepsets: &mut SepsetMap,
    ) {
        for w in cpc.iter().collect::<Vec<_>>() {
            if w == fresh {
                continue;
            }
            let given = cpc.without(w).without(fresh);
            if self.screened_out_seeded(target, w, &given, fresh, dist, sepsets) {
                cpc.remove(w);
            }
        }
    }

    /// Extends a parents-and-children candidate to a blanket candidate by
    /// recovering spouses: a non-neighbor in some neighbor's candidate set
    /// joins the blanket when conditioning on the recorded separating set
    /// plus the shared neighbor fails to separate it from `target`.
    fn add_spouses(
        &self,
        target: Var,
        cpc: &VarSet,
        dist: bool,
        sepsets: &mut SepsetMap,
    ) -> VarSet {
        let n = self.data.num_vars();
        let mut blanket = cpc.clone();
        for y in cpc.iter() {
            let mut scratch = SepsetMap::new();
            let pc_y = self.candidate_parents_children(y, dist, &mut scratch);
            for z in pc_y.iter() {
                if z == target || blanket.contains(z) {
                    continue;
                }
                let mut cond = sepsets
                    .get(&pair_key(target, z))
                    .and_then(|found| found.first())
                    .cloned()
                    .unwrap_or_else(|| VarSet::new(n));
                cond.insert(y);
                if !self.data.is_independent(target, z, &cond) {
                    blanket.insert(z);
                }
            }
        }
        blanket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SoloComm;
    use crate::counter::CtCounter;

    #[test]
    fn grow_ties_go_to_the_lowest_index() {
        // y and z are byte-identical copies of x, so their associations with
        // x tie exactly; the grow step must pick the lower index.
        let mut x: Vec<u8> = vec![0; 50];
        x.extend(vec![1; 50]);
        let data: Vec<u8> = [x.clone(), x.clone(), x].concat();
        let counter = CtCounter::new(3, 100, data).unwrap();
        let names = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let data = DiscreteData::new(counter, &names, 0.05).unwrap();
        let learner = Learner::new(&data, &SoloComm, Algorithm::Iamb, 3, false);
        let (picked, _) = learner.strongest_candidate(0, &VarSet::new(3)).unwrap();
        assert_eq!(picked, 1);
    }

    #[test]
    fn algorithm_names_round_trip() {
        for algo in Algorithm::ALL {
            assert_eq!(Algorithm::from_name(algo.name()).unwrap(), algo);
        }
        assert!(matches!(
            Algorithm::from_name("pc.stable"),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn direct_split_matches_the_families() {
        assert!(Algorithm::Gs.is_direct());
        assert!(Algorithm::InterIamb.is_direct());
        assert!(!Algorithm::Mmpc.is_direct());
        assert!(!Algorithm::GetPc.is_direct());
    }
}
