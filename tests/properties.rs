//! Property-based invariants: the subset enumerator, the set container, and
//! the symmetry of the independence oracle.

use markov_blanket::{CtCounter, DiscreteData, VarSet};
use proptest::collection::vec;
use proptest::prelude::*;

fn binomial(n: usize, r: usize) -> usize {
    if r > n {
        return 0;
    }
    (0..r).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

proptest! {
    #[test]
    fn subset_enumeration_is_complete_distinct_and_ordered(
        members in vec(0u16..24, 0..10),
        radius in 0usize..6,
    ) {
        let set = VarSet::from_iter_with(24, members);
        let all: Vec<VarSet> = set.subsets(radius).collect();
        prop_assert_eq!(all.len(), binomial(set.len(), radius));
        for subset in &all {
            prop_assert_eq!(subset.len(), radius);
            prop_assert!(subset.iter().all(|v| set.contains(v)));
        }
        for pair in all.windows(2) {
            let a: Vec<u16> = pair[0].iter().collect();
            let b: Vec<u16> = pair[1].iter().collect();
            prop_assert!(a < b);
        }
    }

    #[test]
    fn set_operations_are_idempotent(members in vec(0u16..32, 0..12)) {
        let set = VarSet::from_iter_with(32, members.clone());
        let twice = VarSet::from_iter_with(32, members.iter().chain(members.iter()).copied());
        prop_assert_eq!(&set, &twice);

        let mut union = set.clone();
        union.union_with(&set);
        prop_assert_eq!(&union, &set);

        let mut nothing = set.clone();
        nothing.difference_with(&set);
        prop_assert!(nothing.is_empty());

        for &v in &members {
            let removed = set.without(v);
            prop_assert!(!removed.contains(v));
            prop_assert_eq!(removed.with(v), set.clone());
        }
    }

    #[test]
    fn p_values_are_probabilities_and_exactly_symmetric(
        x_row in vec(0u8..3, 48),
        y_row in vec(0u8..3, 48),
        z_row in vec(0u8..2, 48),
    ) {
        let data: Vec<u8> = [x_row, y_row, z_row].concat();
        let counter = CtCounter::new(3, 48, data).unwrap();
        let names = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let data = DiscreteData::new(counter, &names, 0.05).unwrap();

        let empty = VarSet::new(3);
        let z = VarSet::from_iter_with(3, [2u16]);
        for given in [&empty, &z] {
            let forward = data.p_value(0, 1, given);
            let backward = data.p_value(1, 0, given);
            prop_assert!((0.0..=1.0).contains(&forward));
            prop_assert_eq!(forward.to_bits(), backward.to_bits());
        }
    }
}
