//! Counting queries over the observation table.
//!
//! The counter is the only component that touches the raw data. Everything
//! above it (the G² test, the discovery algorithms) sees nothing but joint
//! count tables over small variable sets.

use crate::{Error, Var};

/// Answers joint counting queries over a discrete dataset.
pub trait Counter {
    /// Number of variables in the dataset.
    fn num_vars(&self) -> usize;

    /// Number of observations in the dataset.
    fn num_obs(&self) -> usize;

    /// Number of categories of variable `v`, as observed in the data.
    fn arity(&self, v: Var) -> usize;

    /// Dense joint count table over `vars`.
    ///
    /// The table has `Π arity(v)` cells in mixed-radix order with the last
    /// listed variable varying fastest: the cell for the assignment
    /// `(c_0, …, c_{k-1})` sits at `((c_0·a_1 + c_1)·a_2 + c_2)…`.
    /// Queries never exceed `max_conditioning + 2` variables.
    fn counts(&self, vars: &[Var]) -> Vec<u32>;
}

/// Contingency-table counter: owns the observation table in variable-major
/// layout (one contiguous row of `m` category codes per variable) so a joint
/// count over a handful of variables walks a handful of contiguous rows.
pub struct CtCounter {
    n: usize,
    m: usize,
    arities: Vec<usize>,
    data: Vec<u8>,
}

impl CtCounter {
    /// Builds the counter from a variable-major table of `n · m` category
    /// codes. Arities are derived from the data as `max code + 1`.
    pub fn new(n: usize, m: usize, data: Vec<u8>) -> Result<Self, Error> {
        if data.len() != n * m {
            return Err(Error::ShapeMismatch {
                axis: "cells",
                expected: n * m,
                found: data.len(),
            });
        }
        let arities = (0..n)
            .map(|v| {
                let row = &data[v * m..(v + 1) * m];
                row.iter().copied().max().map_or(1, |c| c as usize + 1)
            })
            .collect();
        Ok(CtCounter { n, m, arities, data })
    }

    fn row(&self, v: Var) -> &[u8] {
        let v = v as usize;
        &self.data[v * self.m..(v + 1) * self.m]
    }
}

impl Counter for CtCounter {
    fn num_vars(&self) -> usize {
        self.n
    }

    fn num_obs(&self) -> usize {
        self.m
    }

    fn arity(&self, v: Var) -> usize {
        self.arities[v as usize]
    }

    fn counts(&self, vars: &[Var]) -> Vec<u32> {
        let cells: usize = vars.iter().map(|&v| self.arity(v)).product();
        let mut table = vec![0u32; cells];
        let rows: Vec<&[u8]> = vars.iter().map(|&v| self.row(v)).collect();
        let arities: Vec<usize> = vars.iter().map(|&v| self.arity(v)).collect();
        for j in 0..self.m {
            let mut idx = 0;
            for (row, &arity) in rows.iter().zip(arities.iter()) {
                idx = idx * arity + row[j] as usize;
            }
            table[idx] += 1;
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> CtCounter {
        // Two variables over six observations, variable-major.
        //   x: 0 0 1 1 2 2
        //   y: 0 1 0 1 0 1
        CtCounter::new(2, 6, vec![0, 0, 1, 1, 2, 2, 0, 1, 0, 1, 0, 1]).unwrap()
    }

    #[test]
    fn arities_come_from_the_data() {
        let c = tiny();
        assert_eq!(c.arity(0), 3);
        assert_eq!(c.arity(1), 2);
    }

    #[test]
    fn joint_counts_are_mixed_radix_last_fastest() {
        let c = tiny();
        assert_eq!(c.counts(&[0, 1]), vec![1, 1, 1, 1, 1, 1]);
        assert_eq!(c.counts(&[1, 0]), vec![1, 1, 1, 1, 1, 1]);
        assert_eq!(c.counts(&[0]), vec![2, 2, 2]);
        assert_eq!(c.counts(&[1]), vec![3, 3]);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        assert!(matches!(
            CtCounter::new(2, 4, vec![0; 7]),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
