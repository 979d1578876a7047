//! The G² likelihood-ratio statistic for conditional independence.
//!
//! `G² = 2 Σ N(x,y,z) · ln(N(x,y,z)·N(z) / (N(x,z)·N(y,z)))`, summed over the
//! cells with a positive count, with `(|X|−1)(|Y|−1)` degrees of freedom per
//! non-empty conditioning stratum. Under the independence hypothesis G² is
//! asymptotically chi-squared distributed with those degrees of freedom.

use crate::counter::Counter;
use crate::set::VarSet;
use crate::Var;

/// The statistic and its degrees of freedom for one test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GSquare {
    /// Degrees of freedom, counting only populated conditioning strata.
    pub df: u64,
    /// The G² statistic.
    pub g2: f64,
}

/// Computes G² and its degrees of freedom for `I(x; y | cond)`.
///
/// Strata with `N(z) = 0` contribute neither to the statistic nor to the
/// degrees of freedom; cells with `N(x,y,z) = 0` are skipped inside a
/// stratum. Everything is accumulated in `f64`; the counts themselves fit in
/// `u32` (the driver warns when the number of observations approaches the
/// point where that stops being true).
pub fn g_square<C: Counter>(counter: &C, x: Var, y: Var, cond: &VarSet) -> GSquare {
    let ax = counter.arity(x);
    let ay = counter.arity(y);
    let mut vars: Vec<Var> = cond.iter().collect();
    let strata: usize = vars.iter().map(|&z| counter.arity(z)).product();
    vars.push(x);
    vars.push(y);
    let table = counter.counts(&vars);

    let mut df = 0u64;
    let mut g2 = 0.0f64;
    let mut n_xz = vec![0u32; ax];
    let mut n_yz = vec![0u32; ay];
    for stratum in table.chunks_exact(ax * ay).take(strata.max(1)) {
        let n_z: u32 = stratum.iter().sum();
        if n_z == 0 {
            continue;
        }
        df += (ax as u64 - 1) * (ay as u64 - 1);

        n_xz.iter_mut().for_each(|c| *c = 0);
        n_yz.iter_mut().for_each(|c| *c = 0);
        for xi in 0..ax {
            for yi in 0..ay {
                let c = stratum[xi * ay + yi];
                n_xz[xi] += c;
                n_yz[yi] += c;
            }
        }

        for xi in 0..ax {
            for yi in 0..ay {
                let c = stratum[xi * ay + yi];
                if c > 0 {
                    let ratio =
                        (c as f64 * n_z as f64) / (n_xz[xi] as f64 * n_yz[yi] as f64);
                    g2 += c as f64 * ratio.ln();
                }
            }
        }
    }
    GSquare { df, g2: 2.0 * g2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CtCounter;

    #[test]
    fn exact_independence_gives_zero() {
        // Joint counts are exactly the product of the margins:
        // x margin (60, 40), y margin (50, 50), cells 30/30/20/20.
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (xi, yi, c) in [(0, 0, 30), (0, 1, 30), (1, 0, 20), (1, 1, 20)] {
            x.extend(std::iter::repeat(xi).take(c));
            y.extend(std::iter::repeat(yi).take(c));
        }
        let data: Vec<u8> = x.into_iter().chain(y).collect();
        let counter = CtCounter::new(2, 100, data).unwrap();
        let r = g_square(&counter, 0, 1, &VarSet::new(2));
        assert_eq!(r.df, 1);
        assert_eq!(r.g2, 0.0);
    }

    #[test]
    fn perfect_dependence_is_two_m_ln_two() {
        let mut row: Vec<u8> = vec![0; 50];
        row.extend(vec![1; 50]);
        let data: Vec<u8> = row.iter().chain(row.iter()).copied().collect();
        let counter = CtCounter::new(2, 100, data).unwrap();
        let r = g_square(&counter, 0, 1, &VarSet::new(2));
        assert_eq!(r.df, 1);
        assert!((r.g2 - 200.0 * std::f64::consts::LN_2).abs() < 1e-9);
    }

    #[test]
    fn empty_strata_are_excluded_from_df() {
        // z takes the value 0 only, although a second category would be
        // possible if w ever varied with it; condition on both z and w where
        // w = z so half the (z, w) strata are empty.
        let x = vec![0u8, 1, 0, 1, 0, 1, 0, 1];
        let y = vec![0u8, 0, 1, 1, 0, 0, 1, 1];
        let z = vec![0u8, 0, 0, 0, 1, 1, 1, 1];
        let w = z.clone();
        let data: Vec<u8> = [x, y, z, w].concat();
        let counter = CtCounter::new(4, 8, data).unwrap();
        let cond = VarSet::from_iter_with(4, [2, 3]);
        let r = g_square(&counter, 0, 1, &cond);
        // Four (z, w) strata, only (0,0) and (1,1) are populated.
        assert_eq!(r.df, 2);
    }

    #[test]
    fn statistic_is_symmetric_in_x_and_y() {
        let x = vec![0u8, 0, 1, 1, 2, 2, 0, 1];
        let y = vec![0u8, 1, 0, 1, 0, 1, 1, 1];
        let data: Vec<u8> = [x, y].concat();
        let counter = CtCounter::new(2, 8, data).unwrap();
        let none = VarSet::new(2);
        let a = g_square(&counter, 0, 1, &none);
        let b = g_square(&counter, 1, 0, &none);
        assert_eq!(a.df, b.df);
        assert!((a.g2 - b.g2).abs() < 1e-12);
    }
}
