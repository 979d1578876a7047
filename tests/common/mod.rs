//! Synthetic datasets with exactly factorizing counts, so every
//! independence the generating structure implies holds with G² = 0 (p = 1)
//! and every dependence is overwhelming. That makes the discovery results
//! deterministic without shipping sampled reference data.

/// A chain A – B – C plus an isolated D.
///
/// Per value of B the joint counts of (A, C) are an exact outer product of
/// the margins, so `A ⫫ C | B` holds exactly; marginally all three chain
/// variables are strongly dependent. D is a balanced copy of the whole table,
/// independent of everything in every stratum.
pub fn chain_dataset() -> (Vec<String>, Vec<u8>, usize, usize) {
    // Counts per (b, a, c) cell of one 32-observation block.
    const CELLS: [[[u8; 2]; 2]; 2] = [[[9, 3], [3, 1]], [[1, 3], [3, 9]]];
    let mut obs: Vec<[u8; 4]> = Vec::new();
    for _ in 0..30 {
        for (b, by_a) in CELLS.iter().enumerate() {
            for (a, by_c) in by_a.iter().enumerate() {
                for (c, &count) in by_c.iter().enumerate() {
                    for _ in 0..count {
                        obs.push([a as u8, b as u8, c as u8, 0]);
                    }
                }
            }
        }
    }
    let half = obs.len();
    for i in 0..half {
        let mut copy = obs[i];
        copy[3] = 1;
        obs.push(copy);
    }
    let names = ["A", "B", "C", "D"].map(String::from).to_vec();
    let (n, m) = (4, obs.len());
    (names, to_variable_major(&obs, n), n, m)
}

/// A collider A → C ← B with `C = A AND B` over a uniform (A, B) grid.
///
/// A and B are exactly independent marginally and strongly dependent given
/// C, which is what the collider orientation rule keys on.
pub fn collider_dataset() -> (Vec<String>, Vec<u8>, usize, usize) {
    let mut obs: Vec<[u8; 3]> = Vec::new();
    for _ in 0..10 {
        for a in 0..2u8 {
            for b in 0..2u8 {
                for _ in 0..8 {
                    obs.push([a, b, a & b]);
                }
            }
        }
    }
    let names = ["A", "B", "C"].map(String::from).to_vec();
    let (n, m) = (3, obs.len());
    (names, to_variable_major(&obs, n), n, m)
}

/// A diamond A → B, A → C, B → D, C → D over binary variables.
///
/// Counts are `1024 · P(a) P(b|a) P(c|a) P(d|b,c)` with P(a=1) = 1/2,
/// P(b=1|a) = P(c=1|a) ∈ {1/4, 3/4} and P(d=1|b,c) ∈ {1/8, 1/2, 1/2, 7/8},
/// all of which are exact in integers. So `B ⫫ C | A` and `A ⫫ D | {B, C}`
/// hold with G² = 0 exactly, while every other conditional dependence the
/// diamond implies stays decisive. The separating set of (A, D) is {B, C}:
/// non-empty and distinct from either shared neighbor, so the spouse tests
/// genuinely depend on the separating sets recorded during discovery.
pub fn diamond_dataset() -> (Vec<String>, Vec<u8>, usize, usize) {
    // Rows are (a, b, c) in binary order; columns are d = 0, 1.
    const COUNTS: [[u16; 2]; 8] = [
        [252, 36],
        [48, 48],
        [48, 48],
        [4, 28],
        [28, 4],
        [48, 48],
        [48, 48],
        [36, 252],
    ];
    let mut obs: Vec<[u8; 4]> = Vec::new();
    for (abc, by_d) in COUNTS.iter().enumerate() {
        let (a, b, c) = ((abc >> 2) as u8, (abc >> 1) as u8 & 1, abc as u8 & 1);
        for (d, &count) in by_d.iter().enumerate() {
            for _ in 0..count {
                obs.push([a, b, c, d as u8]);
            }
        }
    }
    let names = ["A", "B", "C", "D"].map(String::from).to_vec();
    let (n, m) = (4, obs.len());
    (names, to_variable_major(&obs, n), n, m)
}

fn to_variable_major<const N: usize>(obs: &[[u8; N]], n: usize) -> Vec<u8> {
    let mut data = vec![0u8; n * obs.len()];
    for (j, row) in obs.iter().enumerate() {
        for v in 0..n {
            data[v * obs.len() + j] = row[v];
        }
    }
    data
}
