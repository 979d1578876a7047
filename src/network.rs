//! Whole-network assembly: per-target neighborhoods, the symmetric AND
//! correction, optional collider orientation, and Graphviz output.

use crate::comm::{wire, Communicator};
use crate::counter::Counter;
use crate::discovery::{pair_key, Learner, SepsetMap};
use crate::set::VarSet;
use crate::{Error, Var};
use std::collections::BTreeSet;
use std::io;
use std::path::Path;

/// The learned skeleton over all variables, with an optional orientation for
/// each edge.
pub struct Graph {
    names: Vec<String>,
    adjacency: Vec<VarSet>,
    /// Collider orientations as (tail, head) pairs.
    arrows: BTreeSet<(Var, Var)>,
}

impl Graph {
    pub(crate) fn new(names: Vec<String>, adjacency: Vec<VarSet>, arrows: BTreeSet<(Var, Var)>) -> Self {
        Graph {
            names,
            adjacency,
            arrows,
        }
    }

    /// Number of variables (nodes).
    pub fn num_vars(&self) -> usize {
        self.names.len()
    }

    /// The neighbors of `v` in the skeleton.
    pub fn neighbors(&self, v: Var) -> &VarSet {
        &self.adjacency[v as usize]
    }

    /// Whether the skeleton joins `u` and `v`.
    pub fn has_edge(&self, u: Var, v: Var) -> bool {
        self.adjacency[u as usize].contains(v)
    }

    /// Whether the edge `u`–`v` was oriented as `u → v`.
    pub fn is_oriented(&self, tail: Var, head: Var) -> bool {
        self.arrows.contains(&(tail, head))
    }

    /// All edges as `(u, v)` pairs with `u < v`, in ascending order.
    pub fn edges(&self) -> Vec<(Var, Var)> {
        let mut edges = Vec::new();
        for u in 0..self.num_vars() as Var {
            for v in self.adjacency[u as usize].iter() {
                if u < v {
                    edges.push((u, v));
                }
            }
        }
        edges
    }

    /// Writes the graph in Graphviz DOT form. With `directed`, the header is
    /// `digraph`, oriented edges use `->` and the rest keep `--`; otherwise
    /// the whole graph is undirected.
    pub fn write_graphviz<W: io::Write>(&self, mut out: W, directed: bool) -> io::Result<()> {
        writeln!(out, "{} {{", if directed { "digraph" } else { "graph" })?;
        for (i, name) in self.names.iter().enumerate() {
            writeln!(out, "  v{} [label=\"{}\"];", i, name.replace('"', "\\\""))?;
        }
        for (u, v) in self.edges() {
            if directed && self.is_oriented(u, v) {
                writeln!(out, "  v{} -> v{};", u, v)?;
            } else if directed && self.is_oriented(v, u) {
                writeln!(out, "  v{} -> v{};", v, u)?;
            } else {
                writeln!(out, "  v{} -- v{};", u, v)?;
            }
        }
        writeln!(out, "}}")
    }

    /// Writes the DOT form to a file.
    pub fn write_graphviz_file<P: AsRef<Path>>(&self, path: P, directed: bool) -> Result<(), Error> {
        let file = std::fs::File::create(path)?;
        self.write_graphviz(io::BufWriter::new(file), directed)?;
        Ok(())
    }
}

impl<'a, C: Counter> Learner<'a, C> {
    /// Learns the whole-network skeleton: per-target candidate neighborhoods,
    /// the AND rule, and (optionally) collider orientation.
    ///
    /// With `parallel`, the targets are sharded across the communicator's
    /// ranks and the per-rank results are allgathered before the AND rule;
    /// `imbalance_threshold` > 0 enables rebalancing of the remaining targets
    /// whenever the most loaded rank exceeds the average load by more than
    /// that fraction.
    pub fn network(&self, direct_edges: bool, parallel: bool, imbalance_threshold: f64) -> Graph {
        let n = self.data.num_vars();
        let mut neighborhoods = vec![VarSet::new(n); n];
        let mut sepsets = SepsetMap::new();
        if parallel {
            self.neighborhoods_sharded(
                &mut neighborhoods,
                &mut sepsets,
                imbalance_threshold,
                direct_edges,
            );
        } else {
            for t in 0..n as Var {
                neighborhoods[t as usize] =
                    self.candidate_parents_children(t, false, &mut sepsets);
            }
        }

        // The AND rule: spurious asymmetric findings disappear here.
        let mut adjacency = vec![VarSet::new(n); n];
        for u in 0..n as Var {
            for v in neighborhoods[u as usize].iter() {
                if u < v && neighborhoods[v as usize].contains(u) {
                    adjacency[u as usize].insert(v);
                    adjacency[v as usize].insert(u);
                }
            }
        }

        let arrows = if direct_edges {
            orient_colliders(&adjacency, &sepsets)
        } else {
            BTreeSet::new()
        };

        let names = (0..n as Var)
            .map(|v| self.data.var_name(v).to_string())
            .collect();
        Graph::new(names, adjacency, arrows)
    }

    /// Computes the candidate neighborhoods with the targets sharded across
    /// ranks, rebalancing between batches, then allgathers the results (and
    /// the recorded separating sets, when orientation needs them).
    fn neighborhoods_sharded(
        &self,
        neighborhoods: &mut [VarSet],
        sepsets: &mut SepsetMap,
        imbalance_threshold: f64,
        direct_edges: bool,
    ) {
        let n = self.data.num_vars();
        let size = self.comm.size();
        let rank = self.comm.rank();
        let chunk = |targets: &[Var], r: usize| -> Vec<Var> {
            targets[r * targets.len() / size..(r + 1) * targets.len() / size].to_vec()
        };

        let all_targets: Vec<Var> = (0..n as Var).collect();
        let mut remaining = chunk(&all_targets, rank);
        let mut computed: Vec<(Var, VarSet)> = Vec::new();
        let batch = (n / (4 * size)).max(1);
        loop {
            for _ in 0..batch {
                if remaining.is_empty() {
                    break;
                }
                let t = remaining.remove(0);
                computed.push((t, self.candidate_parents_children(t, false, sepsets)));
            }

            let mut count = Vec::new();
            wire::push_u16(&mut count, remaining.len() as Var);
            let counts: Vec<usize> = self
                .comm
                .allgather_bytes(&count)
                .into_iter()
                .map(|bytes| wire::U16Reader::new(&bytes).read() as usize)
                .collect();
            let total: usize = counts.iter().sum();
            if total == 0 {
                break;
            }
            let max = *counts.iter().max().unwrap();
            let average = total as f64 / size as f64;
            if imbalance_threshold > 0.0 && max as f64 > (1.0 + imbalance_threshold) * average {
                log::debug!(
                    "rebalancing {} remaining targets (max load {}, average {:.1})",
                    total,
                    max,
                    average
                );
                let mut payload = Vec::new();
                for &t in &remaining {
                    wire::push_u16(&mut payload, t);
                }
                let mut pooled = Vec::with_capacity(total);
                for bytes in self.comm.allgather_bytes(&payload) {
                    let mut reader = wire::U16Reader::new(&bytes);
                    while !reader.is_done() {
                        pooled.push(reader.read());
                    }
                }
                pooled.sort_unstable();
                remaining = chunk(&pooled, rank);
            }
        }

        // Exchange the neighborhoods.
        let mut payload = Vec::new();
        for (t, set) in &computed {
            wire::push_u16(&mut payload, *t);
            wire::push_list(&mut payload, set.iter(), set.len());
        }
        for bytes in self.comm.allgather_bytes(&payload) {
            let mut reader = wire::U16Reader::new(&bytes);
            while !reader.is_done() {
                let t = reader.read();
                let members = reader.read_list();
                neighborhoods[t as usize] = VarSet::from_iter_with(n, members);
            }
        }

        // Orientation needs every rank to know every separating set.
        if direct_edges {
            let mut payload = Vec::new();
            for ((a, b), found) in sepsets.iter() {
                for set in found {
                    wire::push_u16(&mut payload, *a);
                    wire::push_u16(&mut payload, *b);
                    wire::push_list(&mut payload, set.iter(), set.len());
                }
            }
            let gathered = self.comm.allgather_bytes(&payload);
            sepsets.clear();
            for bytes in gathered {
                let mut reader = wire::U16Reader::new(&bytes);
                while !reader.is_done() {
                    let a = reader.read();
                    let b = reader.read();
                    let members = reader.read_list();
                    sepsets
                        .entry((a, b))
                        .or_default()
                        .push(VarSet::from_iter_with(n, members));
                }
            }
        }
    }
}

/// Orients every unshielded triple `u − w − v` as a collider `u → w ← v`
/// when a separating set was recorded for `(u, v)` and none of the recorded
/// sets contains `w`. The first orientation of an edge wins.
fn orient_colliders(adjacency: &[VarSet], sepsets: &SepsetMap) -> BTreeSet<(Var, Var)> {
    let mut arrows: BTreeSet<(Var, Var)> = BTreeSet::new();
    let mut add = |arrows: &mut BTreeSet<(Var, Var)>, tail: Var, head: Var| {
        if arrows.contains(&(head, tail)) {
            log::debug!("conflicting orientation for edge {}-{}; keeping the first", tail, head);
        } else {
            arrows.insert((tail, head));
        }
    };
    for (w, neighbors) in adjacency.iter().enumerate() {
        let w = w as Var;
        let nbrs: Vec<Var> = neighbors.iter().collect();
        for (i, &u) in nbrs.iter().enumerate() {
            for &v in &nbrs[i + 1..] {
                if adjacency[u as usize].contains(v) {
                    continue;
                }
                match sepsets.get(&pair_key(u, v)) {
                    Some(found) if !found.iter().any(|s| s.contains(w)) => {
                        add(&mut arrows, u, w);
                        add(&mut arrows, v, w);
                    }
                    _ => {}
                }
            }
        }
    }
    arrows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Graph {
        // a - c, b - c, c - d; a → c ← b oriented.
        let n = 4;
        let mut adjacency = vec![VarSet::new(n); n];
        for (u, v) in [(0u16, 2u16), (1, 2), (2, 3)] {
            adjacency[u as usize].insert(v);
            adjacency[v as usize].insert(u);
        }
        let arrows = BTreeSet::from([(0, 2), (1, 2)]);
        let names = ["a", "b", "c", "d"].map(String::from).to_vec();
        Graph::new(names, adjacency, arrows)
    }

    #[test]
    fn edges_are_ascending_unordered_pairs() {
        assert_eq!(diamond().edges(), vec![(0, 2), (1, 2), (2, 3)]);
    }

    #[test]
    fn undirected_dot_output() {
        let mut out = Vec::new();
        diamond().write_graphviz(&mut out, false).unwrap();
        let dot = String::from_utf8(out).unwrap();
        assert!(dot.starts_with("graph {"));
        assert!(dot.contains("  v0 [label=\"a\"];"));
        assert!(dot.contains("  v0 -- v2;"));
        assert!(!dot.contains("->"));
    }

    #[test]
    fn directed_dot_output_mixes_arrow_kinds() {
        let mut out = Vec::new();
        diamond().write_graphviz(&mut out, true).unwrap();
        let dot = String::from_utf8(out).unwrap();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("  v0 -> v2;"));
        assert!(dot.contains("  v1 -> v2;"));
        assert!(dot.contains("  v2 -- v3;"));
    }

    #[test]
    fn collider_needs_a_recorded_sepset() {
        let n = 3;
        let mut adjacency = vec![VarSet::new(n); n];
        for (u, v) in [(0u16, 2u16), (1, 2)] {
            adjacency[u as usize].insert(v);
            adjacency[v as usize].insert(u);
        }
        // No sepset recorded for (0, 1): nothing is oriented.
        assert!(orient_colliders(&adjacency, &SepsetMap::new()).is_empty());

        // An empty sepset orients the collider; one containing the middle
        // node blocks it.
        let mut sepsets = SepsetMap::new();
        sepsets.insert((0, 1), vec![VarSet::new(n)]);
        let arrows = orient_colliders(&adjacency, &sepsets);
        assert_eq!(arrows, BTreeSet::from([(0, 2), (1, 2)]));

        sepsets.insert((0, 1), vec![VarSet::from_iter_with(n, [2])]);
        assert!(orient_colliders(&adjacency, &sepsets).is_empty());
    }
}
