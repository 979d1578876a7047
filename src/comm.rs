//! The SPMD communicator the distributed layers run on.
//!
//! Every rank executes the same program and meets the others only at the
//! collectives below. The trait carries exactly the operations the discovery
//! protocol needs: a barrier, a minimum reduction, and a rank-ordered
//! all-gather of opaque payloads. [`SoloComm`] is the single-rank production
//! communicator; [`ThreadComm`] runs R ranks as OS threads in one process,
//! which is how the test suite checks that results are identical on every
//! rank and invariant to R.

use std::sync::{Arc, Barrier, Mutex};

/// Blocking collectives over a fixed set of ranks.
///
/// All methods must be called by every rank of the communicator, in the same
/// order; they behave like their MPI counterparts on a fixed communicator.
pub trait Communicator: Sync {
    /// This rank's index in `[0, size)`.
    fn rank(&self) -> usize;

    /// The number of ranks.
    fn size(&self) -> usize;

    /// Returns `true` on rank 0, which owns all user-visible output.
    fn is_first(&self) -> bool {
        self.rank() == 0
    }

    /// Blocks until every rank has entered the barrier.
    fn barrier(&self);

    /// Reduces `value` with `min` across all ranks; every rank receives the
    /// result. The fold is performed in rank order.
    fn allreduce_min(&self, value: f64) -> f64;

    /// Gathers each rank's payload; every rank receives all payloads in rank
    /// order.
    fn allgather_bytes(&self, payload: &[u8]) -> Vec<Vec<u8>>;
}

/// The trivial communicator: one rank, every collective is an identity.
pub struct SoloComm;

impl Communicator for SoloComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn allreduce_min(&self, value: f64) -> f64 {
        value
    }

    fn allgather_bytes(&self, payload: &[u8]) -> Vec<Vec<u8>> {
        vec![payload.to_vec()]
    }
}

struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Vec<u8>>>,
}

/// An in-process SPMD communicator: R ranks as threads sharing a barrier and
/// an exchange buffer.
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Creates one connected communicator handle per rank.
    pub fn split(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0);
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Runs `body` once per rank on its own thread and returns the results in
    /// rank order.
    pub fn spmd<R, F>(size: usize, body: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ThreadComm) -> R + Sync,
    {
        let comms = ThreadComm::split(size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| scope.spawn(|| body(comm)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn allreduce_min(&self, value: f64) -> f64 {
        let gathered = self.allgather_bytes(&value.to_le_bytes());
        gathered
            .into_iter()
            .map(|bytes| f64::from_le_bytes(bytes.try_into().unwrap()))
            .fold(f64::MAX, f64::min)
    }

    fn allgather_bytes(&self, payload: &[u8]) -> Vec<Vec<u8>> {
        self.shared.slots.lock().unwrap()[self.rank] = payload.to_vec();
        // Everyone has written before anyone reads, and everyone has read
        // before the slots can be reused by the next collective.
        self.shared.barrier.wait();
        let gathered = self.shared.slots.lock().unwrap().clone();
        self.shared.barrier.wait();
        gathered
    }
}

/// Little-endian encoding helpers for the payloads the assembly phase
/// gathers (variable ids and variable-set lists).
pub(crate) mod wire {
    use crate::Var;

    pub fn push_u16(buf: &mut Vec<u8>, v: Var) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_list(buf: &mut Vec<u8>, vars: impl Iterator<Item = Var>, len: usize) {
        push_u16(buf, len as Var);
        for v in vars {
            push_u16(buf, v);
        }
    }

    pub struct U16Reader<'a> {
        bytes: &'a [u8],
        pos: usize,
    }

    impl<'a> U16Reader<'a> {
        pub fn new(bytes: &'a [u8]) -> Self {
            U16Reader { bytes, pos: 0 }
        }

        pub fn is_done(&self) -> bool {
            self.pos >= self.bytes.len()
        }

        pub fn read(&mut self) -> Var {
            let v = Var::from_le_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
            self.pos += 2;
            v
        }

        pub fn read_list(&mut self) -> Vec<Var> {
            let len = self.read() as usize;
            (0..len).map(|_| self.read()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_collectives_are_identities() {
        let comm = SoloComm;
        assert_eq!(comm.allreduce_min(0.25), 0.25);
        assert_eq!(comm.allgather_bytes(b"xy"), vec![b"xy".to_vec()]);
    }

    #[test]
    fn thread_allreduce_takes_the_global_minimum() {
        let mins = ThreadComm::spmd(4, |comm| comm.allreduce_min(comm.rank() as f64 + 1.0));
        assert_eq!(mins, vec![1.0; 4]);
    }

    #[test]
    fn thread_allgather_is_rank_ordered() {
        let all = ThreadComm::spmd(3, |comm| comm.allgather_bytes(&[comm.rank() as u8]));
        for gathered in all {
            assert_eq!(gathered, vec![vec![0u8], vec![1], vec![2]]);
        }
    }

    #[test]
    fn consecutive_collectives_do_not_interfere() {
        let results = ThreadComm::spmd(3, |comm| {
            let a = comm.allreduce_min(10.0 - comm.rank() as f64);
            comm.barrier();
            let b = comm.allreduce_min(comm.rank() as f64);
            (a, b)
        });
        assert_eq!(results, vec![(8.0, 0.0); 3]);
    }
}
