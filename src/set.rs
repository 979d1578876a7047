//! Compact sets of variable identifiers.
//!
//! Everything in this crate manipulates small sets of variables: Markov
//! blanket candidates, conditioning sets, parents-and-children sets. They are
//! all subsets of `[0, n)` for a fixed number of variables `n`, so a single
//! bit-vector representation sized for `n` at construction covers every use.

use crate::Var;
use smallvec::SmallVec;
use std::fmt;

const WORD_BITS: usize = 64;

/// A set of variables drawn from the domain `[0, n)`.
///
/// The bits are packed into 64-bit words; domains of up to 256 variables fit
/// in the inline portion of the [`SmallVec`] and never touch the heap.
/// Iteration is always in ascending order of variable index.
///
/// ```
/// use markov_blanket::VarSet;
///
/// let mut s = VarSet::new(10);
/// s.insert(7);
/// s.insert(2);
/// s.insert(7);
/// assert_eq!(s.len(), 2);
/// assert_eq!(s.iter().collect::<Vec<_>>(), vec![2, 7]);
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VarSet {
    domain: usize,
    words: SmallVec<[u64; 4]>,
}

impl VarSet {
    /// Creates an empty set over the domain `[0, domain)`.
    pub fn new(domain: usize) -> Self {
        let nwords = (domain + WORD_BITS - 1) / WORD_BITS;
        VarSet {
            domain,
            words: SmallVec::from_elem(0, nwords.max(1)),
        }
    }

    /// Creates a set over `[0, domain)` containing the given variables.
    ///
    /// Duplicates are fine.
    pub fn from_iter_with<I: IntoIterator<Item = Var>>(domain: usize, vars: I) -> Self {
        let mut set = VarSet::new(domain);
        for v in vars {
            set.insert(v);
        }
        set
    }

    /// The size of the domain this set draws from.
    pub fn domain(&self) -> usize {
        self.domain
    }

    /// The number of variables in the set.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if the set contains no variables.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Adds a variable, returning `true` if it was not already present.
    ///
    /// # Panics
    ///
    /// Panics if `v` is outside the domain.
    pub fn insert(&mut self, v: Var) -> bool {
        assert!((v as usize) < self.domain, "variable {} outside domain {}", v, self.domain);
        let (w, b) = (v as usize / WORD_BITS, v as usize % WORD_BITS);
        let fresh = self.words[w] & (1 << b) == 0;
        self.words[w] |= 1 << b;
        fresh
    }

    /// Removes a variable, returning `true` if it was present.
    pub fn remove(&mut self, v: Var) -> bool {
        let (w, b) = (v as usize / WORD_BITS, v as usize % WORD_BITS);
        if w >= self.words.len() {
            return false;
        }
        let present = self.words[w] & (1 << b) != 0;
        self.words[w] &= !(1 << b);
        present
    }

    /// Membership test.
    ///
    /// ```
    /// use markov_blanket::VarSet;
    ///
    /// let s = VarSet::from_iter_with(8, [1, 4]);
    /// assert!(s.contains(4));
    /// assert!(!s.contains(5));
    /// ```
    pub fn contains(&self, v: Var) -> bool {
        let (w, b) = (v as usize / WORD_BITS, v as usize % WORD_BITS);
        w < self.words.len() && self.words[w] & (1 << b) != 0
    }

    /// Adds every variable of `other` to this set.
    pub fn union_with(&mut self, other: &VarSet) {
        debug_assert_eq!(self.domain, other.domain);
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= o;
        }
    }

    /// Removes every variable of `other` from this set.
    pub fn difference_with(&mut self, other: &VarSet) {
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w &= !o;
        }
    }

    /// A copy of this set with `v` added.
    pub fn with(&self, v: Var) -> VarSet {
        let mut copy = self.clone();
        copy.insert(v);
        copy
    }

    /// A copy of this set with `v` removed.
    ///
    /// ```
    /// use markov_blanket::VarSet;
    ///
    /// let s = VarSet::from_iter_with(8, [1, 4, 6]);
    /// assert_eq!(s.without(4), VarSet::from_iter_with(8, [1, 6]));
    /// assert_eq!(s.without(4).without(4), VarSet::from_iter_with(8, [1, 6]));
    /// ```
    pub fn without(&self, v: Var) -> VarSet {
        let mut copy = self.clone();
        copy.remove(v);
        copy
    }

    /// Returns an iterator over the variables in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Var> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let b = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some((wi * WORD_BITS + b) as Var)
            })
        })
    }

    /// Enumerates every subset of this set containing exactly `radius`
    /// variables, in lexicographic order over the ascending element list.
    ///
    /// The order depends only on the contents of the set, never on hashing or
    /// iteration quirks, so every rank of a distributed run walks the same
    /// stream.
    ///
    /// ```
    /// use markov_blanket::VarSet;
    ///
    /// let s = VarSet::from_iter_with(8, [1, 3, 5, 7]);
    /// let pairs: Vec<Vec<u16>> = s.subsets(2).map(|c| c.iter().collect()).collect();
    /// assert_eq!(pairs.len(), 6);
    /// assert_eq!(pairs[0], vec![1, 3]);
    /// assert_eq!(pairs[5], vec![5, 7]);
    /// ```
    pub fn subsets(&self, radius: usize) -> Subsets {
        let elements: Vec<Var> = self.iter().collect();
        let done = radius > elements.len();
        Subsets {
            domain: self.domain,
            indices: (0..radius).collect(),
            elements,
            done,
        }
    }
}

impl fmt::Debug for VarSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the `C(k, r)` r-subsets of a [`VarSet`], produced by
/// [`VarSet::subsets`].
pub struct Subsets {
    domain: usize,
    elements: Vec<Var>,
    indices: Vec<usize>,
    done: bool,
}

impl Iterator for Subsets {
    type Item = VarSet;

    fn next(&mut self) -> Option<VarSet> {
        if self.done {
            return None;
        }
        let subset = VarSet::from_iter_with(
            self.domain,
            self.indices.iter().map(|&i| self.elements[i]),
        );

        // Advance the rightmost index that still has room, then reset
        // everything to its right; standard combination stepping.
        let k = self.indices.len();
        let n = self.elements.len();
        let mut pos = k;
        loop {
            if pos == 0 {
                self.done = true;
                break;
            }
            pos -= 1;
            if self.indices[pos] + 1 <= n - (k - pos) {
                self.indices[pos] += 1;
                for later in pos + 1..k {
                    self.indices[later] = self.indices[later - 1] + 1;
                }
                break;
            }
        }
        Some(subset)
    }
}
