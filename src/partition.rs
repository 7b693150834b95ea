//! Disjoint-set forests over finite element sets.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use alga::general::{JoinSemilattice, Lattice, MeetSemilattice};

/// A partition of a finite set kept as a union-find forest with path
/// compression and union by size.
///
/// Two partitions are equal when they relate the same pairs, regardless of
/// the shape of their trees. They are ordered by refinement.
#[derive(Debug, Clone)]
pub struct Partition<T> {
    elements: Vec<T>,
    index: HashMap<T, usize>,
    parent: Vec<usize>,
    /// Block size, only meaningful at roots.
    size: Vec<usize>,
}

impl<T: Clone + Eq + Hash> Default for Partition<T> {
    fn default() -> Self {
        Partition {
            elements: Vec::new(),
            index: HashMap::new(),
            parent: Vec::new(),
            size: Vec::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> Partition<T> {
    /// An empty partition. Elements are added with [Partition::add_element].
    pub fn new() -> Partition<T> {
        Partition::default()
    }

    /// Every element in its own block.
    pub fn discrete<I: IntoIterator<Item = T>>(elements: I) -> Partition<T> {
        let mut p = Partition::new();
        for e in elements {
            p.add_element(e);
        }
        p
    }

    /// Everything in a single block.
    pub fn total<I: IntoIterator<Item = T>>(elements: I) -> Partition<T> {
        let mut p = Partition::discrete(elements);
        for i in 1..p.elements.len() {
            p.union_indices(0, i);
        }
        p
    }

    /// The least partition relating every listed pair.
    pub fn from_pairs<I: IntoIterator<Item = (T, T)>>(pairs: I) -> Partition<T> {
        let mut p = Partition::new();
        for (a, b) in pairs {
            p.join_blocks(&a, &b);
        }
        p
    }

    /// The partition whose blocks are the given lists.
    pub fn from_blocks<I, B>(blocks: I) -> Partition<T>
    where
        I: IntoIterator<Item = B>,
        B: IntoIterator<Item = T>,
    {
        let mut p = Partition::new();
        for block in blocks {
            let mut first = None;
            for e in block {
                let i = p.add_element(e);
                match first {
                    None => first = Some(i),
                    Some(f) => {
                        p.union_indices(f, i);
                    }
                }
            }
        }
        p
    }

    /// Registers `e` as a singleton block, returns its position.
    pub fn add_element(&mut self, e: T) -> usize {
        if let Some(&i) = self.index.get(&e) {
            return i;
        }
        let i = self.elements.len();
        self.index.insert(e.clone(), i);
        self.elements.push(e);
        self.parent.push(i);
        self.size.push(1);
        i
    }

    /// Number of elements, not of blocks.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether `e` belongs to some block.
    pub fn contains(&self, e: &T) -> bool {
        self.index.contains_key(e)
    }

    /// Elements in insertion order.
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Representative of the block of `e`. Every node on the way up is
    /// relinked straight to the root.
    pub fn root(&mut self, e: &T) -> Option<T> {
        let i = *self.index.get(e)?;
        let r = self.compress(i);
        Some(self.elements[r].clone())
    }

    /// Representative of the block of `e`, without touching the forest.
    pub fn find(&self, e: &T) -> Option<&T> {
        self.index.get(e).map(|&i| &self.elements[self.find_index(i)])
    }

    fn find_index(&self, mut i: usize) -> usize {
        while self.parent[i] != i {
            i = self.parent[i];
        }
        i
    }

    fn compress(&mut self, i: usize) -> usize {
        let root = self.find_index(i);
        let mut cur = i;
        while self.parent[cur] != root && self.parent[cur] != cur {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union_indices(&mut self, i: usize, j: usize) -> bool {
        let ri = self.compress(i);
        let rj = self.compress(j);
        if ri == rj {
            return false;
        }
        let (big, small) = if self.size[ri] >= self.size[rj] {
            (ri, rj)
        } else {
            (rj, ri)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        true
    }

    /// Merges the blocks of `a` and `b`, adding either one if it is new.
    /// Returns whether two different blocks were merged.
    pub fn join_blocks(&mut self, a: &T, b: &T) -> bool {
        let i = self.add_element(a.clone());
        let j = self.add_element(b.clone());
        self.union_indices(i, j)
    }

    /// Whether `a` and `b` lie in the same block.
    pub fn related(&self, a: &T, b: &T) -> bool {
        match (self.index.get(a), self.index.get(b)) {
            (Some(&i), Some(&j)) => self.find_index(i) == self.find_index(j),
            _ => false,
        }
    }

    /// Whether `e` represents its block.
    pub fn is_root(&self, e: &T) -> bool {
        self.index.get(e).map_or(false, |&i| self.parent[i] == i)
    }

    /// One representative per block.
    pub fn roots(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.elements.len())
            .filter(move |&i| self.parent[i] == i)
            .map(move |i| &self.elements[i])
    }

    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.roots().count()
    }

    /// Size of the block containing `e`.
    pub fn block_size(&self, e: &T) -> Option<usize> {
        self.index.get(e).map(|&i| self.size[self.find_index(i)])
    }

    /// The block containing `e`, in insertion order.
    pub fn block(&self, e: &T) -> Option<Vec<T>> {
        let r = self.find_index(*self.index.get(e)?);
        Some(
            (0..self.elements.len())
                .filter(|&i| self.find_index(i) == r)
                .map(|i| self.elements[i].clone())
                .collect(),
        )
    }

    /// All blocks, ordered by their first element in insertion order.
    pub fn iter_blocks(&self) -> Vec<Vec<T>> {
        let mut order = Vec::new();
        let mut blocks: HashMap<usize, Vec<T>> = HashMap::new();
        for i in 0..self.elements.len() {
            let r = self.find_index(i);
            blocks
                .entry(r)
                .or_insert_with(|| {
                    order.push(r);
                    Vec::new()
                })
                .push(self.elements[i].clone());
        }
        order
            .into_iter()
            .filter_map(|r| blocks.remove(&r))
            .collect()
    }

    /// Every related pair, including the diagonal.
    pub fn table(&self) -> HashSet<(T, T)> {
        self.iter_blocks()
            .into_iter()
            .flat_map(|block| {
                block
                    .iter()
                    .flat_map(|a| block.iter().map(move |b| (a.clone(), b.clone())))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Position of the block of every element, blocks numbered by first
    /// appearance along `order`. Equal partitions give equal labels.
    pub fn labels(&self, order: &[T]) -> Vec<Option<usize>> {
        let mut seen = HashMap::new();
        order
            .iter()
            .map(|e| {
                self.index.get(e).map(|&i| {
                    let r = self.find_index(i);
                    let next = seen.len();
                    *seen.entry(r).or_insert(next)
                })
            })
            .collect()
    }

    /// Blocks are the intersections of the blocks of both partitions.
    /// Elements missing from `other` stay in singleton blocks.
    pub fn meet(&self, other: &Partition<T>) -> Partition<T> {
        let mut result = Partition::new();
        let mut seen: HashMap<(usize, usize), usize> = HashMap::new();
        for (i, e) in self.elements.iter().enumerate() {
            let pos = result.add_element(e.clone());
            if let Some(&j) = other.index.get(e) {
                let key = (self.find_index(i), other.find_index(j));
                match seen.get(&key) {
                    Some(&first) => {
                        result.union_indices(first, pos);
                    }
                    None => {
                        seen.insert(key, pos);
                    }
                }
            }
        }
        result
    }

    /// Transitive closure of the union of both relations.
    pub fn join(&self, other: &Partition<T>) -> Partition<T> {
        let mut result = other.clone();
        for (i, e) in self.elements.iter().enumerate() {
            let r = self.find_index(i);
            if r != i {
                result.join_blocks(e, &self.elements[r]);
            } else {
                result.add_element(e.clone());
            }
        }
        result
    }

    /// Maps each block of `self` to a block of `other`, if that is possible.
    fn block_map(&self, other: &Partition<T>) -> Option<HashMap<usize, usize>> {
        let mut map = HashMap::new();
        for (i, e) in self.elements.iter().enumerate() {
            let j = *other.index.get(e)?;
            let r = other.find_index(j);
            if *map.entry(self.find_index(i)).or_insert(r) != r {
                return None;
            }
        }
        Some(map)
    }

    fn same_elements(&self, other: &Partition<T>) -> bool {
        self.elements.len() == other.elements.len()
            && self.elements.iter().all(|e| other.index.contains_key(e))
    }

    /// Every block of `self` lies inside a block of `other`.
    pub fn refines(&self, other: &Partition<T>) -> bool {
        self.same_elements(other) && self.block_map(other).is_some()
    }
}

impl<T: Clone + Eq + Hash> PartialEq for Partition<T> {
    fn eq(&self, other: &Self) -> bool {
        self.refines(other) && other.refines(self)
    }
}

impl<T: Clone + Eq + Hash> Eq for Partition<T> {}

impl<T: Clone + Eq + Hash> PartialOrd for Partition<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.refines(other), other.refines(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl<T: Clone + Eq + Hash> MeetSemilattice for Partition<T> {
    fn meet(&self, other: &Self) -> Self {
        Partition::meet(self, other)
    }
}

impl<T: Clone + Eq + Hash> JoinSemilattice for Partition<T> {
    fn join(&self, other: &Self) -> Self {
        Partition::join(self, other)
    }
}

impl<T: Clone + Eq + Hash> Lattice for Partition<T> {}
