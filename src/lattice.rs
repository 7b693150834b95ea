//! Finite lattices as algebras of signature `{^: 2, v: 2}` with memoized
//! order-theoretic queries.

use std::cell::OnceCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use alga::general::{JoinSemilattice, Lattice as AlgaLattice, MeetSemilattice};
use petgraph::{
    graph::NodeIndex,
    visit::{Dfs, Walker},
    Directed, Graph,
};

use crate::error::{AlgebraError, Result};
use crate::model::{Element, Model, Operation, Provenance, Relation};
use crate::signature::Signature;

/// Symbol of the meet operation.
pub const MEET: &str = "^";
/// Symbol of the join operation.
pub const JOIN: &str = "v";

/// The signature shared by every lattice.
pub fn lattice_signature() -> Signature {
    Signature::algebraic(vec![(MEET, 2), (JOIN, 2)])
}

/// A finite lattice. `a <= b` iff `a ^ b = a`.
#[derive(Debug)]
pub struct Lattice {
    model: Rc<Model>,
    index: HashMap<Element, usize>,
    meet: Vec<Vec<usize>>,
    join: Vec<Vec<usize>>,
    max: OnceCell<usize>,
    min: OnceCell<usize>,
    upper_covers: OnceCell<Vec<Vec<usize>>>,
    distributive: OnceCell<bool>,
    modular: OnceCell<bool>,
}

impl Lattice {
    /// Views `model` as a lattice. The model must have exactly the lattice
    /// signature, a nonempty universe and satisfy the commutative, associative
    /// and absorption laws.
    pub fn new(model: Rc<Model>) -> Result<Lattice> {
        if *model.signature() != lattice_signature() {
            return Err(AlgebraError::TypeMismatch(format!(
                "a lattice has signature {}, found {}",
                lattice_signature(),
                model.signature()
            )));
        }
        if model.cardinality() == 0 {
            return Err(AlgebraError::TypeMismatch(
                "a lattice has a nonempty universe".to_owned(),
            ));
        }
        let index = model
            .universe()
            .iter()
            .enumerate()
            .map(|(i, x)| (x.clone(), i))
            .collect::<HashMap<_, _>>();
        let meet = Self::index_table(&model, &index, MEET)?;
        let join = Self::index_table(&model, &index, JOIN)?;
        let n = model.cardinality();
        for a in 0..n {
            for b in 0..n {
                let absorbs = meet[a][join[a][b]] == a && join[a][meet[a][b]] == a;
                let commutes = meet[a][b] == meet[b][a] && join[a][b] == join[b][a];
                if !absorbs || !commutes {
                    return Err(AlgebraError::TypeMismatch(format!(
                        "{} and {} break the lattice laws",
                        model.universe()[a],
                        model.universe()[b]
                    )));
                }
            }
        }
        for a in 0..n {
            for b in 0..n {
                for c in 0..n {
                    let meets = meet[meet[a][b]][c] == meet[a][meet[b][c]];
                    let joins = join[join[a][b]][c] == join[a][join[b][c]];
                    if !meets || !joins {
                        return Err(AlgebraError::TypeMismatch(format!(
                            "{}, {} and {} break associativity",
                            model.universe()[a],
                            model.universe()[b],
                            model.universe()[c]
                        )));
                    }
                }
            }
        }
        Ok(Lattice::from_parts(model, index, meet, join))
    }

    fn index_table(
        model: &Model,
        index: &HashMap<Element, usize>,
        symbol: &str,
    ) -> Result<Vec<Vec<usize>>> {
        let op = model
            .operation(symbol)
            .ok_or_else(|| AlgebraError::SignatureMismatch(format!("no operation `{}`", symbol)))?;
        let universe = model.universe();
        let mut table = vec![vec![0; universe.len()]; universe.len()];
        for (i, a) in universe.iter().enumerate() {
            for (j, b) in universe.iter().enumerate() {
                let image = op.apply(&[a.clone(), b.clone()])?;
                table[i][j] = *index
                    .get(image)
                    .ok_or_else(|| AlgebraError::UnknownElement(image.to_string()))?;
            }
        }
        Ok(table)
    }

    fn from_parts(
        model: Rc<Model>,
        index: HashMap<Element, usize>,
        meet: Vec<Vec<usize>>,
        join: Vec<Vec<usize>>,
    ) -> Lattice {
        Lattice {
            model,
            index,
            meet,
            join,
            max: OnceCell::new(),
            min: OnceCell::new(),
            upper_covers: OnceCell::new(),
            distributive: OnceCell::new(),
            modular: OnceCell::new(),
        }
    }

    /// Builds a lattice from index tables over `universe`.
    pub(crate) fn from_tables(
        universe: Vec<Element>,
        meet: Vec<Vec<usize>>,
        join: Vec<Vec<usize>>,
    ) -> Lattice {
        let tabulate = |table: &Vec<Vec<usize>>| {
            let rows = table
                .iter()
                .enumerate()
                .flat_map(|(i, row)| {
                    let universe = &universe;
                    row.iter().enumerate().map(move |(j, &k)| {
                        (
                            vec![universe[i].clone(), universe[j].clone()],
                            universe[k].clone(),
                        )
                    })
                })
                .collect();
            Operation::from_table(2, rows)
        };
        let mut operations = BTreeMap::new();
        operations.insert(MEET.to_owned(), tabulate(&meet));
        operations.insert(JOIN.to_owned(), tabulate(&join));
        let index = universe
            .iter()
            .enumerate()
            .map(|(i, x)| (x.clone(), i))
            .collect();
        let model = Model::assemble(
            lattice_signature(),
            universe,
            operations,
            BTreeMap::new(),
            Provenance::Plain,
        );
        Lattice::from_parts(Rc::new(model), index, meet, join)
    }

    /// Builds the lattice of a partial order given by `le` pairs. Reflexive
    /// and transitive pairs may be omitted. Fails if the order has a cycle or
    /// some pair lacks a least upper or greatest lower bound.
    pub fn from_order<I>(universe: Vec<Element>, le: I) -> Result<Lattice>
    where
        I: IntoIterator<Item = (Element, Element)>,
    {
        let mut graph: Graph<usize, (), Directed> = Graph::new();
        let nodes = (0..universe.len())
            .map(|i| graph.add_node(i))
            .collect::<Vec<_>>();
        let index = universe
            .iter()
            .enumerate()
            .map(|(i, x)| (x, i))
            .collect::<HashMap<_, _>>();
        for (a, b) in le {
            let i = *index
                .get(&a)
                .ok_or_else(|| AlgebraError::UnknownElement(a.to_string()))?;
            let j = *index
                .get(&b)
                .ok_or_else(|| AlgebraError::UnknownElement(b.to_string()))?;
            if i != j && !graph.contains_edge(nodes[i], nodes[j]) {
                graph.add_edge(nodes[i], nodes[j], ());
            }
        }
        let join = bound_table(&graph, &nodes)?;
        graph.reverse();
        let meet = bound_table(&graph, &nodes)?;
        Ok(Lattice::from_tables(universe, meet, join))
    }

    /// Renames the underlying model.
    pub fn with_name(mut self, name: impl Into<String>) -> Lattice {
        let model = Rc::try_unwrap(self.model).unwrap_or_else(|shared| (*shared).clone());
        self.model = Rc::new(model.with_name(name));
        self
    }

    /// The underlying algebra.
    pub fn model(&self) -> &Rc<Model> {
        &self.model
    }

    /// Elements of the lattice.
    pub fn universe(&self) -> &[Element] {
        self.model.universe()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.meet.len()
    }

    /// Always false, lattices are nonempty.
    pub fn is_empty(&self) -> bool {
        self.meet.is_empty()
    }

    fn position(&self, x: &Element) -> Result<usize> {
        self.index
            .get(x)
            .copied()
            .ok_or_else(|| AlgebraError::UnknownElement(x.to_string()))
    }

    fn at(&self, i: usize) -> &Element {
        &self.universe()[i]
    }

    /// Greatest lower bound of `a` and `b`.
    pub fn meet(&self, a: &Element, b: &Element) -> Result<&Element> {
        Ok(self.at(self.meet[self.position(a)?][self.position(b)?]))
    }

    /// Least upper bound of `a` and `b`.
    pub fn join(&self, a: &Element, b: &Element) -> Result<&Element> {
        Ok(self.at(self.join[self.position(a)?][self.position(b)?]))
    }

    /// Whether `a <= b`.
    pub fn le(&self, a: &Element, b: &Element) -> Result<bool> {
        let (i, j) = (self.position(a)?, self.position(b)?);
        Ok(self.le_index(i, j))
    }

    fn le_index(&self, i: usize, j: usize) -> bool {
        self.meet[i][j] == i
    }

    fn lt_index(&self, i: usize, j: usize) -> bool {
        i != j && self.le_index(i, j)
    }

    /// The top element.
    pub fn max(&self) -> &Element {
        let i = *self
            .max
            .get_or_init(|| (1..self.len()).fold(0, |acc, j| self.join[acc][j]));
        self.at(i)
    }

    /// The bottom element.
    pub fn min(&self) -> &Element {
        let i = *self
            .min
            .get_or_init(|| (1..self.len()).fold(0, |acc, j| self.meet[acc][j]));
        self.at(i)
    }

    fn upper_cover_table(&self) -> &Vec<Vec<usize>> {
        self.upper_covers.get_or_init(|| {
            (0..self.len())
                .map(|a| {
                    let above = (0..self.len())
                        .filter(|&b| self.lt_index(a, b))
                        .collect::<Vec<_>>();
                    above
                        .iter()
                        .copied()
                        .filter(|&b| !above.iter().any(|&c| self.lt_index(c, b)))
                        .collect()
                })
                .collect()
        })
    }

    /// Elements covering `a`: `b > a` with nothing strictly between.
    pub fn covers(&self, a: &Element) -> Result<Vec<Element>> {
        let i = self.position(a)?;
        Ok(self.upper_cover_table()[i]
            .iter()
            .map(|&j| self.at(j).clone())
            .collect())
    }

    /// Elements covered by `a`.
    pub fn covers_by(&self, a: &Element) -> Result<Vec<Element>> {
        let i = self.position(a)?;
        Ok(self.lower_covers(i).into_iter().map(|j| self.at(j).clone()).collect())
    }

    fn lower_covers(&self, i: usize) -> Vec<usize> {
        self.upper_cover_table()
            .iter()
            .enumerate()
            .filter(|(_, ups)| ups.contains(&i))
            .map(|(j, _)| j)
            .collect()
    }

    /// Elements with exactly one lower cover.
    pub fn join_irreducibles(&self) -> Vec<Element> {
        (0..self.len())
            .filter(|&i| self.lower_covers(i).len() == 1)
            .map(|i| self.at(i).clone())
            .collect()
    }

    /// Elements with exactly one upper cover.
    pub fn meet_irreducibles(&self) -> Vec<Element> {
        let covers = self.upper_cover_table();
        (0..self.len())
            .filter(|&i| covers[i].len() == 1)
            .map(|i| self.at(i).clone())
            .collect()
    }

    /// `x ^ (y v z) = (x ^ y) v (x ^ z)` for every triple.
    pub fn is_distributive(&self) -> bool {
        *self.distributive.get_or_init(|| {
            let n = self.len();
            (0..n).all(|x| {
                (0..n).all(|y| {
                    (0..n).all(|z| {
                        self.meet[x][self.join[y][z]] == self.join[self.meet[x][y]][self.meet[x][z]]
                    })
                })
            })
        })
    }

    /// `x v (y ^ z) = (x v y) ^ z` whenever `x <= z`.
    pub fn is_modular(&self) -> bool {
        *self.modular.get_or_init(|| {
            let n = self.len();
            (0..n).all(|x| {
                (0..n).filter(|&z| self.le_index(x, z)).all(|z| {
                    (0..n).all(|y| self.join[x][self.meet[y][z]] == self.meet[self.join[x][y]][z])
                })
            })
        })
    }

    /// The order `<=` as a binary relation.
    pub fn order_relation(&self) -> Relation {
        Relation::from_predicate(self.universe(), 2, |xs| {
            match (self.index.get(&xs[0]), self.index.get(&xs[1])) {
                (Some(&i), Some(&j)) => self.le_index(i, j),
                _ => false,
            }
        })
    }

    /// Covering graph, edges go from an element to the elements covering it.
    pub fn hasse_diagram(&self) -> Graph<Element, (), Directed> {
        let mut graph = Graph::new();
        let nodes = self
            .universe()
            .iter()
            .map(|x| graph.add_node(x.clone()))
            .collect::<Vec<_>>();
        for (i, ups) in self.upper_cover_table().iter().enumerate() {
            for &j in ups {
                graph.add_edge(nodes[i], nodes[j], ());
            }
        }
        graph
    }

    /// `x` as an element carrying its lattice, for the alga traits.
    pub fn element(&self, x: &Element) -> Result<LatticeElement<'_>> {
        Ok(LatticeElement {
            lattice: self,
            index: self.position(x)?,
        })
    }

    /// Every element, in universe order.
    pub fn elements(&self) -> impl Iterator<Item = LatticeElement<'_>> + '_ {
        (0..self.len()).map(move |index| LatticeElement {
            lattice: self,
            index,
        })
    }
}

fn reachable(graph: &Graph<usize, (), Directed>, start: NodeIndex) -> HashSet<NodeIndex> {
    Dfs::new(graph, start).iter(graph).collect()
}

/// Least upper bound of every pair along the edges of `graph`, as a table of
/// node weights.
fn bound_table(graph: &Graph<usize, (), Directed>, nodes: &[NodeIndex]) -> Result<Vec<Vec<usize>>> {
    let sort = petgraph::algo::toposort(graph, None)
        .map_err(|_| AlgebraError::TypeMismatch("the order relation has a cycle".to_owned()))?
        .into_iter()
        .enumerate()
        .map(|(pos, nd)| (nd, pos))
        .collect::<HashMap<_, _>>();
    let above = nodes
        .iter()
        .map(|&nd| reachable(graph, nd))
        .collect::<Vec<_>>();

    let n = nodes.len();
    let mut table = vec![vec![0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let shared = above[i]
                .intersection(&above[j])
                .copied()
                .collect::<Vec<NodeIndex>>();
            let bound = shared
                .iter()
                .copied()
                .min_by_key(|nd| sort.get(nd))
                .filter(|lub| shared.iter().all(|nd| above[lub.index()].contains(nd)))
                .ok_or_else(|| {
                    AlgebraError::TypeMismatch(format!(
                        "elements {} and {} have no least bound",
                        i, j
                    ))
                })?;
            table[i][j] = graph[bound];
        }
    }
    Ok(table)
}

/// An element of a particular lattice, ordered and combined through it.
#[derive(Debug, Clone, Copy)]
pub struct LatticeElement<'a> {
    lattice: &'a Lattice,
    index: usize,
}

impl<'a> LatticeElement<'a> {
    /// The wrapped element.
    pub fn value(&self) -> &'a Element {
        self.lattice.at(self.index)
    }
}

impl PartialEq for LatticeElement<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.lattice, other.lattice) && self.index == other.index
    }
}

impl PartialOrd for LatticeElement<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !std::ptr::eq(self.lattice, other.lattice) {
            return None;
        }
        if self.index == other.index {
            return Some(Ordering::Equal);
        }
        if self.lattice.le_index(self.index, other.index) {
            Some(Ordering::Less)
        } else if self.lattice.le_index(other.index, self.index) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl MeetSemilattice for LatticeElement<'_> {
    fn meet(&self, other: &Self) -> Self {
        LatticeElement {
            lattice: self.lattice,
            index: self.lattice.meet[self.index][other.index],
        }
    }
}

impl JoinSemilattice for LatticeElement<'_> {
    fn join(&self, other: &Self) -> Self {
        LatticeElement {
            lattice: self.lattice,
            index: self.lattice.join[self.index][other.index],
        }
    }
}

impl AlgaLattice for LatticeElement<'_> {}
