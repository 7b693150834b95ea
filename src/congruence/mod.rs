//! Congruences of finite algebras: principal congruences generated through
//! unary polynomials, the set of all congruences, and congruence systems.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Display;
use std::rc::Rc;

use log::{debug, info};

use crate::error::{AlgebraError, Result};
use crate::model::{Element, Model};
use crate::partition::Partition;
use crate::signature::Signature;
use crate::solver::{self, HomomorphismSearch};

pub mod lattice;

pub use lattice::{congruence_lattice, CongruenceLattice};

/// An equivalence on the universe of `algebra` compatible with its operations.
#[derive(Debug, Clone)]
pub struct Congruence {
    algebra: Rc<Model>,
    partition: Partition<Element>,
}

impl Congruence {
    /// The least equivalence containing `pairs`. Compatibility with the
    /// operations is not checked, see [Congruence::checked].
    pub(crate) fn new<I>(algebra: Rc<Model>, pairs: I) -> Result<Congruence>
    where
        I: IntoIterator<Item = (Element, Element)>,
    {
        let mut partition = Partition::discrete(algebra.universe().iter().cloned());
        for (a, b) in pairs {
            for x in [&a, &b] {
                if !algebra.contains(x) {
                    return Err(AlgebraError::UnknownElement(x.to_string()));
                }
            }
            partition.join_blocks(&a, &b);
        }
        Ok(Congruence { algebra, partition })
    }

    /// The least equivalence containing `pairs`, failing unless it is
    /// compatible with every operation of the algebra.
    pub fn checked<I>(algebra: Rc<Model>, pairs: I) -> Result<Congruence>
    where
        I: IntoIterator<Item = (Element, Element)>,
    {
        let result = Congruence::new(algebra, pairs)?;
        match result.incompatible_operation() {
            Some(op) => Err(AlgebraError::Incompatible(op)),
            None => Ok(result),
        }
    }

    /// Wraps a partition of the universe of `algebra` compatible with its
    /// operations.
    pub fn from_partition(algebra: Rc<Model>, partition: Partition<Element>) -> Result<Congruence> {
        let same_elements = partition.len() == algebra.cardinality()
            && algebra.universe().iter().all(|x| partition.contains(x));
        if !same_elements {
            return Err(AlgebraError::TypeMismatch(
                "the partition is not over the universe of the algebra".to_owned(),
            ));
        }
        let result = Congruence { algebra, partition };
        match result.incompatible_operation() {
            Some(op) => Err(AlgebraError::Incompatible(op)),
            None => Ok(result),
        }
    }

    pub(crate) fn wrap(algebra: Rc<Model>, partition: Partition<Element>) -> Congruence {
        Congruence { algebra, partition }
    }

    /// Relates each element only to itself.
    pub fn minimum(algebra: &Rc<Model>) -> Congruence {
        Congruence::wrap(
            algebra.clone(),
            Partition::discrete(algebra.universe().iter().cloned()),
        )
    }

    /// Relates every pair of elements.
    pub fn maximum(algebra: &Rc<Model>) -> Congruence {
        Congruence::wrap(
            algebra.clone(),
            Partition::total(algebra.universe().iter().cloned()),
        )
    }

    /// The algebra the congruence lives on.
    pub fn algebra(&self) -> &Rc<Model> {
        &self.algebra
    }

    /// The classes as a partition of the universe.
    pub fn partition(&self) -> &Partition<Element> {
        &self.partition
    }

    /// Whether `a` and `b` lie in the same class.
    pub fn related(&self, a: &Element, b: &Element) -> bool {
        self.partition.related(a, b)
    }

    /// The classes, each in universe order.
    pub fn classes(&self) -> Vec<Vec<Element>> {
        self.partition.iter_blocks()
    }

    /// The class of `x`, `None` outside the universe.
    pub fn class_of(&self, x: &Element) -> Option<Vec<Element>> {
        self.partition.block(x)
    }

    /// The least element of the class of `x`.
    pub fn representative(&self, x: &Element) -> Option<Element> {
        self.class_of(x).and_then(|class| class.into_iter().min())
    }

    /// Least element of the class of every element.
    pub fn representatives(&self) -> HashMap<Element, Element> {
        let mut result = HashMap::new();
        for class in self.classes() {
            if let Some(least) = class.iter().min().cloned() {
                for x in class {
                    result.insert(x, least.clone());
                }
            }
        }
        result
    }

    /// Every related pair, both directions and the diagonal included.
    pub fn table(&self) -> HashSet<(Element, Element)> {
        self.partition.table()
    }

    /// Canonical labelling of the classes along the universe. Equal
    /// congruences of the same algebra have equal keys.
    pub fn key(&self) -> Vec<usize> {
        self.partition
            .labels(self.algebra.universe())
            .into_iter()
            .flatten()
            .collect()
    }

    fn same_algebra(&self, other: &Congruence) -> bool {
        Rc::ptr_eq(&self.algebra, &other.algebra) || *self.algebra == *other.algebra
    }

    fn check_algebra(&self, other: &Congruence) -> Result<()> {
        if self.same_algebra(other) {
            Ok(())
        } else {
            Err(AlgebraError::TypeMismatch(
                "congruences of different algebras".to_owned(),
            ))
        }
    }

    /// Intersection of both relations.
    pub fn meet(&self, other: &Congruence) -> Result<Congruence> {
        self.check_algebra(other)?;
        Ok(Congruence::wrap(
            self.algebra.clone(),
            self.partition.meet(&other.partition),
        ))
    }

    /// Transitive closure of the union of both relations.
    pub fn join(&self, other: &Congruence) -> Result<Congruence> {
        self.check_algebra(other)?;
        Ok(Congruence::wrap(
            self.algebra.clone(),
            self.partition.join(&other.partition),
        ))
    }

    /// Whether `self` refines `other`.
    pub fn le(&self, other: &Congruence) -> bool {
        self.same_algebra(other) && self.partition.refines(&other.partition)
    }

    /// Whether every operation maps related arguments to related results.
    pub fn is_compatible(&self) -> bool {
        self.incompatible_operation().is_none()
    }

    /// Some operation the relation is not compatible with. An equivalence is
    /// compatible with every operation iff it is with all unary polynomials,
    /// and it suffices to compare each element with its class representative.
    pub(crate) fn incompatible_operation(&self) -> Option<String> {
        unary_polynomials(&self.algebra)
            .into_iter()
            .find(|p| {
                self.algebra.universe().iter().any(|x| {
                    let root = self.partition.find(x);
                    match (p.apply(x), root.and_then(|r| p.apply(r))) {
                        (Some(px), Some(pr)) => !self.partition.related(px, pr),
                        _ => false,
                    }
                })
            })
            .map(|p| p.symbol)
    }
}

impl PartialEq for Congruence {
    fn eq(&self, other: &Self) -> bool {
        self.same_algebra(other) && self.partition == other.partition
    }
}

impl Eq for Congruence {}

impl PartialOrd for Congruence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !self.same_algebra(other) {
            return None;
        }
        self.partition.partial_cmp(&other.partition)
    }
}

impl Display for Congruence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Congruence[")?;
        for class in self.classes() {
            write!(f, "|")?;
            for (i, x) in class.iter().enumerate() {
                if i != 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", x)?;
            }
            write!(f, "|")?;
        }
        write!(f, "]")
    }
}

/// A translation `x -> f(c1, .., x, .., cn)` of a basic operation.
#[derive(Debug, Clone)]
pub struct UnaryPolynomial {
    /// The operation the polynomial is built from.
    pub symbol: String,
    images: HashMap<Element, Element>,
}

impl UnaryPolynomial {
    /// Image of `x`, `None` outside the universe.
    pub fn apply(&self, x: &Element) -> Option<&Element> {
        self.images.get(x)
    }
}

/// Every unary polynomial obtained by fixing all but one argument of an
/// operation to constants. Unary operations are included as they are and
/// duplicates are dropped.
pub fn unary_polynomials(algebra: &Model) -> Vec<UnaryPolynomial> {
    let universe = algebra.universe();
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for (sym, op) in algebra.operations() {
        let arity = op.arity();
        if arity == 0 {
            continue;
        }
        for position in 0..arity {
            for fixed in crate::model::functions::tuples(universe, arity - 1) {
                let images = universe
                    .iter()
                    .filter_map(|x| {
                        let mut args = fixed.clone();
                        args.insert(position, x.clone());
                        op.get(&args).cloned()
                    })
                    .collect::<Vec<_>>();
                if images.len() == universe.len() && seen.insert(images.clone()) {
                    result.push(UnaryPolynomial {
                        symbol: sym.to_owned(),
                        images: universe.iter().cloned().zip(images).collect(),
                    });
                }
            }
        }
    }
    result
}

/// The least congruence relating `a` and `b`.
pub fn principal_congruence(algebra: &Rc<Model>, a: &Element, b: &Element) -> Result<Congruence> {
    for x in [a, b] {
        if !algebra.contains(x) {
            return Err(AlgebraError::UnknownElement(x.to_string()));
        }
    }
    Ok(generate(algebra, &unary_polynomials(algebra), a, b))
}

/// Closes `{a, b}` under the given polynomials: every merge of two classes
/// queues the merged pair so its images get merged too.
fn generate(algebra: &Rc<Model>, polynomials: &[UnaryPolynomial], a: &Element, b: &Element) -> Congruence {
    let mut partition = Partition::discrete(algebra.universe().iter().cloned());
    let mut queue = VecDeque::new();
    if partition.join_blocks(a, b) {
        queue.push_back((a.clone(), b.clone()));
    }
    while let Some((x, y)) = queue.pop_front() {
        for p in polynomials {
            if let (Some(px), Some(py)) = (p.apply(&x), p.apply(&y)) {
                if partition.join_blocks(px, py) {
                    queue.push_back((px.clone(), py.clone()));
                }
            }
        }
    }
    Congruence::wrap(algebra.clone(), partition)
}

/// Distinct principal congruences together with the order between them.
#[derive(Debug, Clone)]
pub struct PrincipalCongruences {
    /// One congruence per distinct principal congruence.
    pub congruences: Vec<Congruence>,
    /// `(i, j)` when `congruences[i] < congruences[j]`.
    pub order: Vec<(usize, usize)>,
}

impl PrincipalCongruences {
    /// `order` closed under swapping its pairs.
    pub fn comparable(&self) -> HashSet<(usize, usize)> {
        self.order
            .iter()
            .flat_map(|&(i, j)| [(i, j), (j, i)])
            .collect()
    }
}

/// The principal congruence of every pair of distinct elements, without repetitions.
pub fn principal_congruences(algebra: &Rc<Model>) -> PrincipalCongruences {
    let polynomials = unary_polynomials(algebra);
    let universe = algebra.universe();
    let mut keys = HashSet::new();
    let mut result = PrincipalCongruences {
        congruences: Vec::new(),
        order: Vec::new(),
    };
    for (i, a) in universe.iter().enumerate() {
        for b in universe[i + 1..].iter() {
            let theta = generate(algebra, &polynomials, a, b);
            if !keys.insert(theta.key()) {
                continue;
            }
            let new = result.congruences.len();
            for (k, kept) in result.congruences.iter().enumerate() {
                if theta.le(kept) {
                    result.order.push((new, k));
                } else if kept.le(&theta) {
                    result.order.push((k, new));
                }
            }
            result.congruences.push(theta);
        }
    }
    debug!(
        "{} principal congruences over {} elements",
        result.congruences.len(),
        universe.len()
    );
    result
}

/// Every congruence of `algebra`, from the minimum to the maximum by number
/// of classes. Found by closing the principal congruences under joins.
pub fn congruences(algebra: &Rc<Model>) -> Vec<Congruence> {
    let principals = principal_congruences(algebra);
    // principal i lives at position i + 1, after the minimum
    let mut comparable = principals
        .comparable()
        .into_iter()
        .map(|(i, j)| (i + 1, j + 1))
        .collect::<HashSet<_>>();
    let mut result = vec![Congruence::minimum(algebra)];
    let mut keys = result.iter().map(|c| c.key()).collect::<HashSet<_>>();
    let mut frontier = Vec::new();
    for theta in principals.congruences {
        keys.insert(theta.key());
        frontier.push(result.len());
        result.push(theta);
    }
    for k in 1..result.len() {
        comparable.insert((0, k));
        comparable.insert((k, 0));
    }

    while !frontier.is_empty() {
        debug!("Joining a frontier of {} congruences", frontier.len());
        let mut next = Vec::new();
        let known = result.len();
        for &i in frontier.iter() {
            for j in 0..known {
                if i == j || comparable.contains(&(i, j)) {
                    continue;
                }
                let joined = Congruence::wrap(
                    algebra.clone(),
                    result[i].partition.join(&result[j].partition),
                );
                if keys.insert(joined.key()) {
                    next.push(result.len());
                    result.push(joined);
                }
            }
        }
        frontier = next;
    }

    result.sort_by_key(|c| Reverse(c.partition.block_count()));
    info!("{} congruences", result.len());
    result
}

/// The congruences `θ` with `algebra / θ` isomorphic to one of `factors`:
/// kernels of surjective homomorphisms onto them.
pub fn congruences_in(
    search: &dyn HomomorphismSearch,
    algebra: &Rc<Model>,
    factors: &[Rc<Model>],
) -> Result<Vec<Congruence>> {
    let mut result: Vec<Congruence> = Vec::new();
    for factor in factors {
        let subtype: &Signature = factor.signature();
        for h in solver::homomorphisms(search, algebra, factor, subtype, false, true, &[])? {
            let kernel = h.kernel()?;
            if !result.contains(&kernel) {
                result.push(kernel);
            }
        }
    }
    Ok(result)
}

/// Least upper bound of `x` and `y` inside the finite set `sigma`: the meet
/// of every member of `sigma` above both, starting from the maximum.
pub fn sup_proj(sigma: &[Congruence], x: &Congruence, y: &Congruence) -> Result<Congruence> {
    x.check_algebra(y)?;
    let mut result = Congruence::maximum(&x.algebra);
    for c in sigma.iter().filter(|c| x.le(c) && y.le(c)) {
        result = result.meet(c)?;
    }
    Ok(result)
}

/// A system of congruences `θ_i` paired with elements `a_i`; a solution is
/// an element `x` with `x θ_i a_i` for every `i`.
#[derive(Debug, Clone)]
pub struct CongruenceSystem {
    congruences: Vec<Congruence>,
    elements: Vec<Element>,
}

impl CongruenceSystem {
    /// Pairs `congruences[i]` with `elements[i]`. All congruences must share
    /// an algebra containing the elements.
    pub fn new(congruences: Vec<Congruence>, elements: Vec<Element>) -> Result<CongruenceSystem> {
        let first = congruences.first().ok_or_else(|| {
            AlgebraError::TypeMismatch("a congruence system needs congruences".to_owned())
        })?;
        if congruences.len() != elements.len() {
            return Err(AlgebraError::ArityViolation {
                expected: congruences.len(),
                found: elements.len(),
            });
        }
        for theta in congruences.iter() {
            first.check_algebra(theta)?;
        }
        if let Some(x) = elements.iter().find(|x| !first.algebra.contains(x)) {
            return Err(AlgebraError::UnknownElement(x.to_string()));
        }
        Ok(CongruenceSystem {
            congruences,
            elements,
        })
    }

    /// Every element related to `a_i` by `θ_i` for all `i`.
    pub fn solutions(&self) -> BTreeSet<Element> {
        let mut classes = self
            .congruences
            .iter()
            .zip(self.elements.iter())
            .map(|(theta, a)| {
                theta
                    .class_of(a)
                    .unwrap_or_default()
                    .into_iter()
                    .collect::<BTreeSet<_>>()
            });
        let first = classes.next().unwrap_or_default();
        classes.fold(first, |acc, class| acc.intersection(&class).cloned().collect())
    }

    /// Whether some element solves every equation.
    pub fn has_solution(&self) -> bool {
        !self.solutions().is_empty()
    }

    /// Whether `a_i` and `a_j` are related by the supremum of `θ_i` and `θ_j`
    /// for every `i != j`. The supremum is the join, or the one taken inside
    /// `sigma` when given.
    pub fn is_system(&self, sigma: Option<&[Congruence]>) -> Result<bool> {
        let n = self.congruences.len();
        for i in 0..n {
            for j in (0..n).filter(|&j| j != i) {
                let sup = match sigma {
                    Some(sigma) => sup_proj(sigma, &self.congruences[i], &self.congruences[j])?,
                    None => self.congruences[i].join(&self.congruences[j])?,
                };
                if !sup.related(&self.elements[i], &self.elements[j]) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
