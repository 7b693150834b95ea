//! Operation and relation tables over finite universes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;

use crate::error::{AlgebraError, Result};

use super::element::{show, Element};

/// Finite function given by its table of `arguments -> image` rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    arity: usize,
    table: BTreeMap<Vec<Element>, Element>,
}

impl Operation {
    /// Builds an operation from explicit rows, every row must have `arity` arguments.
    pub fn new<I>(arity: usize, rows: I) -> Result<Operation>
    where
        I: IntoIterator<Item = (Vec<Element>, Element)>,
    {
        let mut table = BTreeMap::new();
        for (args, image) in rows {
            if args.len() != arity {
                return Err(AlgebraError::ArityViolation {
                    expected: arity,
                    found: args.len(),
                });
            }
            table.insert(args, image);
        }
        Ok(Operation { arity, table })
    }

    /// Tabulates `f` on every `arity`-tuple of `universe`.
    pub fn from_fn<F>(universe: &[Element], arity: usize, f: F) -> Operation
    where
        F: Fn(&[Element]) -> Element,
    {
        let table = tuples(universe, arity)
            .map(|args| {
                let image = f(&args);
                (args, image)
            })
            .collect();
        Operation { arity, table }
    }

    pub(crate) fn from_table(arity: usize, table: BTreeMap<Vec<Element>, Element>) -> Operation {
        Operation { arity, table }
    }

    /// A 0-ary operation.
    pub fn constant(value: Element) -> Operation {
        Operation {
            arity: 0,
            table: std::iter::once((Vec::new(), value)).collect(),
        }
    }

    /// Number of arguments.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Evaluates the operation, failing outside of its domain.
    pub fn apply(&self, args: &[Element]) -> Result<&Element> {
        if args.len() != self.arity {
            return Err(AlgebraError::ArityViolation {
                expected: self.arity,
                found: args.len(),
            });
        }
        self.table
            .get(args)
            .ok_or_else(|| AlgebraError::DomainMiss(show(args)))
    }

    /// Like [Operation::apply], with `None` outside the domain.
    pub fn get(&self, args: &[Element]) -> Option<&Element> {
        self.table.get(args)
    }

    /// Argument tuples with their values, in tuple order.
    pub fn rows(&self) -> impl Iterator<Item = (&Vec<Element>, &Element)> + '_ {
        self.table.iter()
    }

    /// Argument tuples the operation is defined on.
    pub fn domain(&self) -> impl Iterator<Item = &Vec<Element>> + '_ {
        self.table.keys()
    }

    /// Every value taken.
    pub fn image(&self) -> BTreeSet<&Element> {
        self.table.values().collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Keeps the rows whose arguments all lie in `subset`.
    pub fn restrict(&self, subset: &BTreeSet<Element>) -> Operation {
        Operation {
            arity: self.arity,
            table: self
                .table
                .iter()
                .filter(|(args, _)| args.iter().all(|x| subset.contains(x)))
                .map(|(args, image)| (args.clone(), image.clone()))
                .collect(),
        }
    }

    /// Applies `f` to every element of every row.
    pub fn rename(&self, f: impl Fn(&Element) -> Element) -> Operation {
        Operation {
            arity: self.arity,
            table: self
                .table
                .iter()
                .map(|(args, image)| (args.iter().map(&f).collect(), f(image)))
                .collect(),
        }
    }

    /// The graph `{(x1, .., xn, f(x1, .., xn))}` of the operation as a relation.
    pub fn graph(&self) -> Relation {
        Relation {
            arity: self.arity + 1,
            tuples: self
                .table
                .iter()
                .map(|(args, image)| {
                    let mut row = args.clone();
                    row.push(image.clone());
                    row
                })
                .collect(),
        }
    }

    /// Checks that the table is total on `universe` and stays inside it.
    pub(crate) fn check_total(&self, symbol: &str, universe: &[Element]) -> Result<()> {
        let members = universe.iter().collect::<BTreeSet<_>>();
        for args in tuples(universe, self.arity) {
            let image = self.get(&args).ok_or_else(|| {
                AlgebraError::SignatureMismatch(format!(
                    "operation `{}` is not defined on {}",
                    symbol,
                    show(&args)
                ))
            })?;
            if !members.contains(image) {
                return Err(AlgebraError::UnknownElement(image.to_string()));
            }
        }
        let expected = universe.len().pow(self.arity as u32);
        if self.table.len() != expected {
            return Err(AlgebraError::SignatureMismatch(format!(
                "operation `{}` has {} rows, expected {}",
                symbol,
                self.table.len(),
                expected
            )));
        }
        Ok(())
    }
}

/// Finite relation stored as the set of tuples where it holds. Well typed
/// tuples that are not listed are false.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    arity: usize,
    tuples: BTreeSet<Vec<Element>>,
}

impl Relation {
    /// The relation holding exactly on `tuples`, which must all have `arity`
    /// entries.
    pub fn new<I>(arity: usize, tuples: I) -> Result<Relation>
    where
        I: IntoIterator<Item = Vec<Element>>,
    {
        let mut set = BTreeSet::new();
        for t in tuples {
            if t.len() != arity {
                return Err(AlgebraError::ArityViolation {
                    expected: arity,
                    found: t.len(),
                });
            }
            set.insert(t);
        }
        Ok(Relation { arity, tuples: set })
    }

    /// Tabulates the predicate `p` over every `arity`-tuple of `universe`.
    pub fn from_predicate<F>(universe: &[Element], arity: usize, p: F) -> Relation
    where
        F: Fn(&[Element]) -> bool,
    {
        Relation {
            arity,
            tuples: tuples(universe, arity).filter(|t| p(t)).collect(),
        }
    }

    /// Length of every tuple.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Whether the relation holds on `args`, failing on a wrong arity.
    pub fn holds(&self, args: &[Element]) -> Result<bool> {
        if args.len() != self.arity {
            return Err(AlgebraError::ArityViolation {
                expected: self.arity,
                found: args.len(),
            });
        }
        Ok(self.tuples.contains(args))
    }

    /// Whether `args` is one of the tuples.
    pub fn contains(&self, args: &[Element]) -> bool {
        self.tuples.contains(args)
    }

    /// Tuples where the relation holds, in order.
    pub fn tuples(&self) -> impl Iterator<Item = &Vec<Element>> + '_ {
        self.tuples.iter()
    }

    /// Number of tuples.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Whether the relation holds nowhere.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// The tuples lying inside `subset`.
    pub fn restrict(&self, subset: &BTreeSet<Element>) -> Relation {
        Relation {
            arity: self.arity,
            tuples: self
                .tuples
                .iter()
                .filter(|t| t.iter().all(|x| subset.contains(x)))
                .cloned()
                .collect(),
        }
    }

    /// The image of every tuple under `f`.
    pub fn rename(&self, f: impl Fn(&Element) -> Element) -> Relation {
        Relation {
            arity: self.arity,
            tuples: self
                .tuples
                .iter()
                .map(|t| t.iter().map(&f).collect())
                .collect(),
        }
    }

    pub(crate) fn check_within(&self, universe: &[Element]) -> Result<()> {
        let members = universe.iter().collect::<BTreeSet<_>>();
        match self.tuples.iter().flatten().find(|x| !members.contains(x)) {
            Some(x) => Err(AlgebraError::UnknownElement(x.to_string())),
            None => Ok(()),
        }
    }
}

/// Every `arity`-tuple over `universe`, in lexicographic order of positions.
pub(crate) fn tuples(universe: &[Element], arity: usize) -> Box<dyn Iterator<Item = Vec<Element>> + '_> {
    if arity == 0 {
        Box::new(std::iter::once(Vec::new()))
    } else {
        Box::new(
            std::iter::repeat(universe.iter())
                .take(arity)
                .multi_cartesian_product()
                .map(|args| args.into_iter().cloned().collect()),
        )
    }
}

/// Coordinatewise product of operations of the same symbol, one per factor.
pub(crate) fn operation_product(factors: &[(&[Element], &Operation)], arity: usize) -> Operation {
    let universe = factors
        .iter()
        .map(|(u, _)| u.iter())
        .multi_cartesian_product()
        .map(|xs| Element::Tuple(xs.into_iter().cloned().collect()))
        .collect::<Vec<_>>();
    let mut table = BTreeMap::new();
    for args in tuples(&universe, arity) {
        let mut image = Vec::with_capacity(factors.len());
        for (i, (_, op)) in factors.iter().enumerate() {
            let coords = args
                .iter()
                .filter_map(|x| x.coordinate(i).cloned())
                .collect::<Vec<_>>();
            match op.get(&coords) {
                Some(y) => image.push(y.clone()),
                None => break,
            }
        }
        if image.len() == factors.len() {
            table.insert(args, Element::Tuple(image));
        }
    }
    Operation { arity, table }
}

/// Coordinatewise product of relations: a tuple of product elements holds iff
/// each coordinate's column holds in its factor.
pub(crate) fn relation_product(factors: &[&Relation], arity: usize) -> Relation {
    let tuples = factors
        .iter()
        .map(|r| r.tuples.iter())
        .multi_cartesian_product()
        .map(|rows| {
            (0..arity)
                .map(|j| Element::Tuple(rows.iter().map(|row| row[j].clone()).collect()))
                .collect::<Vec<_>>()
        })
        .collect();
    Relation { arity, tuples }
}

/// Index of every element, used when moving between elements and positions.
pub(crate) fn positions(universe: &[Element]) -> HashMap<&Element, usize> {
    universe.iter().enumerate().map(|(i, x)| (x, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::element::atoms;

    fn min_op() -> Operation {
        Operation::from_fn(&atoms(0..3), 2, |xs| xs.iter().min().cloned().unwrap())
    }

    #[test]
    fn apply_checks_arity_and_domain() {
        let op = min_op();
        assert_eq!(op.apply(&atoms(vec![2, 1])).unwrap(), &Element::Atom(1));
        assert!(matches!(
            op.apply(&atoms(vec![1])),
            Err(AlgebraError::ArityViolation { expected: 2, found: 1 })
        ));
        assert!(matches!(
            op.apply(&atoms(vec![1, 7])),
            Err(AlgebraError::DomainMiss(_))
        ));
    }

    #[test]
    fn restriction_drops_outside_rows() {
        let op = min_op();
        let sub = atoms(vec![1, 2]).into_iter().collect();
        let restricted = op.restrict(&sub);
        assert_eq!(restricted.len(), 4);
        assert!(restricted.check_total("min", &atoms(vec![1, 2])).is_ok());
    }

    #[test]
    fn totality_is_checked() {
        let op = Operation::new(1, vec![(atoms(vec![0]), Element::Atom(1))]).unwrap();
        assert!(op.check_total("s", &atoms(0..2)).is_err());
        assert!(Operation::new(2, vec![(atoms(vec![0]), Element::Atom(1))]).is_err());
    }

    #[test]
    fn relations_are_false_off_table() {
        let le = Relation::from_predicate(&atoms(0..3), 2, |xs| xs[0] <= xs[1]);
        assert_eq!(le.len(), 6);
        assert!(le.holds(&atoms(vec![0, 2])).unwrap());
        assert!(!le.holds(&atoms(vec![2, 0])).unwrap());
        assert!(!le.holds(&atoms(vec![2, 9])).unwrap());
        assert!(le.holds(&atoms(vec![2])).is_err());
    }

    #[test]
    fn graph_of_constant() {
        let c = Operation::constant(Element::Atom(4));
        let g = c.graph();
        assert_eq!(g.arity(), 1);
        assert!(g.contains(&atoms(vec![4])));
    }

    #[test]
    fn product_relation_is_coordinatewise() {
        let le = Relation::from_predicate(&atoms(0..2), 2, |xs| xs[0] <= xs[1]);
        let prod = relation_product(&[&le, &le], 2);
        assert_eq!(prod.len(), 9);
        let pair = |a, b| Element::Tuple(atoms(vec![a, b]));
        assert!(prod.contains(&[pair(0, 0), pair(1, 0)]));
        assert!(!prod.contains(&[pair(0, 1), pair(1, 0)]));
    }
}
