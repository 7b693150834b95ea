//! Small standard structures used throughout the test suite and the benches.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::lattice::{lattice_signature, Lattice, JOIN, MEET};
use crate::model::{atoms, Element, Model, Operation, Relation};
use crate::signature::Signature;

/// Relation symbol of the partial order of a poset.
pub const LE: &str = "<=";

fn lattice_from_fns(name: &str, n: i64, meet: fn(i64, i64) -> i64, join: fn(i64, i64) -> i64) -> Lattice {
    let universe = atoms(0..n);
    let binary = |f: fn(i64, i64) -> i64| {
        Operation::from_fn(&universe, 2, move |xs| {
            match (xs[0].atom(), xs[1].atom()) {
                (Some(a), Some(b)) => Element::Atom(f(a, b)),
                _ => xs[0].clone(),
            }
        })
    };
    let mut operations = BTreeMap::new();
    operations.insert(MEET.to_owned(), binary(meet));
    operations.insert(JOIN.to_owned(), binary(join));
    let model = Model::new(lattice_signature(), universe, operations, BTreeMap::new())
        .map(|m| m.with_name(name));
    match model.and_then(|m| Lattice::new(Rc::new(m))) {
        Ok(lattice) => lattice,
        Err(e) => unreachable!("catalog lattice {} is malformed: {}", name, e),
    }
}

fn lattice_from_order(name: &str, n: i64, covers: &[(i64, i64)]) -> Lattice {
    let le = covers
        .iter()
        .map(|&(a, b)| (Element::Atom(a), Element::Atom(b)));
    match Lattice::from_order(atoms(0..n), le) {
        Ok(lattice) => lattice.with_name(name),
        Err(e) => unreachable!("catalog lattice {} is malformed: {}", name, e),
    }
}

/// The chain `0 < 1 < .. < n-1`.
///
/// # Panics
///
/// When `n` is 0, since lattices are nonempty.
pub fn chain(n: usize) -> Lattice {
    assert!(n >= 1, "a chain needs at least one element");
    lattice_from_fns(&format!("C{}", n), n as i64, i64::min, i64::max)
}

/// The four element Boolean lattice: `0` at the bottom, atoms `1` and `2`, `3` on top.
pub fn rhombus() -> Lattice {
    lattice_from_fns("2x2", 4, |a, b| a & b, |a, b| a | b)
}

/// `0 < 1, 2, 3 < 4` with three pairwise incomparable atoms.
pub fn m3() -> Lattice {
    lattice_from_order("M3", 5, &[(0, 1), (0, 2), (0, 3), (1, 4), (2, 4), (3, 4)])
}

/// The pentagon: `0 < 1 < 2 < 4` and `0 < 3 < 4`.
pub fn n5() -> Lattice {
    lattice_from_order("N5", 5, &[(0, 1), (1, 2), (2, 4), (0, 3), (3, 4)])
}

/// The signature `{} , {<=: 2}` of posets.
pub fn poset_signature() -> Signature {
    Signature::new(Vec::<(&str, usize)>::new(), vec![(LE, 2)])
}

/// The order relation of `lattice` as a relational model.
pub fn poset_of(lattice: &Lattice) -> Model {
    let mut relations = BTreeMap::new();
    relations.insert(LE.to_owned(), lattice.order_relation());
    let model = Model::new(
        poset_signature(),
        lattice.universe().to_vec(),
        BTreeMap::new(),
        relations,
    );
    match model {
        Ok(m) => match lattice.model().name() {
            Some(name) => m.with_name(format!("{} poset", name)),
            None => m,
        },
        Err(e) => unreachable!("order relation outside its universe: {}", e),
    }
}

/// The chain `0 <= 1 <= .. <= n-1` as a poset.
pub fn chain_poset(n: usize) -> Model {
    let universe = atoms(0..n as i64);
    let le = Relation::from_predicate(&universe, 2, |xs| xs[0] <= xs[1]);
    let mut relations = BTreeMap::new();
    relations.insert(LE.to_owned(), le);
    match Model::new(poset_signature(), universe, BTreeMap::new(), relations) {
        Ok(m) => m.with_name(format!("C{} poset", n)),
        Err(e) => unreachable!("chain poset is malformed: {}", e),
    }
}

/// The order of the rhombus.
pub fn rhombus_poset() -> Model {
    poset_of(&rhombus())
}

/// The order of M3.
pub fn m3_poset() -> Model {
    poset_of(&m3())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(chain(4).len(), 4);
        assert_eq!(rhombus().len(), 4);
        assert_eq!(m3().len(), 5);
        assert_eq!(n5().len(), 5);
        assert_eq!(chain_poset(3).cardinality(), 3);
    }

    #[test]
    fn one_element_chain() {
        let c1 = chain(1);
        assert_eq!(c1.max(), c1.min());
    }

    #[test]
    #[should_panic(expected = "at least one element")]
    fn empty_chain() {
        chain(0);
    }

    #[test]
    fn rhombus_order() {
        let r = rhombus();
        let a = |x| Element::Atom(x);
        assert!(r.le(&a(0), &a(1)).unwrap());
        assert!(!r.le(&a(1), &a(2)).unwrap());
        assert_eq!(r.max(), &a(3));
        assert_eq!(r.min(), &a(0));
    }

    #[test]
    fn posets_are_reflexive() {
        let p = m3_poset();
        let le = p.relation(LE).unwrap();
        assert_eq!(le.len(), 5 + 4 + 3);
        for x in p.universe() {
            assert!(le.contains(&[x.clone(), x.clone()]));
        }
        assert_eq!(rhombus_poset().relation(LE).unwrap().len(), 9);
        assert_eq!(chain_poset(3).relation(LE).unwrap().len(), 6);
    }

    #[test]
    fn names() {
        assert_eq!(n5().model().name(), Some("N5"));
        assert_eq!(chain_poset(2).name(), Some("C2 poset"));
    }
}
