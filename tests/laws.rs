use std::collections::BTreeSet;
use std::rc::Rc;

use finite_algebra::catalog;
use finite_algebra::congruence::{congruences, Congruence};
use finite_algebra::methods::closure;
use finite_algebra::model::{Element, Model};
use finite_algebra::partition::Partition;
use proptest::prelude::*;

/// A partition of `0..n` given by a block label per element.
fn partition_from_labels(labels: &[usize]) -> Partition<i64> {
    let mut p = Partition::discrete(0..labels.len() as i64);
    for (i, a) in labels.iter().enumerate() {
        if let Some(j) = labels.iter().position(|b| b == a) {
            p.join_blocks(&(i as i64), &(j as i64));
        }
    }
    p
}

fn labels(n: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..n, n)
}

fn n5() -> Rc<Model> {
    catalog::n5().model().clone()
}

fn subset(universe: &[Element], mask: &[bool]) -> Vec<Element> {
    universe
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(x, _)| x.clone())
        .collect()
}

proptest! {
    #[test]
    fn meet_is_commutative(a in labels(6), b in labels(6)) {
        let (p, q) = (partition_from_labels(&a), partition_from_labels(&b));
        prop_assert_eq!(p.meet(&q), q.meet(&p));
    }

    #[test]
    fn meet_is_associative(a in labels(6), b in labels(6), c in labels(6)) {
        let (p, q, r) = (partition_from_labels(&a), partition_from_labels(&b), partition_from_labels(&c));
        prop_assert_eq!(p.meet(&q).meet(&r), p.meet(&q.meet(&r)));
    }

    #[test]
    fn meet_is_idempotent(a in labels(7)) {
        let p = partition_from_labels(&a);
        prop_assert_eq!(p.meet(&p), p);
    }

    #[test]
    fn join_is_an_upper_bound(a in labels(7), b in labels(7)) {
        let (p, q) = (partition_from_labels(&a), partition_from_labels(&b));
        let j = p.join(&q);
        prop_assert!(p.refines(&j));
        prop_assert!(q.refines(&j));
        prop_assert!(p.meet(&q) <= p);
    }

    #[test]
    fn relatedness_follows_labels(a in labels(8)) {
        let p = partition_from_labels(&a);
        for i in 0..a.len() {
            for j in 0..a.len() {
                prop_assert_eq!(p.related(&(i as i64), &(j as i64)), a[i] == a[j]);
            }
        }
        let distinct = a.iter().collect::<BTreeSet<_>>().len();
        prop_assert_eq!(p.block_count(), distinct);
    }

    #[test]
    fn closure_is_idempotent(mask in prop::collection::vec(any::<bool>(), 5)) {
        let model = n5();
        let seed = subset(model.universe(), &mask);
        let once = closure(&model, &seed, model.signature()).unwrap();
        let twice = closure(&model, &once.universe, model.signature()).unwrap();
        prop_assert_eq!(once.universe, twice.universe);
    }

    #[test]
    fn closure_is_monotone(
        small in prop::collection::vec(any::<bool>(), 5),
        extra in prop::collection::vec(any::<bool>(), 5),
    ) {
        let model = n5();
        let big = small.iter().zip(&extra).map(|(a, b)| *a || *b).collect::<Vec<_>>();
        let s = closure(&model, &subset(model.universe(), &small), model.signature()).unwrap();
        let t = closure(&model, &subset(model.universe(), &big), model.signature()).unwrap();
        let t = t.universe.iter().collect::<BTreeSet<_>>();
        prop_assert!(s.universe.iter().all(|x| t.contains(x)));
    }

    #[test]
    fn closure_contains_the_seed(mask in prop::collection::vec(any::<bool>(), 5)) {
        let model = catalog::m3().model().clone();
        let seed = subset(model.universe(), &mask);
        let closed = closure(&model, &seed, model.signature()).unwrap();
        prop_assert!(seed.iter().all(|x| closed.universe.contains(x)));
        for partial in closed.partials.iter() {
            let again = closure(&model, &partial.iter().cloned().collect::<Vec<_>>(), model.signature()).unwrap();
            prop_assert_eq!(&again.universe, &closed.universe);
        }
    }
}

#[test]
fn congruences_are_bounded_and_closed() {
    for lattice in [catalog::chain(4), catalog::rhombus(), catalog::m3(), catalog::n5()] {
        let algebra = lattice.model().clone();
        let all = congruences(&algebra);
        let bottom = Congruence::minimum(&algebra);
        let top = Congruence::maximum(&algebra);
        for theta in all.iter() {
            assert!(bottom.le(theta));
            assert!(theta.le(&top));
            for phi in all.iter() {
                assert!(theta.meet(phi).unwrap().is_compatible());
                assert!(theta.join(phi).unwrap().is_compatible());
            }
        }
    }
}

#[test]
fn chain_congruence_counts() {
    for (n, expected) in [(2, 2), (3, 4), (4, 8)] {
        let chain = catalog::chain(n);
        assert_eq!(congruences(chain.model()).len(), expected);
    }
    assert_eq!(congruences(catalog::rhombus().model()).len(), 4);
}

#[test]
fn distributivity() {
    assert!(!catalog::m3().is_distributive());
    assert!(catalog::chain(4).is_distributive());
    assert!(catalog::m3().is_modular());
    assert!(!catalog::n5().is_modular());
}
