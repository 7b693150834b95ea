//! Closure of subsets under operations and enumeration of subuniverses.

use std::collections::{BTreeSet, HashSet, VecDeque};

use itertools::Itertools;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{AlgebraError, Result};
use crate::model::functions::tuples;
use crate::model::{Element, Model, Operation};
use crate::signature::Signature;

/// The subuniverse generated by a seed, with the intermediate sets reached
/// while growing it. Every partial set generates the same subuniverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    /// The generated subuniverse, in universe order.
    pub universe: Vec<Element>,
    /// Sets met on the way, each generating `universe`.
    pub partials: Vec<BTreeSet<Element>>,
}

/// The operations of `model` named by `subtype`.
fn resolve<'a>(model: &'a Model, subtype: &Signature) -> Result<Vec<&'a Operation>> {
    subtype
        .operations()
        .map(|(sym, arity)| match model.operation(sym) {
            Some(op) if op.arity() == arity => Ok(op),
            Some(op) => Err(AlgebraError::ArityViolation {
                expected: arity,
                found: op.arity(),
            }),
            None => Err(AlgebraError::SignatureMismatch(format!(
                "{} has no operation `{}`",
                model.signature(),
                sym
            ))),
        })
        .collect()
}

/// Grows `seed` to a fixed point. A round only evaluates argument tuples
/// that use some element added in the previous round.
fn close(model: &Model, operations: &[&Operation], seed: BTreeSet<Element>) -> Closure {
    let mut result = seed;
    let mut partials = vec![result.clone()];
    for op in operations.iter().filter(|op| op.arity() == 0) {
        if let Some(c) = op.get(&[]) {
            if model.contains(c) && result.insert(c.clone()) {
                partials.push(result.clone());
            }
        }
    }

    let mut old = BTreeSet::new();
    loop {
        let current = result.iter().cloned().collect::<Vec<_>>();
        let mut fresh = BTreeSet::new();
        for op in operations.iter().filter(|op| op.arity() > 0) {
            for args in tuples(&current, op.arity()) {
                if args.iter().all(|x| old.contains(x)) {
                    continue;
                }
                if let Some(image) = op.get(&args) {
                    if model.contains(image) && !result.contains(image) && fresh.insert(image.clone()) {
                        partials.push(result.union(&fresh).cloned().collect());
                    }
                }
            }
        }
        if fresh.is_empty() {
            break;
        }
        old = result.clone();
        result.extend(fresh);
    }
    Closure {
        universe: result.into_iter().collect(),
        partials,
    }
}

fn seed_set(model: &Model, seed: &[Element]) -> Result<BTreeSet<Element>> {
    match seed.iter().find(|x| !model.contains(x)) {
        Some(x) => Err(AlgebraError::UnknownElement(x.to_string())),
        None => Ok(seed.iter().cloned().collect()),
    }
}

/// The least subset containing `seed` closed under the operations of `subtype`.
pub fn closure(model: &Model, seed: &[Element], subtype: &Signature) -> Result<Closure> {
    let operations = resolve(model, subtype)?;
    Ok(close(model, &operations, seed_set(model, seed)?))
}

/// Whether `subset` is closed under the operations of `subtype`.
pub fn is_subuniverse(model: &Model, subset: &[Element], subtype: &Signature) -> Result<bool> {
    let operations = resolve(model, subtype)?;
    let seed = seed_set(model, subset)?;
    let size = seed.len();
    Ok(close(model, &operations, seed).universe.len() == size)
}

/// How [subuniverses] walks the subsets of the universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Close every subset, largest first, skipping subsets met along the way
    /// of an earlier closure.
    PowerSet,
    /// Close single generators, then keep adding one generator at a time to
    /// the subuniverses found so far.
    GeneratorJoin,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::GeneratorJoin
    }
}

/// Lazily produced nonempty subuniverses, each one exactly once, as sorted
/// element lists.
pub enum Subuniverses<'a> {
    /// Walk of [Strategy::PowerSet].
    PowerSet(PowerSetWalk<'a>),
    /// Walk of [Strategy::GeneratorJoin].
    GeneratorJoin(GeneratorJoinWalk<'a>),
}

impl Iterator for Subuniverses<'_> {
    type Item = Vec<Element>;

    fn next(&mut self) -> Option<Vec<Element>> {
        match self {
            Subuniverses::PowerSet(walk) => walk.next(),
            Subuniverses::GeneratorJoin(walk) => walk.next(),
        }
    }
}

/// Every nonempty subuniverse of `model` for the operations of `subtype`,
/// leaving out the whole universe when `proper` is set.
pub fn subuniverses<'a>(
    model: &'a Model,
    subtype: &Signature,
    proper: bool,
    strategy: Strategy,
) -> Result<Subuniverses<'a>> {
    let operations = resolve(model, subtype)?;
    debug!(
        "Enumerating subuniverses of {} elements under {} with {:?}",
        model.cardinality(),
        subtype,
        strategy
    );
    Ok(match strategy {
        Strategy::PowerSet => Subuniverses::PowerSet(PowerSetWalk::new(model, operations, proper)),
        Strategy::GeneratorJoin => {
            Subuniverses::GeneratorJoin(GeneratorJoinWalk::new(model, operations, proper))
        }
    })
}

/// Subuniverses found by closing every subset of the universe, largest
/// first.
pub struct PowerSetWalk<'a> {
    model: &'a Model,
    operations: Vec<&'a Operation>,
    proper: bool,
    candidates: Box<dyn Iterator<Item = Vec<Element>> + 'a>,
    checked: HashSet<BTreeSet<Element>>,
    found: HashSet<Vec<Element>>,
}

impl<'a> PowerSetWalk<'a> {
    fn new(model: &'a Model, operations: Vec<&'a Operation>, proper: bool) -> Self {
        let universe = model.universe();
        let largest = if proper {
            universe.len().saturating_sub(1)
        } else {
            universe.len()
        };
        let candidates = (1..=largest)
            .rev()
            .flat_map(move |k| universe.iter().cloned().combinations(k));
        PowerSetWalk {
            model,
            operations,
            proper,
            candidates: Box::new(candidates),
            checked: HashSet::new(),
            found: HashSet::new(),
        }
    }
}

impl Iterator for PowerSetWalk<'_> {
    type Item = Vec<Element>;

    fn next(&mut self) -> Option<Vec<Element>> {
        loop {
            let subset = self.candidates.next()?.into_iter().collect::<BTreeSet<_>>();
            if self.checked.contains(&subset) {
                continue;
            }
            let closure = close(self.model, &self.operations, subset);
            self.checked.extend(closure.partials);
            if self.proper && closure.universe.len() == self.model.cardinality() {
                continue;
            }
            if self.found.insert(closure.universe.clone()) {
                trace!("Subuniverse {}", crate::model::element::show(&closure.universe));
                return Some(closure.universe);
            }
        }
    }
}

/// Subuniverses found by joining generators one at a time.
pub struct GeneratorJoinWalk<'a> {
    model: &'a Model,
    operations: Vec<&'a Operation>,
    proper: bool,
    /// Subuniverse generated by each element, filled in order.
    generated: Vec<BTreeSet<Element>>,
    seen: HashSet<BTreeSet<Element>>,
    queue: VecDeque<BTreeSet<Element>>,
    pending: VecDeque<Vec<Element>>,
}

impl<'a> GeneratorJoinWalk<'a> {
    fn new(model: &'a Model, operations: Vec<&'a Operation>, proper: bool) -> Self {
        GeneratorJoinWalk {
            model,
            operations,
            proper,
            generated: Vec::with_capacity(model.cardinality()),
            seen: HashSet::new(),
            queue: VecDeque::new(),
            pending: VecDeque::new(),
        }
    }

    fn record(&mut self, subuniverse: BTreeSet<Element>) {
        if !self.seen.insert(subuniverse.clone()) {
            return;
        }
        if !(self.proper && subuniverse.len() == self.model.cardinality()) {
            self.pending.push_back(subuniverse.iter().cloned().collect());
        }
        self.queue.push_back(subuniverse);
    }
}

impl Iterator for GeneratorJoinWalk<'_> {
    type Item = Vec<Element>;

    fn next(&mut self) -> Option<Vec<Element>> {
        loop {
            if let Some(found) = self.pending.pop_front() {
                return Some(found);
            }
            let universe = self.model.universe();
            if self.generated.len() < universe.len() {
                let g = &universe[self.generated.len()];
                let single = close(self.model, &self.operations, std::iter::once(g.clone()).collect());
                let single = single.universe.into_iter().collect::<BTreeSet<_>>();
                self.generated.push(single.clone());
                self.record(single);
                continue;
            }
            let node = self.queue.pop_front()?;
            let joins = universe
                .iter()
                .zip(self.generated.iter())
                .filter(|&(g, generated)| !node.contains(g) && !node.is_subset(generated))
                .map(|(g, _)| {
                    let mut seed = node.clone();
                    seed.insert(g.clone());
                    close(self.model, &self.operations, seed)
                })
                .collect::<Vec<_>>();
            for joined in joins {
                self.record(joined.universe.into_iter().collect());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::lattice::{JOIN, MEET};
    use crate::model::atoms;

    fn all(model: &Model, subtype: &Signature, proper: bool, strategy: Strategy) -> HashSet<Vec<Element>> {
        let found = subuniverses(model, subtype, proper, strategy)
            .unwrap()
            .collect::<Vec<_>>();
        let distinct = found.iter().cloned().collect::<HashSet<_>>();
        assert_eq!(found.len(), distinct.len());
        distinct
    }

    #[test]
    fn closure_of_rhombus_atoms() {
        let rhombus = catalog::rhombus();
        let model = rhombus.model();
        let sig = model.signature().clone();
        let single = closure(model, &atoms(vec![1]), &sig).unwrap();
        assert_eq!(single.universe, atoms(vec![1]));
        assert_eq!(single.partials.len(), 1);

        let both = closure(model, &atoms(vec![1, 2]), &sig).unwrap();
        assert_eq!(both.universe.len(), 4);
        assert!(both.partials.len() > 1);

        let joins = sig.subtype(&[JOIN], &[]).unwrap();
        let up = closure(model, &atoms(vec![1, 2]), &joins).unwrap();
        assert_eq!(up.universe, atoms(vec![1, 2, 3]));
    }

    #[test]
    fn closure_checks_its_inputs() {
        let rhombus = catalog::rhombus();
        let model = rhombus.model();
        assert!(matches!(
            closure(model, &atoms(vec![9]), model.signature()),
            Err(AlgebraError::UnknownElement(_))
        ));
        let foreign = Signature::algebraic(vec![("+", 2)]);
        assert!(matches!(
            closure(model, &atoms(vec![0]), &foreign),
            Err(AlgebraError::SignatureMismatch(_))
        ));
    }

    #[test]
    fn constants_close_the_empty_set() {
        let universe = atoms(0..3);
        let mut operations = std::collections::BTreeMap::new();
        operations.insert("c".to_owned(), Operation::constant(Element::Atom(1)));
        operations.insert(
            "s".to_owned(),
            Operation::from_fn(&universe, 1, |xs| match xs[0].atom() {
                Some(x) => Element::Atom((x + 1).min(2)),
                None => xs[0].clone(),
            }),
        );
        let sig = Signature::algebraic(vec![("c", 0), ("s", 1)]);
        let model = Model::new(sig.clone(), universe, operations, Default::default()).unwrap();
        assert_eq!(closure(&model, &[], &sig).unwrap().universe, atoms(vec![1, 2]));
        assert!(is_subuniverse(&model, &atoms(vec![1, 2]), &sig).unwrap());
        assert!(!is_subuniverse(&model, &atoms(vec![2]), &sig).unwrap());
    }

    #[test]
    fn rhombus_has_eleven_proper_subuniverses() {
        let rhombus = catalog::rhombus();
        let model = rhombus.model();
        let sig = model.signature().clone();
        let by_powerset = all(model, &sig, true, Strategy::PowerSet);
        let by_joins = all(model, &sig, true, Strategy::GeneratorJoin);
        assert_eq!(by_powerset.len(), 11);
        assert_eq!(by_powerset, by_joins);
        assert!(!by_joins.contains(&atoms(vec![1, 2])));
        assert_eq!(all(model, &sig, false, Strategy::GeneratorJoin).len(), 12);
    }

    #[test]
    fn strategies_agree_on_reducts() {
        let rhombus = catalog::rhombus();
        let model = rhombus.model();
        for subtype in [
            model.signature().subtype(&[MEET], &[]).unwrap(),
            Signature::empty(),
        ] {
            for proper in [true, false] {
                assert_eq!(
                    all(model, &subtype, proper, Strategy::PowerSet),
                    all(model, &subtype, proper, Strategy::GeneratorJoin)
                );
            }
        }
        let meets = model.signature().subtype(&[MEET], &[]).unwrap();
        assert_eq!(all(model, &meets, true, Strategy::GeneratorJoin).len(), 12);
        assert_eq!(all(model, &Signature::empty(), true, Strategy::PowerSet).len(), 14);
    }

    #[test]
    fn every_subset_of_a_chain_is_closed() {
        let chain = catalog::chain(4);
        let model = chain.model();
        assert_eq!(all(model, model.signature(), true, Strategy::GeneratorJoin).len(), 14);
        assert_eq!(all(model, model.signature(), false, Strategy::PowerSet).len(), 15);
    }

    #[test]
    fn single_element_model() {
        let chain = catalog::chain(1);
        let model = chain.model();
        assert_eq!(all(model, model.signature(), true, Strategy::PowerSet).len(), 0);
        assert_eq!(all(model, model.signature(), false, Strategy::GeneratorJoin).len(), 1);
    }
}
