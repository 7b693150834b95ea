//! Homomorphisms, embeddings and isomorphisms between models.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::congruence::Congruence;
use crate::error::{AlgebraError, Result};
use crate::signature::Signature;

use super::{Element, Model, Relation};

/// How much structure a map is known to preserve. Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MorphismKind {
    /// Preserves operations and relations.
    Homomorphism,
    /// An injective homomorphism that also reflects relations.
    Embedding,
    /// A surjective embedding.
    Isomorphism,
}

/// A total map between the universes of two models, guaranteed to preserve
/// the symbols of `subtype`.
#[derive(Debug, Clone)]
pub struct Homomorphism {
    kind: MorphismKind,
    map: BTreeMap<Element, Element>,
    source: Rc<Model>,
    target: Rc<Model>,
    subtype: Signature,
    injective: Option<bool>,
    surjective: Option<bool>,
    /// Symbols found not to be preserved.
    antitype: RefCell<BTreeSet<String>>,
    /// Relations whose image tuples were found not to be reflected.
    unreflected: RefCell<BTreeSet<String>>,
}

impl Homomorphism {
    /// Wraps `map`, which must be total on the source and land in the target.
    /// Embeddings must be injective and isomorphisms bijective.
    pub fn new(
        kind: MorphismKind,
        map: BTreeMap<Element, Element>,
        source: Rc<Model>,
        target: Rc<Model>,
        subtype: Signature,
    ) -> Result<Homomorphism> {
        if let Some(x) = source.universe().iter().find(|x| !map.contains_key(x)) {
            return Err(AlgebraError::DomainMiss(x.to_string()));
        }
        if map.len() != source.cardinality() {
            return Err(AlgebraError::TypeMismatch(
                "map is defined outside of the source universe".to_owned(),
            ));
        }
        if let Some(y) = map.values().find(|y| !target.contains(y)) {
            return Err(AlgebraError::UnknownElement(y.to_string()));
        }
        let mut result = Homomorphism {
            kind,
            map,
            source,
            target,
            subtype,
            injective: None,
            surjective: None,
            antitype: RefCell::new(BTreeSet::new()),
            unreflected: RefCell::new(BTreeSet::new()),
        };
        if kind >= MorphismKind::Embedding {
            if !result.is_injective() {
                return Err(AlgebraError::TypeMismatch(format!(
                    "a {:?} must be injective",
                    kind
                )));
            }
            result.injective = Some(true);
        }
        if kind == MorphismKind::Isomorphism {
            if !result.is_surjective() {
                return Err(AlgebraError::TypeMismatch(
                    "an isomorphism must be surjective".to_owned(),
                ));
            }
            result.surjective = Some(true);
        }
        Ok(result)
    }

    /// Records what is known about injectivity and surjectivity.
    pub fn with_flags(mut self, injective: Option<bool>, surjective: Option<bool>) -> Homomorphism {
        if self.kind < MorphismKind::Embedding {
            self.injective = injective;
        }
        if self.kind < MorphismKind::Isomorphism {
            self.surjective = surjective;
        }
        self
    }

    /// What kind of map this is.
    pub fn kind(&self) -> MorphismKind {
        self.kind
    }

    /// The domain.
    pub fn source(&self) -> &Rc<Model> {
        &self.source
    }

    /// The codomain.
    pub fn target(&self) -> &Rc<Model> {
        &self.target
    }

    /// Symbols the map is known to preserve.
    pub fn subtype(&self) -> &Signature {
        &self.subtype
    }

    /// Injectivity, when known from construction.
    pub fn injective(&self) -> Option<bool> {
        self.injective
    }

    /// Surjectivity, when known from construction.
    pub fn surjective(&self) -> Option<bool> {
        self.surjective
    }

    /// Symbols found so far not to be preserved.
    pub fn antitype(&self) -> Vec<String> {
        self.antitype.borrow().iter().cloned().collect()
    }

    /// The map as a table.
    pub fn map(&self) -> &BTreeMap<Element, Element> {
        &self.map
    }

    /// Image of `x`.
    pub fn apply(&self, x: &Element) -> Result<&Element> {
        self.map
            .get(x)
            .ok_or_else(|| AlgebraError::DomainMiss(x.to_string()))
    }

    /// Source and target are the same model.
    pub fn is_auto(&self) -> bool {
        Rc::ptr_eq(&self.source, &self.target) || self.source == self.target
    }

    /// Elements of the target that are hit.
    pub fn image(&self) -> BTreeSet<&Element> {
        self.map.values().collect()
    }

    /// Whether no two elements share an image.
    pub fn is_injective(&self) -> bool {
        self.injective
            .unwrap_or_else(|| self.image().len() == self.map.len())
    }

    /// Whether every element of the target is hit.
    pub fn is_surjective(&self) -> bool {
        self.surjective
            .unwrap_or_else(|| self.image().len() == self.target.cardinality())
    }

    /// Inverse map from the image back to the source. When the map is not
    /// surjective the inverse starts at the image, seen as a restriction of the target.
    pub fn inverse(&self) -> Result<Homomorphism> {
        if !self.is_injective() {
            return Err(AlgebraError::NonInjectiveInverse);
        }
        let source = if self.is_surjective() {
            self.target.clone()
        } else {
            Rc::new(self.image_model()?)
        };
        let map = self
            .map
            .iter()
            .map(|(x, y)| (y.clone(), x.clone()))
            .collect();
        Ok(Homomorphism {
            kind: self.kind,
            map,
            source,
            target: self.source.clone(),
            subtype: self.subtype.clone(),
            injective: Some(true),
            surjective: Some(true),
            // preserving a relation and reflecting it swap roles
            antitype: RefCell::new(self.unreflected.borrow().clone()),
            unreflected: RefCell::new(
                self.antitype
                    .borrow()
                    .iter()
                    .filter(|sym| self.source.relation(sym).is_some())
                    .cloned()
                    .collect(),
            ),
        })
    }

    /// `self ∘ g`. The result keeps the weaker kind and only the symbols both
    /// maps preserve.
    pub fn composition(&self, g: &Homomorphism) -> Result<Homomorphism> {
        if !g.target.universe().iter().all(|x| self.source.contains(x)) {
            return Err(AlgebraError::TypeMismatch(
                "the inner map lands outside the domain of the outer one".to_owned(),
            ));
        }
        let subtype = self.subtype.intersection(&g.subtype);
        let mut map = BTreeMap::new();
        for (x, y) in g.map.iter() {
            map.insert(x.clone(), self.apply(y)?.clone());
        }
        let both = |a: Option<bool>, b: Option<bool>| match (a, b) {
            (Some(true), Some(true)) => Some(true),
            _ => None,
        };
        Ok(Homomorphism {
            kind: self.kind.min(g.kind),
            map,
            source: g.source.clone(),
            target: self.target.clone(),
            subtype,
            injective: both(self.injective, g.injective),
            surjective: both(self.surjective, g.surjective),
            antitype: RefCell::new(BTreeSet::new()),
            unreflected: RefCell::new(BTreeSet::new()),
        })
    }

    /// The congruence `{(x, y) | f(x) = f(y)}` on the source. Fails with
    /// `Incompatible` when the map does not preserve every operation.
    pub fn kernel(&self) -> Result<Congruence> {
        let mut pairs = Vec::new();
        for (x, fx) in self.map.iter() {
            for (y, fy) in self.map.iter() {
                if fx == fy {
                    pairs.push((x.clone(), y.clone()));
                }
            }
        }
        Congruence::checked(self.source.clone(), pairs)
    }

    /// The image as a restriction of the target.
    pub fn image_model(&self) -> Result<Model> {
        let image = self.image().into_iter().cloned().collect::<Vec<_>>();
        Model::restriction(&self.target, &image, &self.subtype)
    }

    /// Whether the relation `symbol` is preserved. Failures are remembered.
    pub fn preserves_relation(&self, symbol: &str) -> Result<bool> {
        if self.subtype.relation_arity(symbol).is_some() {
            return Ok(true);
        }
        if self.antitype.borrow().contains(symbol) {
            return Ok(false);
        }
        let (a, b) = self.relation_pair(symbol)?;
        let result = self.preserves(a, b);
        self.remember(symbol, result);
        Ok(result)
    }

    /// Whether the operation `symbol` is preserved, checked on its graph relation.
    pub fn preserves_operation(&self, symbol: &str) -> Result<bool> {
        if self.subtype.operation_arity(symbol).is_some() {
            return Ok(true);
        }
        if self.antitype.borrow().contains(symbol) {
            return Ok(false);
        }
        let missing = || AlgebraError::SignatureMismatch(format!("no operation `{}`", symbol));
        let a = self.source.operation(symbol).ok_or_else(missing)?.graph();
        let b = self.target.operation(symbol).ok_or_else(missing)?.graph();
        let result = self.preserves(&a, &b);
        self.remember(symbol, result);
        Ok(result)
    }

    /// Whether every tuple of the target relation inside the image comes from
    /// a tuple of the source relation.
    pub fn inverse_preserves_relation(&self, symbol: &str) -> Result<bool> {
        if self.kind >= MorphismKind::Embedding && self.subtype.relation_arity(symbol).is_some() {
            return Ok(true);
        }
        if self.unreflected.borrow().contains(symbol) {
            return Ok(false);
        }
        let (a, b) = self.relation_pair(symbol)?;
        let mapped = a
            .tuples()
            .filter_map(|row| row.iter().map(|x| self.map.get(x).cloned()).collect::<Option<Vec<_>>>())
            .collect::<BTreeSet<_>>();
        let image = self.image();
        let result = b
            .tuples()
            .filter(|row| row.iter().all(|x| image.contains(x)))
            .all(|row| mapped.contains(row));
        if !result {
            self.unreflected.borrow_mut().insert(symbol.to_owned());
        }
        Ok(result)
    }

    /// Checks the reverse direction of every relation of the subtype.
    pub fn is_embedding(&self) -> Result<bool> {
        if !self.is_injective() {
            return Ok(false);
        }
        for (rel, _) in self.subtype.relations() {
            if !self.inverse_preserves_relation(rel)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Checks the symbols of `supertype` beyond the current subtype and, when
    /// all of them are preserved, promotes the map to `supertype`. Embeddings
    /// also check the reverse direction of relations.
    pub fn preserves_type(&mut self, supertype: &Signature) -> Result<bool> {
        let check_inverse = self.kind >= MorphismKind::Embedding;
        let extra = supertype.difference(&self.subtype)?;
        for (rel, _) in extra.relations() {
            if !self.preserves_relation(rel)? {
                return Ok(false);
            }
            if check_inverse && !self.inverse_preserves_relation(rel)? {
                return Ok(false);
            }
        }
        for (op, _) in extra.operations() {
            if !self.preserves_operation(op)? {
                return Ok(false);
            }
        }
        self.subtype = supertype.clone();
        Ok(true)
    }

    fn relation_pair(&self, symbol: &str) -> Result<(&Relation, &Relation)> {
        let missing = || AlgebraError::SignatureMismatch(format!("no relation `{}`", symbol));
        Ok((
            self.source.relation(symbol).ok_or_else(missing)?,
            self.target.relation(symbol).ok_or_else(missing)?,
        ))
    }

    fn preserves(&self, a: &Relation, b: &Relation) -> bool {
        a.tuples().all(|row| {
            row.iter()
                .map(|x| self.map.get(x).cloned())
                .collect::<Option<Vec<_>>>()
                .map_or(false, |image| b.contains(&image))
        })
    }

    fn remember(&self, symbol: &str, preserved: bool) {
        if !preserved {
            self.antitype.borrow_mut().insert(symbol.to_owned());
        }
    }
}

impl PartialEq for Homomorphism {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map && self.source == other.source && self.target == other.target
    }
}

impl Display for Homomorphism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match (self.kind, self.is_auto()) {
            (MorphismKind::Homomorphism, false) => "Homomorphism",
            (MorphismKind::Homomorphism, true) => "Endomorphism",
            (MorphismKind::Embedding, false) => "Embedding",
            (MorphismKind::Embedding, true) => "Autoembedding",
            (MorphismKind::Isomorphism, false) => "Isomorphism",
            (MorphismKind::Isomorphism, true) => "Automorphism",
        };
        write!(f, "{}(", name)?;
        for (i, (x, y)) in self.map.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} -> {}", x, y)?;
        }
        write!(f, "; {})", self.subtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::model::atoms;

    fn map_of(pairs: &[(i64, i64)]) -> BTreeMap<Element, Element> {
        pairs
            .iter()
            .map(|&(x, y)| (Element::Atom(x), Element::Atom(y)))
            .collect()
    }

    #[test]
    fn construction_checks_totality() {
        let c2 = catalog::chain(2).model().clone();
        let sig = c2.signature().clone();
        assert!(Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 1)]),
            c2.clone(),
            c2.clone(),
            sig.clone()
        )
        .is_err());
        assert!(Homomorphism::new(
            MorphismKind::Embedding,
            map_of(&[(0, 1), (1, 1)]),
            c2.clone(),
            c2.clone(),
            sig.clone()
        )
        .is_err());
        let h = Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 1), (1, 1)]),
            c2.clone(),
            c2,
            sig,
        )
        .unwrap();
        assert!(h.is_auto());
        assert!(!h.is_injective());
        assert!(matches!(h.inverse(), Err(AlgebraError::NonInjectiveInverse)));
    }

    #[test]
    fn kernel_of_constant_map_is_total() {
        let rhombus = catalog::rhombus().model().clone();
        let sig = rhombus.signature().clone();
        let h = Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 0), (1, 0), (2, 0), (3, 0)]),
            rhombus.clone(),
            rhombus.clone(),
            sig,
        )
        .unwrap();
        assert_eq!(h.kernel().unwrap(), Congruence::maximum(&rhombus));
    }

    #[test]
    fn composition_narrows_kind() {
        let c3 = catalog::chain(3).model().clone();
        let c2 = catalog::chain(2).model().clone();
        let sig = c3.signature().clone();
        let collapse = Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 0), (1, 1), (2, 1)]),
            c3.clone(),
            c2.clone(),
            sig.clone(),
        )
        .unwrap();
        let include = Homomorphism::new(
            MorphismKind::Embedding,
            map_of(&[(0, 0), (1, 2)]),
            c2,
            c3.clone(),
            sig,
        )
        .unwrap();
        let both = include.composition(&collapse).unwrap();
        assert_eq!(both.kind(), MorphismKind::Homomorphism);
        assert_eq!(both.apply(&Element::Atom(1)).unwrap(), &Element::Atom(2));
        assert_eq!(both.injective(), None);
        assert_eq!(both.image().len(), 2);

        let back = collapse.composition(&include).unwrap();
        assert_eq!(back.map(), &map_of(&[(0, 0), (1, 1)]));
    }

    #[test]
    fn inverse_of_embedding_starts_at_image() {
        let c2 = catalog::chain(2).model().clone();
        let c3 = catalog::chain(3).model().clone();
        let e = Homomorphism::new(
            MorphismKind::Embedding,
            map_of(&[(0, 0), (1, 2)]),
            c2.clone(),
            c3,
            c2.signature().clone(),
        )
        .unwrap();
        let inv = e.inverse().unwrap();
        assert_eq!(inv.source().universe(), &atoms(vec![0, 2])[..]);
        assert_eq!(inv.apply(&Element::Atom(2)).unwrap(), &Element::Atom(1));
    }

    #[test]
    fn order_preservation_is_memoized() {
        let poset = Rc::new(catalog::chain_poset(2));
        let empty = Signature::empty();
        let flip = Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 1), (1, 0)]),
            poset.clone(),
            poset.clone(),
            empty.clone(),
        )
        .unwrap();
        assert!(!flip.preserves_relation("<=").unwrap());
        assert_eq!(flip.antitype(), vec!["<=".to_owned()]);
        assert!(!flip.preserves_relation("<=").unwrap());

        let mut identity = Homomorphism::new(
            MorphismKind::Embedding,
            map_of(&[(0, 0), (1, 1)]),
            poset.clone(),
            poset.clone(),
            empty,
        )
        .unwrap();
        assert!(identity.preserves_type(poset.signature()).unwrap());
        assert_eq!(identity.subtype(), poset.signature());
        assert!(identity.is_embedding().unwrap());
    }

    #[test]
    fn reflection_failures_do_not_leak_into_preservation() {
        let square = Rc::new(catalog::rhombus_poset());
        let chain = Rc::new(catalog::chain_poset(4));
        let identity = Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 0), (1, 1), (2, 2), (3, 3)]),
            square,
            chain,
            Signature::empty(),
        )
        .unwrap();
        assert!(identity.preserves_relation("<=").unwrap());
        // 1 <= 2 in the chain but the atoms of the square are incomparable
        assert!(!identity.inverse_preserves_relation("<=").unwrap());
        assert!(identity.preserves_relation("<=").unwrap());
        assert!(identity.antitype().is_empty());

        let back = identity.inverse().unwrap();
        assert!(!back.preserves_relation("<=").unwrap());
        assert!(back.inverse_preserves_relation("<=").unwrap());
    }

    #[test]
    fn composition_keeps_shared_symbols_only() {
        let rhombus = catalog::rhombus().model().clone();
        let c2 = catalog::chain(2).model().clone();
        let meets = rhombus.signature().subtype(&["^"], &[]).unwrap();
        let joins = c2.signature().subtype(&["v"], &[]).unwrap();
        // sends only the top to 1: preserves meets, not joins
        let top = Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 0), (1, 0), (2, 0), (3, 1)]),
            rhombus.clone(),
            c2.clone(),
            meets,
        )
        .unwrap();
        assert!(!top.preserves_operation("v").unwrap());
        let identity = Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 0), (1, 1)]),
            c2.clone(),
            c2,
            joins,
        )
        .unwrap();
        let both = identity.composition(&top).unwrap();
        assert!(both.subtype().is_empty());
        assert!(!both.preserves_operation("v").unwrap());
        assert!(both.preserves_operation("^").unwrap());
        assert!(both.antitype() == vec!["v".to_owned()]);
    }

    #[test]
    fn operations_are_checked_through_graphs() {
        let c3 = catalog::chain(3).model().clone();
        let meet_only = c3.signature().subtype(&["^"], &[]).unwrap();
        let h = Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 0), (1, 2), (2, 2)]),
            c3.clone(),
            c3.clone(),
            meet_only,
        )
        .unwrap();
        assert!(h.preserves_operation("v").unwrap());
        let bad = Homomorphism::new(
            MorphismKind::Homomorphism,
            map_of(&[(0, 2), (1, 0), (2, 1)]),
            c3.clone(),
            c3,
            Signature::empty(),
        )
        .unwrap();
        assert!(!bad.preserves_operation("^").unwrap());
    }
}
