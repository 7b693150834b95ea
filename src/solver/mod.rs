//! Search for structure preserving maps between finite models.
//!
//! A [HomomorphismSearch] answers one [SearchRequest] at a time. The free
//! functions below build the usual requests and skip the search when the
//! sizes of the universes already rule out any solution.

use std::collections::BTreeMap;
use std::rc::Rc;

use log::debug;

use crate::error::{AlgebraError, Result};
use crate::model::{Element, Homomorphism, Model, MorphismKind};
use crate::signature::Signature;

/// In-process backtracking search.
pub mod backtrack;
/// The Minion constraint solver run as a subprocess.
pub mod minion;

pub use backtrack::BacktrackSearch;
pub use minion::{MinionSolver, SolverConfig};

/// Maps from `source` to `target` preserving the symbols of `subtype`.
/// Embeddings and isomorphisms also reflect the relations of `subtype`.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    /// Kind of map to look for.
    pub kind: MorphismKind,
    /// The domain of the maps.
    pub source: &'a Rc<Model>,
    /// The codomain of the maps.
    pub target: &'a Rc<Model>,
    /// Symbols the maps must preserve.
    pub subtype: &'a Signature,
    /// Only injective maps.
    pub injective: bool,
    /// Only surjective maps.
    pub surjective: bool,
    /// Stop at the first solution when unset.
    pub all_solutions: bool,
    /// Maps that must not be returned.
    pub without: &'a [BTreeMap<Element, Element>],
}

impl<'a> SearchRequest<'a> {
    /// A request for every map of `kind`, without further constraints.
    pub fn new(
        kind: MorphismKind,
        source: &'a Rc<Model>,
        target: &'a Rc<Model>,
        subtype: &'a Signature,
    ) -> SearchRequest<'a> {
        SearchRequest {
            kind,
            source,
            target,
            subtype,
            injective: kind >= MorphismKind::Embedding,
            surjective: kind == MorphismKind::Isomorphism,
            all_solutions: true,
            without: &[],
        }
    }

    /// Whether only injective maps are wanted.
    pub fn injective(mut self, injective: bool) -> Self {
        self.injective = injective || self.kind >= MorphismKind::Embedding;
        self
    }

    /// Whether only surjective maps are wanted.
    pub fn surjective(mut self, surjective: bool) -> Self {
        self.surjective = surjective || self.kind == MorphismKind::Isomorphism;
        self
    }

    /// Ask for at most one solution.
    pub fn first_only(mut self) -> Self {
        self.all_solutions = false;
        self
    }

    /// Exclude the given maps from the solutions.
    pub fn without(mut self, without: &'a [BTreeMap<Element, Element>]) -> Self {
        self.without = without;
        self
    }

    /// Both models must carry every symbol of the subtype.
    pub fn check(&self) -> Result<()> {
        for model in [self.source, self.target] {
            if !self.subtype.is_subtype_of(model.signature()) {
                return Err(AlgebraError::TypeMismatch(format!(
                    "{} is not a subtype of {}",
                    self.subtype,
                    model.signature()
                )));
            }
        }
        Ok(())
    }

    /// Whether the cardinalities alone rule out a solution.
    pub fn is_impossible(&self) -> bool {
        let (n, m) = (self.source.cardinality(), self.target.cardinality());
        (self.injective && n > m)
            || (self.surjective && n < m)
            || (self.kind == MorphismKind::Isomorphism && n != m)
    }

    /// Types a solution found for this request.
    pub fn wrap(&self, map: BTreeMap<Element, Element>) -> Result<Homomorphism> {
        let h = Homomorphism::new(
            self.kind,
            map,
            self.source.clone(),
            self.target.clone(),
            self.subtype.clone(),
        )?;
        Ok(h.with_flags(
            self.injective.then(|| true),
            self.surjective.then(|| true),
        ))
    }
}

/// Something able to find homomorphisms, embeddings and isomorphisms.
pub trait HomomorphismSearch {
    /// Solutions of `request`, at most one unless it asks for all of them.
    fn solve(&self, request: &SearchRequest<'_>) -> Result<Vec<Homomorphism>>;

    /// Some request with a solution, with its index. Requests are tried in order.
    fn solve_any(&self, requests: &[SearchRequest<'_>]) -> Result<Option<(usize, Homomorphism)>> {
        for (i, request) in requests.iter().enumerate() {
            if let Some(h) = self.solve(&request.first_only())?.into_iter().next() {
                return Ok(Some((i, h)));
            }
        }
        Ok(None)
    }
}

fn run(search: &dyn HomomorphismSearch, request: SearchRequest<'_>) -> Result<Vec<Homomorphism>> {
    request.check()?;
    if request.is_impossible() {
        debug!(
            "No {:?} from {} to {} elements",
            request.kind,
            request.source.cardinality(),
            request.target.cardinality()
        );
        return Ok(Vec::new());
    }
    search.solve(&request)
}

fn first(search: &dyn HomomorphismSearch, request: SearchRequest<'_>) -> Result<Option<Homomorphism>> {
    Ok(run(search, request.first_only())?.into_iter().next())
}

/// Every homomorphism from `source` to `target` for `subtype`, other than the
/// maps in `without`.
pub fn homomorphisms(
    search: &dyn HomomorphismSearch,
    source: &Rc<Model>,
    target: &Rc<Model>,
    subtype: &Signature,
    injective: bool,
    surjective: bool,
    without: &[BTreeMap<Element, Element>],
) -> Result<Vec<Homomorphism>> {
    let request = SearchRequest::new(MorphismKind::Homomorphism, source, target, subtype)
        .injective(injective)
        .surjective(surjective)
        .without(without);
    run(search, request)
}

/// Every embedding of `source` into `target` for `subtype`.
pub fn embeddings(
    search: &dyn HomomorphismSearch,
    source: &Rc<Model>,
    target: &Rc<Model>,
    subtype: &Signature,
) -> Result<Vec<Homomorphism>> {
    run(search, SearchRequest::new(MorphismKind::Embedding, source, target, subtype))
}

/// Every isomorphism from `source` onto `target` for `subtype`.
pub fn isomorphisms(
    search: &dyn HomomorphismSearch,
    source: &Rc<Model>,
    target: &Rc<Model>,
    subtype: &Signature,
) -> Result<Vec<Homomorphism>> {
    run(search, SearchRequest::new(MorphismKind::Isomorphism, source, target, subtype))
}

/// Every isomorphism of `model` onto itself.
pub fn automorphisms(
    search: &dyn HomomorphismSearch,
    model: &Rc<Model>,
    subtype: &Signature,
) -> Result<Vec<Homomorphism>> {
    isomorphisms(search, model, model, subtype)
}

/// A homomorphism from `source` onto `target`, if any.
pub fn is_homomorphic_image(
    search: &dyn HomomorphismSearch,
    source: &Rc<Model>,
    target: &Rc<Model>,
    subtype: &Signature,
) -> Result<Option<Homomorphism>> {
    let request =
        SearchRequest::new(MorphismKind::Homomorphism, source, target, subtype).surjective(true);
    first(search, request)
}

/// An embedding of `sub` into `model`, if any.
pub fn is_substructure(
    search: &dyn HomomorphismSearch,
    sub: &Rc<Model>,
    model: &Rc<Model>,
    subtype: &Signature,
) -> Result<Option<Homomorphism>> {
    first(search, SearchRequest::new(MorphismKind::Embedding, sub, model, subtype))
}

/// An isomorphism from `a` onto `b`, if any.
pub fn is_isomorphic(
    search: &dyn HomomorphismSearch,
    a: &Rc<Model>,
    b: &Rc<Model>,
    subtype: &Signature,
) -> Result<Option<Homomorphism>> {
    first(search, SearchRequest::new(MorphismKind::Isomorphism, a, b, subtype))
}

/// An isomorphism from `a` to one of `candidates`, if any. The candidates of
/// the right size are handed to the search together.
pub fn is_isomorphic_to_any(
    search: &dyn HomomorphismSearch,
    a: &Rc<Model>,
    candidates: &[Rc<Model>],
    subtype: &Signature,
) -> Result<Option<Homomorphism>> {
    let requests = candidates
        .iter()
        .map(|b| SearchRequest::new(MorphismKind::Isomorphism, a, b, subtype).first_only())
        .filter(|request| !request.is_impossible())
        .collect::<Vec<_>>();
    for request in requests.iter() {
        request.check()?;
    }
    if requests.is_empty() {
        return Ok(None);
    }
    Ok(search.solve_any(&requests)?.map(|(_, h)| h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn cardinality_short_circuits() {
        let c2 = catalog::chain(2).model().clone();
        let c3 = catalog::chain(3).model().clone();
        let sig = c2.signature().clone();
        let into_smaller = SearchRequest::new(MorphismKind::Embedding, &c3, &c2, &sig);
        assert!(into_smaller.is_impossible());
        let onto_larger = SearchRequest::new(MorphismKind::Homomorphism, &c2, &c3, &sig).surjective(true);
        assert!(onto_larger.is_impossible());
        let plain = SearchRequest::new(MorphismKind::Homomorphism, &c3, &c2, &sig);
        assert!(!plain.is_impossible());
        assert!(is_isomorphic(&BacktrackSearch, &c2, &c3, &sig).unwrap().is_none());
    }

    #[test]
    fn requests_respect_the_kind() {
        let c2 = catalog::chain(2).model().clone();
        let sig = c2.signature().clone();
        let iso = SearchRequest::new(MorphismKind::Isomorphism, &c2, &c2, &sig)
            .injective(false)
            .surjective(false);
        assert!(iso.injective && iso.surjective);
    }

    #[test]
    fn subtype_must_be_shared() {
        let c2 = catalog::chain(2).model().clone();
        let poset = Rc::new(catalog::chain_poset(2));
        let sig = c2.signature().clone();
        assert!(matches!(
            homomorphisms(&BacktrackSearch, &c2, &poset, &sig, false, false, &[]),
            Err(AlgebraError::TypeMismatch(_))
        ));
    }

    #[test]
    fn counts_on_standard_structures() {
        let rhombus = catalog::rhombus().model().clone();
        let c2 = catalog::chain(2).model().clone();
        let sig = rhombus.signature().clone();
        let search = BacktrackSearch;
        assert_eq!(homomorphisms(&search, &rhombus, &rhombus, &sig, false, false, &[]).unwrap().len(), 16);
        assert_eq!(homomorphisms(&search, &rhombus, &c2, &sig, false, false, &[]).unwrap().len(), 4);
        assert_eq!(homomorphisms(&search, &rhombus, &c2, &sig, false, true, &[]).unwrap().len(), 2);

        let m3 = catalog::m3().model().clone();
        assert_eq!(automorphisms(&search, &m3, m3.signature()).unwrap().len(), 6);

        let chain = Rc::new(catalog::chain_poset(2));
        let square = Rc::new(catalog::rhombus_poset());
        assert_eq!(embeddings(&search, &chain, &square, chain.signature()).unwrap().len(), 5);
        assert!(is_substructure(&search, &chain, &square, chain.signature()).unwrap().is_some());
        assert!(is_homomorphic_image(&search, &rhombus, &c2, &sig).unwrap().is_some());
    }

    #[test]
    fn without_excludes_maps() {
        let c2 = catalog::chain(2).model().clone();
        let sig = c2.signature().clone();
        let all = homomorphisms(&BacktrackSearch, &c2, &c2, &sig, false, false, &[]).unwrap();
        // both constants and the identity
        assert_eq!(all.len(), 3);
        let skip = vec![all[0].map().clone()];
        let rest = homomorphisms(&BacktrackSearch, &c2, &c2, &sig, false, false, &skip).unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|h| h.map() != &skip[0]));
    }

    #[test]
    fn isomorphic_to_any_candidate() {
        let c2 = catalog::chain(2).model().clone();
        let c3 = catalog::chain(3).model().clone();
        let other = catalog::chain(3).model().clone();
        let sig = c2.signature().clone();
        let found = is_isomorphic_to_any(&BacktrackSearch, &c3, &[c2.clone(), other.clone()], &sig)
            .unwrap()
            .unwrap();
        assert!(Rc::ptr_eq(found.target(), &other));
        assert!(is_isomorphic_to_any(&BacktrackSearch, &c3, &[c2], &sig).unwrap().is_none());
    }
}
