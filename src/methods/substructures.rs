//! Substructure enumerators.

use std::collections::BTreeSet;
use std::rc::Rc;

use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{AlgebraError, Result};
use crate::model::{is_subdirect_universe, Element, Model};
use crate::signature::Signature;
use crate::solver::{self, HomomorphismSearch};

use super::subuniverses::{is_subuniverse, subuniverses, Strategy, Subuniverses};

/// Knobs shared by the substructure enumerators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationOptions {
    /// Operations and relations the substructures keep. Defaults to the
    /// signature of the model.
    pub subtype: Option<Signature>,
    /// Leave out the model itself.
    pub proper: bool,
    /// Yield one substructure per isomorphism class.
    pub filter_isos: bool,
    /// Only yield substructures projecting onto every factor of a product.
    pub filter_subdirect: bool,
    /// Universes that are never yielded.
    pub without: Vec<BTreeSet<Element>>,
    /// How the underlying subuniverses are walked.
    pub strategy: Strategy,
}

impl Default for EnumerationOptions {
    fn default() -> Self {
        EnumerationOptions {
            subtype: None,
            proper: true,
            filter_isos: false,
            filter_subdirect: false,
            without: Vec::new(),
            strategy: Strategy::default(),
        }
    }
}

impl EnumerationOptions {
    /// Restrict the substructures to `subtype`.
    pub fn with_subtype(mut self, subtype: Signature) -> Self {
        self.subtype = Some(subtype);
        self
    }

    /// Also yield the model itself, last.
    pub fn improper(mut self) -> Self {
        self.proper = false;
        self
    }

    /// Yield one substructure per isomorphism class.
    pub fn filter_isos(mut self) -> Self {
        self.filter_isos = true;
        self
    }

    /// Only yield subdirect products. The model must be a product.
    pub fn filter_subdirect(mut self) -> Self {
        self.filter_subdirect = true;
        self
    }

    /// Never yield the given universes.
    pub fn without(mut self, universes: Vec<BTreeSet<Element>>) -> Self {
        self.without = universes;
        self
    }

    /// Walk subuniverses with `strategy`.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    fn subtype_of(&self, model: &Model) -> Result<Signature> {
        match &self.subtype {
            Some(subtype) if subtype.is_subtype_of(model.signature()) => Ok(subtype.clone()),
            Some(subtype) => Err(AlgebraError::TypeMismatch(format!(
                "{} is not a subtype of {}",
                subtype,
                model.signature()
            ))),
            None => Ok(model.signature().clone()),
        }
    }

    fn excludes(&self, universe: &[Element]) -> bool {
        !self.without.is_empty() && {
            let set = universe.iter().cloned().collect::<BTreeSet<_>>();
            self.without.contains(&set)
        }
    }
}

/// Factors a subdirect substructure must project onto.
fn product_factors(model: &Rc<Model>) -> Result<Vec<Rc<Model>>> {
    match model.factors() {
        Some(factors) if factors.len() > 1 => Ok(factors.to_vec()),
        _ => Err(AlgebraError::TypeMismatch(
            "subdirect filtering needs a product of at least two factors".to_owned(),
        )),
    }
}

/// Substructures already produced, compared by equality or up to isomorphism.
struct Found<'a> {
    models: Vec<Rc<Model>>,
    search: &'a dyn HomomorphismSearch,
    filter_isos: bool,
}

impl Found<'_> {
    fn is_new(&self, candidate: &Rc<Model>) -> Result<bool> {
        if self.models.iter().any(|m| **m == **candidate) {
            return Ok(false);
        }
        if self.filter_isos {
            let isomorphic = solver::is_isomorphic_to_any(
                self.search,
                candidate,
                &self.models,
                candidate.signature(),
            )?;
            return Ok(isomorphic.is_none());
        }
        Ok(true)
    }
}

/// Every substructure of `model`, one per closed subuniverse, each a
/// restriction of `model` to the options' subtype.
pub fn substructures<'a>(
    model: &'a Rc<Model>,
    options: &EnumerationOptions,
    search: &'a dyn HomomorphismSearch,
) -> Result<Substructures<'a>> {
    let subtype = options.subtype_of(model)?;
    let factors = if options.filter_subdirect {
        Some(product_factors(model)?)
    } else {
        None
    };
    let universes = subuniverses(model, &subtype, options.proper, options.strategy)?;
    Ok(Substructures {
        root: model,
        subtype,
        options: options.clone(),
        factors,
        walk: Walk::Plain(universes),
        found: Found {
            models: Vec::new(),
            search,
            filter_isos: options.filter_isos,
        },
        whole_pending: false,
    })
}

/// Substructures found top down: the maximal proper substructures of the
/// model first, each followed by its own substructures. The complement of
/// every maximal substructure prunes the subsets containing it.
pub fn substructures_by_maximals<'a>(
    model: &'a Rc<Model>,
    options: &EnumerationOptions,
    search: &'a dyn HomomorphismSearch,
) -> Result<Substructures<'a>> {
    let subtype = options.subtype_of(model)?;
    let factors = if options.filter_subdirect {
        Some(product_factors(model)?)
    } else {
        None
    };
    // validates the subtype against the model
    is_subuniverse(model, &[], &subtype)?;
    Ok(Substructures {
        root: model,
        subtype,
        options: options.clone(),
        factors,
        walk: Walk::Maximals(vec![Level::new(model.universe().to_vec())]),
        found: Found {
            models: Vec::new(),
            search,
            filter_isos: options.filter_isos,
        },
        whole_pending: !options.proper,
    })
}

enum Walk<'a> {
    Plain(Subuniverses<'a>),
    Maximals(Vec<Level>),
}

/// Search for the maximal proper subuniverses of one substructure, through
/// complements of growing size.
struct Level {
    universe: Vec<Element>,
    size: usize,
    complements: Vec<BTreeSet<Element>>,
    candidates: Box<dyn Iterator<Item = Vec<Element>>>,
    unpruned: bool,
}

impl Level {
    fn new(universe: Vec<Element>) -> Level {
        let candidates: Box<dyn Iterator<Item = Vec<Element>>> = if universe.len() > 1 {
            Self::combinations(&universe, 1)
        } else {
            Box::new(std::iter::empty())
        };
        Level {
            universe,
            size: 1,
            complements: Vec::new(),
            candidates,
            unpruned: false,
        }
    }

    fn combinations(universe: &[Element], size: usize) -> Box<dyn Iterator<Item = Vec<Element>>> {
        Box::new(universe.to_vec().into_iter().combinations(size))
    }

    /// Moves to complements one element larger. False once no complement of
    /// the current size escaped pruning, or the complements would cover the
    /// whole universe.
    fn grow(&mut self) -> bool {
        if !self.unpruned || self.size + 1 >= self.universe.len() {
            return false;
        }
        self.size += 1;
        self.unpruned = false;
        self.candidates = Self::combinations(&self.universe, self.size);
        true
    }
}

/// Lazily produced substructures. Items are fallible because isomorphism
/// filtering runs a homomorphism search.
pub struct Substructures<'a> {
    root: &'a Rc<Model>,
    subtype: Signature,
    options: EnumerationOptions,
    factors: Option<Vec<Rc<Model>>>,
    walk: Walk<'a>,
    found: Found<'a>,
    whole_pending: bool,
}

impl<'a> Substructures<'a> {
    fn is_subdirect(&self, universe: &[Element]) -> bool {
        match &self.factors {
            Some(factors) => is_subdirect_universe(universe, factors),
            None => true,
        }
    }

    /// Records a restriction and decides whether to yield it.
    fn accept(&mut self, universe: &[Element]) -> Result<Option<Rc<Model>>> {
        let sub = Rc::new(Model::restrict_closed(self.root, universe, &self.subtype));
        if self.options.excludes(universe) || !self.found.is_new(&sub)? {
            return Ok(None);
        }
        self.found.models.push(sub.clone());
        Ok(Some(sub))
    }

    fn next_plain(&mut self) -> Option<Result<Rc<Model>>> {
        loop {
            let universe = match &mut self.walk {
                Walk::Plain(universes) => universes.next()?,
                Walk::Maximals(_) => return None,
            };
            if !self.is_subdirect(&universe) {
                continue;
            }
            match self.accept(&universe) {
                Ok(Some(sub)) => return Some(Ok(sub)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn next_by_maximals(&mut self) -> Option<Result<Rc<Model>>> {
        loop {
            let levels = match &mut self.walk {
                Walk::Maximals(levels) => levels,
                Walk::Plain(_) => return None,
            };
            let level = match levels.last_mut() {
                Some(level) => level,
                None => return self.whole(),
            };
            let complement = match level.candidates.next() {
                Some(c) => c.into_iter().collect::<BTreeSet<_>>(),
                None => {
                    if !level.grow() {
                        levels.pop();
                    }
                    continue;
                }
            };
            if level.complements.iter().any(|c| c.is_subset(&complement)) {
                continue;
            }
            level.unpruned = true;
            let candidate = level
                .universe
                .iter()
                .filter(|x| !complement.contains(x))
                .cloned()
                .collect::<Vec<_>>();
            match is_subuniverse(self.root, &candidate, &self.subtype) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => return Some(Err(e)),
            }
            level.complements.push(complement);
            // substructures of a non subdirect set are not subdirect either
            if !self.is_subdirect(&candidate) {
                continue;
            }
            let sub = Rc::new(Model::restrict_closed(self.root, &candidate, &self.subtype));
            let fresh = match self.found.is_new(&sub) {
                Ok(fresh) => fresh,
                Err(e) => return Some(Err(e)),
            };
            if !fresh {
                continue;
            }
            if let Walk::Maximals(levels) = &mut self.walk {
                levels.push(Level::new(candidate.clone()));
            }
            if self.options.excludes(&candidate) {
                continue;
            }
            debug!("Substructure of {} elements", candidate.len());
            self.found.models.push(sub.clone());
            return Some(Ok(sub));
        }
    }

    /// The model itself, produced last when the enumeration is not proper.
    fn whole(&mut self) -> Option<Result<Rc<Model>>> {
        if !self.whole_pending {
            return None;
        }
        self.whole_pending = false;
        let universe = self.root.universe().to_vec();
        if !self.is_subdirect(&universe) {
            return None;
        }
        match self.accept(&universe) {
            Ok(found) => found.map(Ok),
            Err(e) => Some(Err(e)),
        }
    }
}

impl Iterator for Substructures<'_> {
    type Item = Result<Rc<Model>>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.walk {
            Walk::Plain(_) => self.next_plain(),
            Walk::Maximals(_) => self.next_by_maximals(),
        };
        if next.is_none() {
            info!(
                "Enumerated {} substructures of a model of {} elements",
                self.found.models.len(),
                self.root.cardinality()
            );
        }
        next
    }
}
