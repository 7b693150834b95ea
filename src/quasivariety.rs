//! Quasivarieties generated by finitely many finite algebras: their
//! relatively subdirectly irreducible members, membership through
//! subdirect embeddings, and relative congruence lattices.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, info};

use crate::congruence::{congruences_in, Congruence, CongruenceLattice, CongruenceSystem};
use crate::error::{AlgebraError, Result};
use crate::methods::{substructures, EnumerationOptions};
use crate::model::{Element, Homomorphism, Model, MorphismKind};
use crate::signature::Signature;
use crate::solver::{self, HomomorphismSearch};

/// How an algebra belongs to a quasivariety.
#[derive(Debug)]
pub enum Membership {
    /// At most one element; such an algebra is in every quasivariety.
    Trivial,
    /// An isomorphism onto a relatively subdirectly irreducible member.
    Irreducible(Homomorphism),
    /// An embedding into a product of relatively subdirectly irreducible
    /// members, one factor per homomorphism used to separate the elements.
    Embedding(Homomorphism),
}

/// The quasivariety generated by `generators`.
#[derive(Debug)]
pub struct Quasivariety {
    generators: Vec<Rc<Model>>,
    signature: Signature,
    rsi: OnceCell<Vec<Rc<Model>>>,
}

impl Quasivariety {
    /// Fails unless there is at least one generator and all share a signature.
    pub fn new(generators: Vec<Rc<Model>>) -> Result<Quasivariety> {
        let signature = match generators.first() {
            Some(g) => g.signature().clone(),
            None => {
                return Err(AlgebraError::TypeMismatch(
                    "a quasivariety needs at least one generator".to_owned(),
                ))
            }
        };
        if let Some(g) = generators.iter().find(|g| *g.signature() != signature) {
            return Err(AlgebraError::TypeMismatch(format!(
                "generators of signatures {} and {}",
                signature,
                g.signature()
            )));
        }
        Ok(Quasivariety {
            generators,
            signature,
            rsi: OnceCell::new(),
        })
    }

    /// The algebras the quasivariety was built from.
    pub fn generators(&self) -> &[Rc<Model>] {
        &self.generators
    }

    /// The signature shared by every member.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The relatively subdirectly irreducible members, one per isomorphism
    /// class, each over the atoms `0..n`. Computed once.
    ///
    /// Candidates are the nontrivial substructures of the generators. A
    /// candidate is dropped when the kernels of its surjections onto the
    /// remaining candidates meet in the minimum congruence.
    pub fn rsi(&self, search: &dyn HomomorphismSearch) -> Result<&[Rc<Model>]> {
        if self.rsi.get().is_none() {
            let found = self.find_rsi(search)?;
            info!("{} relatively subdirectly irreducible members", found.len());
            let _ = self.rsi.set(found);
        }
        Ok(self.rsi.get().map(Vec::as_slice).unwrap_or_default())
    }

    fn find_rsi(&self, search: &dyn HomomorphismSearch) -> Result<Vec<Rc<Model>>> {
        let options = EnumerationOptions::default().improper().filter_isos();
        let mut candidates: Vec<Rc<Model>> = Vec::new();
        for g in self.generators.iter() {
            for sub in substructures(g, &options, search)? {
                let sub = sub?;
                if sub.cardinality() <= 1 {
                    continue;
                }
                let known =
                    solver::is_isomorphic_to_any(search, &sub, &candidates, &self.signature)?;
                if known.is_none() {
                    candidates.push(Rc::new(sub.continuous().0));
                }
            }
        }
        debug!("{} candidate members", candidates.len());

        for i in (0..candidates.len()).rev() {
            let others = candidates
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, c)| c.clone())
                .collect::<Vec<_>>();
            if self.separating(search, &candidates[i], &others)?.is_some() {
                debug!("{} is a subdirect product of smaller members", candidates[i]);
                candidates.remove(i);
            }
        }
        Ok(candidates)
    }

    /// Surjections from `a` onto members of `targets` whose kernels meet in
    /// the minimum congruence, stopping as soon as they do.
    fn separating(
        &self,
        search: &dyn HomomorphismSearch,
        a: &Rc<Model>,
        targets: &[Rc<Model>],
    ) -> Result<Option<Vec<Homomorphism>>> {
        let minimum = Congruence::minimum(a);
        let mut kernel = Congruence::maximum(a);
        let mut used = Vec::new();
        for b in targets {
            for f in solver::homomorphisms(search, a, b, &self.signature, false, true, &[])? {
                kernel = kernel.meet(&f.kernel()?)?;
                used.push(f);
                if kernel == minimum {
                    return Ok(Some(used));
                }
            }
        }
        Ok(None)
    }

    /// Whether `a` belongs to the quasivariety, and the witness if so.
    pub fn contains(
        &self,
        search: &dyn HomomorphismSearch,
        a: &Rc<Model>,
    ) -> Result<Option<Membership>> {
        if *a.signature() != self.signature {
            return Err(AlgebraError::SignatureMismatch(format!(
                "{} is not of signature {}",
                a,
                self.signature
            )));
        }
        if a.cardinality() <= 1 {
            return Ok(Some(Membership::Trivial));
        }
        let rsi = self.rsi(search)?;
        if let Some(iso) = solver::is_isomorphic_to_any(search, a, rsi, &self.signature)? {
            return Ok(Some(Membership::Irreducible(iso)));
        }
        let used = match self.separating(search, a, rsi)? {
            Some(used) => used,
            None => return Ok(None),
        };
        let target = Rc::new(Model::product(
            used.iter().map(|f| f.target().clone()).collect(),
        )?);
        let mut map = BTreeMap::new();
        for x in a.universe() {
            let image = used
                .iter()
                .map(|f| f.apply(x).cloned())
                .collect::<Result<Vec<_>>>()?;
            map.insert(x.clone(), Element::Tuple(image));
        }
        let embedding = Homomorphism::new(
            MorphismKind::Embedding,
            map,
            a.clone(),
            target,
            self.signature.clone(),
        )?;
        Ok(Some(Membership::Embedding(embedding)))
    }

    /// The relatively completely meet irreducible congruences of `a`: the
    /// kernels of its surjections onto relatively subdirectly irreducible
    /// members. `None` when `a` is not in the quasivariety.
    pub fn cmi(
        &self,
        search: &dyn HomomorphismSearch,
        a: &Rc<Model>,
    ) -> Result<Option<Vec<Congruence>>> {
        match self.contains(search, a)? {
            None => Ok(None),
            Some(Membership::Trivial) => Ok(Some(Vec::new())),
            Some(_) => {
                let rsi = self.rsi(search)?;
                Ok(Some(congruences_in(search, a, rsi)?))
            }
        }
    }

    /// The lattice of relative congruences of `a`: meets of relatively
    /// completely meet irreducible congruences, joined inside that set.
    pub fn congruence_lattice(
        &self,
        search: &dyn HomomorphismSearch,
        a: &Rc<Model>,
    ) -> Result<Option<CongruenceLattice>> {
        match self.cmi(search, a)? {
            Some(cmi) => Ok(Some(CongruenceLattice::generated_by(a, cmi)?)),
            None => Ok(None),
        }
    }

    /// Whether every two-equation system over the relatively completely meet
    /// irreducible congruences of `a` that is consistent in the relative
    /// lattice has a solution. `None` when `a` is not in the quasivariety.
    pub fn solves_systems(
        &self,
        search: &dyn HomomorphismSearch,
        a: &Rc<Model>,
    ) -> Result<Option<bool>> {
        let cmi = match self.cmi(search, a)? {
            Some(cmi) => cmi,
            None => return Ok(None),
        };
        let lattice = CongruenceLattice::generated_by(a, cmi.clone())?;
        let sigma = lattice.congruences();
        for (i, theta) in cmi.iter().enumerate() {
            for phi in cmi.iter().skip(i + 1) {
                for x in a.universe() {
                    for y in a.universe() {
                        let system = CongruenceSystem::new(
                            vec![theta.clone(), phi.clone()],
                            vec![x.clone(), y.clone()],
                        )?;
                        if system.is_system(Some(sigma))? && !system.has_solution() {
                            debug!("No solution for {} ~ {} over {} and {}", x, y, theta, phi);
                            return Ok(Some(false));
                        }
                    }
                }
            }
        }
        Ok(Some(true))
    }
}
