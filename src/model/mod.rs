//! Finite first-order structures and the ways of deriving new ones from old.

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Display;
use std::rc::Rc;

use itertools::Itertools;
use log::debug;

use crate::congruence::Congruence;
use crate::error::{AlgebraError, Result};
use crate::signature::Signature;

pub mod element;
pub mod functions;
pub mod morphism;

pub use element::{atoms, Element};
pub use functions::{Operation, Relation};
pub use morphism::{Homomorphism, MorphismKind};

/// Where a model came from.
#[derive(Debug, Clone)]
pub enum Provenance {
    /// Built directly from tables.
    Plain,
    /// A restriction to a subuniverse.
    Restriction {
        /// The model restricted.
        supermodel: Rc<Model>,
    },
    /// A direct product, universe made of tuples.
    Product {
        /// One model per coordinate.
        factors: Vec<Rc<Model>>,
    },
    /// A quotient by a congruence, each class named by its least element.
    Quotient {
        /// The model divided.
        supermodel: Rc<Model>,
        /// The congruence divided by.
        congruence: Congruence,
    },
}

/// A finite structure: a universe together with total operation tables and
/// relation tables for every symbol of its signature.
#[derive(Debug, Clone)]
pub struct Model {
    name: Option<String>,
    signature: Signature,
    universe: Vec<Element>,
    members: HashSet<Element>,
    operations: BTreeMap<String, Operation>,
    relations: BTreeMap<String, Relation>,
    provenance: Provenance,
    subdirect: OnceCell<bool>,
}

impl Model {
    /// Builds a model, checking that the tables match `signature` exactly and
    /// are defined over `universe`.
    pub fn new(
        signature: Signature,
        universe: Vec<Element>,
        operations: BTreeMap<String, Operation>,
        relations: BTreeMap<String, Relation>,
    ) -> Result<Model> {
        let model = Model::assemble(signature, universe, operations, relations, Provenance::Plain);
        model.validate()?;
        Ok(model)
    }

    /// Builds a model whose tables are known to be well formed.
    pub(crate) fn assemble(
        signature: Signature,
        universe: Vec<Element>,
        operations: BTreeMap<String, Operation>,
        relations: BTreeMap<String, Relation>,
        provenance: Provenance,
    ) -> Model {
        Model {
            name: None,
            members: universe.iter().cloned().collect(),
            signature,
            universe,
            operations,
            relations,
            provenance,
            subdirect: OnceCell::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.members.len() != self.universe.len() {
            return Err(AlgebraError::SignatureMismatch(
                "the universe contains repeated elements".to_owned(),
            ));
        }
        for (sym, arity) in self.signature.operations() {
            let op = self.operations.get(sym).ok_or_else(|| {
                AlgebraError::SignatureMismatch(format!("missing table for operation `{}`", sym))
            })?;
            if op.arity() != arity {
                return Err(AlgebraError::ArityViolation {
                    expected: arity,
                    found: op.arity(),
                });
            }
            op.check_total(sym, &self.universe)?;
        }
        for (sym, arity) in self.signature.relations() {
            let rel = self.relations.get(sym).ok_or_else(|| {
                AlgebraError::SignatureMismatch(format!("missing table for relation `{}`", sym))
            })?;
            if rel.arity() != arity {
                return Err(AlgebraError::ArityViolation {
                    expected: arity,
                    found: rel.arity(),
                });
            }
            rel.check_within(&self.universe)?;
        }
        let undeclared = self
            .operations
            .keys()
            .find(|sym| self.signature.operation_arity(sym).is_none())
            .or_else(|| {
                self.relations
                    .keys()
                    .find(|sym| self.signature.relation_arity(sym).is_none())
            });
        if let Some(sym) = undeclared {
            return Err(AlgebraError::SignatureMismatch(format!(
                "table for `{}` is not declared in {}",
                sym, self.signature
            )));
        }
        Ok(())
    }

    /// Names the model, for display.
    pub fn with_name(mut self, name: impl Into<String>) -> Model {
        self.name = Some(name.into());
        self
    }

    /// The name given by [Model::with_name].
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Symbols and their arities.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The universe in its construction order.
    pub fn universe(&self) -> &[Element] {
        &self.universe
    }

    /// Number of elements.
    pub fn cardinality(&self) -> usize {
        self.universe.len()
    }

    /// Whether `x` is in the universe.
    pub fn contains(&self, x: &Element) -> bool {
        self.members.contains(x)
    }

    /// The table of operation `symbol`.
    pub fn operation(&self, symbol: &str) -> Option<&Operation> {
        self.operations.get(symbol)
    }

    /// The table of relation `symbol`.
    pub fn relation(&self, symbol: &str) -> Option<&Relation> {
        self.relations.get(symbol)
    }

    /// Operations by symbol, in symbol order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &Operation)> + '_ {
        self.operations.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Relations by symbol, in symbol order.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> + '_ {
        self.relations.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// How the model was derived.
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// The model this one was restricted from or is a quotient of.
    pub fn supermodel(&self) -> Option<&Rc<Model>> {
        match &self.provenance {
            Provenance::Restriction { supermodel } | Provenance::Quotient { supermodel, .. } => {
                Some(supermodel)
            }
            _ => None,
        }
    }

    /// Factors of a product, or of the product a restriction comes from.
    pub fn factors(&self) -> Option<&[Rc<Model>]> {
        match &self.provenance {
            Provenance::Product { factors } => Some(factors),
            _ => None,
        }
    }

    /// Evaluates the operation `symbol` on `args`.
    pub fn apply(&self, symbol: &str, args: &[Element]) -> Result<Element> {
        let op = self.operations.get(symbol).ok_or_else(|| {
            AlgebraError::SignatureMismatch(format!("no operation `{}` in {}", symbol, self.signature))
        })?;
        op.apply(args).map(|x| x.clone())
    }

    /// Whether the relation `symbol` holds for `args`. Tuples of universe
    /// elements that are not tabulated are false.
    pub fn holds(&self, symbol: &str, args: &[Element]) -> Result<bool> {
        let rel = self.relations.get(symbol).ok_or_else(|| {
            AlgebraError::SignatureMismatch(format!("no relation `{}` in {}", symbol, self.signature))
        })?;
        if let Some(x) = args.iter().find(|x| !self.contains(x)) {
            return Err(AlgebraError::UnknownElement(x.to_string()));
        }
        rel.holds(args)
    }

    /// Restricts `supermodel` to a subuniverse closed under the operations of
    /// `subtype`. The result keeps a link to `supermodel`.
    pub fn restriction(
        supermodel: &Rc<Model>,
        subuniverse: &[Element],
        subtype: &Signature,
    ) -> Result<Model> {
        if !subtype.is_subtype_of(&supermodel.signature) {
            return Err(AlgebraError::TypeMismatch(format!(
                "{} is not a subtype of {}",
                subtype, supermodel.signature
            )));
        }
        if let Some(x) = subuniverse.iter().find(|x| !supermodel.contains(x)) {
            return Err(AlgebraError::UnknownElement(x.to_string()));
        }
        let model = Model::restrict_closed(supermodel, subuniverse, subtype);
        model.validate()?;
        Ok(model)
    }

    /// Restriction to a set already known to be closed under `subtype`.
    pub(crate) fn restrict_closed(
        supermodel: &Rc<Model>,
        subuniverse: &[Element],
        subtype: &Signature,
    ) -> Model {
        let subset = subuniverse.iter().cloned().collect::<BTreeSet<_>>();
        let operations = subtype
            .operations()
            .filter_map(|(sym, _)| {
                supermodel
                    .operations
                    .get(sym)
                    .map(|op| (sym.to_owned(), op.restrict(&subset)))
            })
            .collect();
        let relations = subtype
            .relations()
            .filter_map(|(sym, _)| {
                supermodel
                    .relations
                    .get(sym)
                    .map(|rel| (sym.to_owned(), rel.restrict(&subset)))
            })
            .collect();
        Model::assemble(
            subtype.clone(),
            subset.into_iter().collect(),
            operations,
            relations,
            Provenance::Restriction {
                supermodel: supermodel.clone(),
            },
        )
    }

    /// Direct product of `factors`, which must share a signature. Factors that
    /// are products themselves are flattened into their own factors.
    pub fn product(factors: Vec<Rc<Model>>) -> Result<Model> {
        let factors = factors
            .into_iter()
            .flat_map(|f| match f.factors() {
                Some(inner) => inner.to_vec(),
                None => vec![f],
            })
            .collect::<Vec<_>>();
        let signature = match factors.first() {
            Some(f) => f.signature.clone(),
            None => {
                return Err(AlgebraError::TypeMismatch(
                    "a product needs at least one factor".to_owned(),
                ))
            }
        };
        if let Some(f) = factors.iter().find(|f| f.signature != signature) {
            return Err(AlgebraError::TypeMismatch(format!(
                "factors of signatures {} and {}",
                signature, f.signature
            )));
        }

        let universe = factors
            .iter()
            .map(|f| f.universe.iter())
            .multi_cartesian_product()
            .map(|xs| Element::Tuple(xs.into_iter().cloned().collect()))
            .collect::<Vec<_>>();
        debug!(
            "Product of {} factors with {} elements",
            factors.len(),
            universe.len()
        );

        let mut operations = BTreeMap::new();
        for (sym, arity) in signature.operations() {
            let parts = factors
                .iter()
                .filter_map(|f| f.operations.get(sym).map(|op| (f.universe(), op)))
                .collect::<Vec<_>>();
            operations.insert(sym.to_owned(), functions::operation_product(&parts, arity));
        }
        let mut relations = BTreeMap::new();
        for (sym, arity) in signature.relations() {
            let parts = factors
                .iter()
                .filter_map(|f| f.relations.get(sym))
                .collect::<Vec<_>>();
            relations.insert(sym.to_owned(), functions::relation_product(&parts, arity));
        }

        Ok(Model::assemble(
            signature,
            universe,
            operations,
            relations,
            Provenance::Product { factors },
        ))
    }

    /// The `n`-th direct power of `model`.
    pub fn power(model: &Rc<Model>, n: usize) -> Result<Model> {
        Model::product(vec![model.clone(); n])
    }

    /// Quotient of `supermodel` by `congruence`. Each class is represented by
    /// its least element and relations hold on the classes of their tuples.
    pub fn quotient(supermodel: &Rc<Model>, congruence: &Congruence) -> Result<Model> {
        if !Rc::ptr_eq(congruence.algebra(), supermodel) && **congruence.algebra() != **supermodel {
            return Err(AlgebraError::TypeMismatch(
                "the congruence belongs to a different algebra".to_owned(),
            ));
        }
        if let Some(op) = congruence.incompatible_operation() {
            return Err(AlgebraError::Incompatible(op));
        }
        let representative = |x: &Element| congruence.representative(x).unwrap_or_else(|| x.clone());
        let universe = supermodel
            .universe
            .iter()
            .map(&representative)
            .collect::<BTreeSet<_>>();
        let classes = universe.iter().cloned().collect::<Vec<_>>();
        let mut operations = BTreeMap::new();
        for (sym, op) in supermodel.operations.iter() {
            let table = functions::tuples(&classes, op.arity())
                .filter_map(|args| op.get(&args).map(|y| (args.clone(), representative(y))))
                .collect::<Vec<_>>();
            operations.insert(sym.clone(), Operation::new(op.arity(), table)?);
        }
        let relations = supermodel
            .relations
            .iter()
            .map(|(sym, rel)| (sym.clone(), rel.rename(&representative)))
            .collect();

        Ok(Model::assemble(
            supermodel.signature.clone(),
            classes,
            operations,
            relations,
            Provenance::Quotient {
                supermodel: supermodel.clone(),
                congruence: congruence.clone(),
            },
        ))
    }

    /// An isomorphic copy over the atoms `0..n`, together with the element
    /// each atom stands for.
    pub fn continuous(&self) -> (Model, Vec<Element>) {
        let translation = self.universe.clone();
        let index = functions::positions(&translation);
        let rename = |x: &Element| {
            index
                .get(x)
                .map(|&i| Element::Atom(i as i64))
                .unwrap_or_else(|| x.clone())
        };
        let operations = self
            .operations
            .iter()
            .map(|(sym, op)| (sym.clone(), op.rename(&rename)))
            .collect();
        let relations = self
            .relations
            .iter()
            .map(|(sym, rel)| (sym.clone(), rel.rename(&rename)))
            .collect();
        let universe = (0..translation.len() as i64).map(Element::Atom).collect();
        (
            Model::assemble(
                self.signature.clone(),
                universe,
                operations,
                relations,
                Provenance::Plain,
            ),
            translation,
        )
    }

    /// Whether a restriction of a product projects onto every factor.
    pub fn is_subdirect(&self) -> bool {
        *self.subdirect.get_or_init(|| {
            match self.supermodel().and_then(|s| s.factors()) {
                Some(factors) if matches!(self.provenance, Provenance::Restriction { .. }) => {
                    is_subdirect_universe(&self.universe, factors)
                }
                _ => false,
            }
        })
    }

    /// Inclusion of a restriction into its supermodel.
    pub fn natural_embedding(submodel: &Rc<Model>) -> Result<Homomorphism> {
        let supermodel = match &submodel.provenance {
            Provenance::Restriction { supermodel } => supermodel.clone(),
            _ => {
                return Err(AlgebraError::TypeMismatch(
                    "only restrictions have a natural embedding".to_owned(),
                ))
            }
        };
        let map = submodel.universe.iter().map(|x| (x.clone(), x.clone())).collect();
        Homomorphism::new(
            MorphismKind::Embedding,
            map,
            submodel.clone(),
            supermodel,
            submodel.signature.clone(),
        )
    }

    /// Projection of a product onto its `i`-th factor.
    pub fn projection(product: &Rc<Model>, i: usize) -> Result<Homomorphism> {
        let factor = product
            .factors()
            .and_then(|fs| fs.get(i))
            .cloned()
            .ok_or_else(|| AlgebraError::TypeMismatch(format!("no factor {} to project onto", i)))?;
        let map = product
            .universe
            .iter()
            .filter_map(|x| x.coordinate(i).map(|y| (x.clone(), y.clone())))
            .collect();
        Ok(Homomorphism::new(
            MorphismKind::Homomorphism,
            map,
            product.clone(),
            factor,
            product.signature.clone(),
        )?
        .with_flags(None, Some(true)))
    }

    /// Map sending each element of the supermodel to its class in the quotient.
    pub fn natural_map(quotient: &Rc<Model>) -> Result<Homomorphism> {
        let (supermodel, congruence) = match &quotient.provenance {
            Provenance::Quotient {
                supermodel,
                congruence,
            } => (supermodel.clone(), congruence),
            _ => {
                return Err(AlgebraError::TypeMismatch(
                    "only quotients have a natural map".to_owned(),
                ))
            }
        };
        let map = supermodel
            .universe
            .iter()
            .map(|x| {
                let class = congruence.representative(x).unwrap_or_else(|| x.clone());
                (x.clone(), class)
            })
            .collect();
        Ok(Homomorphism::new(
            MorphismKind::Homomorphism,
            map,
            supermodel,
            quotient.clone(),
            quotient.signature.clone(),
        )?
        .with_flags(None, Some(true)))
    }
}

/// A set of product elements is subdirect when its projection onto every
/// coordinate is the whole universe of the corresponding factor.
pub fn is_subdirect_universe(universe: &[Element], factors: &[Rc<Model>]) -> bool {
    factors.iter().enumerate().all(|(i, factor)| {
        let projected = universe
            .iter()
            .filter_map(|x| x.coordinate(i))
            .collect::<HashSet<_>>();
        projected.len() == factor.cardinality() && factor.universe.iter().all(|y| projected.contains(y))
    })
}

impl PartialEq for Model {
    /// Same universe as sets, same signature and the same tables for it.
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
            && self.signature == other.signature
            && self
                .signature
                .operations()
                .all(|(sym, _)| self.operations.get(sym) == other.operations.get(sym))
            && self
                .signature
                .relations()
                .all(|(sym, _)| self.relations.get(sym) == other.relations.get(sym))
    }
}

impl Eq for Model {}

impl Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Model({})", name),
            None => write!(
                f,
                "Model({}, {})",
                self.signature,
                element::show(&self.universe)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    fn chain_algebra(n: i64) -> Model {
        let universe = atoms(0..n);
        let mut operations = BTreeMap::new();
        operations.insert(
            "^".to_owned(),
            Operation::from_fn(&universe, 2, |xs| xs[0].clone().min(xs[1].clone())),
        );
        Model::new(
            Signature::algebraic(vec![("^", 2)]),
            universe,
            operations,
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn construction_checks_coverage() {
        let universe = atoms(0..2);
        let err = Model::new(
            Signature::algebraic(vec![("^", 2)]),
            universe.clone(),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert!(matches!(err, Err(AlgebraError::SignatureMismatch(_))));

        let mut partial = BTreeMap::new();
        partial.insert(
            "^".to_owned(),
            Operation::new(2, vec![(atoms(vec![0, 0]), Element::Atom(0))]).unwrap(),
        );
        assert!(Model::new(
            Signature::algebraic(vec![("^", 2)]),
            universe.clone(),
            partial,
            BTreeMap::new()
        )
        .is_err());

        let mut escaping = BTreeMap::new();
        escaping.insert(
            "s".to_owned(),
            Operation::from_fn(&universe, 1, |_| Element::Atom(5)),
        );
        assert!(matches!(
            Model::new(
                Signature::algebraic(vec![("s", 1)]),
                universe,
                escaping,
                BTreeMap::new()
            ),
            Err(AlgebraError::UnknownElement(_))
        ));
    }

    #[test]
    fn equality_ignores_order_and_provenance() {
        let a = Rc::new(chain_algebra(3));
        let sub = Model::restriction(&a, &atoms(vec![2, 1, 0]), a.signature()).unwrap();
        assert_eq!(sub, *a);
        assert_ne!(chain_algebra(2), *a);
    }

    #[test]
    fn restriction_requires_closed_set() {
        let rhombus = catalog::rhombus();
        let lattice = rhombus.model();
        assert!(Model::restriction(lattice, &atoms(vec![1, 2]), lattice.signature()).is_err());
        let sub = Model::restriction(lattice, &atoms(vec![0, 1]), lattice.signature()).unwrap();
        assert_eq!(sub.cardinality(), 2);
        assert!(Rc::ptr_eq(sub.supermodel().unwrap(), lattice));
    }

    #[test]
    fn product_is_coordinatewise() {
        let c2 = catalog::chain(2);
        let square = Model::power(c2.model(), 2).unwrap();
        assert_eq!(square.cardinality(), 4);
        let pair = |a, b| Element::Tuple(atoms(vec![a, b]));
        assert_eq!(
            square.apply("v", &[pair(0, 1), pair(1, 0)]).unwrap(),
            pair(1, 1)
        );
        assert_eq!(
            square.apply("^", &[pair(0, 1), pair(1, 0)]).unwrap(),
            pair(0, 0)
        );
        let cube = Model::product(vec![Rc::new(square), c2.model().clone()]).unwrap();
        assert_eq!(cube.factors().unwrap().len(), 3);
    }

    #[test]
    fn product_rejects_mixed_signatures() {
        let c2 = catalog::chain(2);
        let poset = catalog::chain_poset(2);
        assert!(matches!(
            Model::product(vec![c2.model().clone(), Rc::new(poset)]),
            Err(AlgebraError::TypeMismatch(_))
        ));
        assert!(Model::product(Vec::new()).is_err());
    }

    #[test]
    fn poset_products_order_coordinatewise() {
        let c2 = Rc::new(catalog::chain_poset(2));
        let square = Model::power(&c2, 2).unwrap();
        let pair = |a, b| Element::Tuple(atoms(vec![a, b]));
        assert!(square.holds("<=", &[pair(0, 1), pair(1, 1)]).unwrap());
        assert!(!square.holds("<=", &[pair(0, 1), pair(1, 0)]).unwrap());
        assert!(square.holds("<=", &[pair(0, 1), pair(7, 0)]).is_err());
    }

    #[test]
    fn continuous_renames_to_positions() {
        let c2 = catalog::chain(2);
        let square = Model::power(c2.model(), 2).unwrap();
        let (plain, translation) = square.continuous();
        assert_eq!(plain.universe(), &atoms(0..4)[..]);
        assert_eq!(translation, square.universe());
        let top = plain.apply("v", &atoms(vec![1, 2])).unwrap();
        assert_eq!(translation[top.atom().unwrap() as usize], Element::Tuple(atoms(vec![1, 1])));
    }

    #[test]
    fn subdirect_restrictions() {
        let c2 = catalog::chain(2);
        let square = Rc::new(Model::power(c2.model(), 2).unwrap());
        let pair = |a, b| Element::Tuple(atoms(vec![a, b]));
        let diagonal = Model::restriction(&square, &[pair(0, 0), pair(1, 1)], square.signature()).unwrap();
        assert!(diagonal.is_subdirect());
        let corner = Model::restriction(&square, &[pair(0, 0), pair(0, 1)], square.signature()).unwrap();
        assert!(!corner.is_subdirect());
        assert!(!c2.model().is_subdirect());
    }

    #[test]
    fn projections_and_embeddings() {
        let c2 = catalog::chain(2);
        let square = Rc::new(Model::power(c2.model(), 2).unwrap());
        let p = Model::projection(&square, 1).unwrap();
        assert_eq!(
            p.apply(&Element::Tuple(atoms(vec![0, 1]))).unwrap(),
            &Element::Atom(1)
        );
        assert!(Model::projection(&square, 2).is_err());

        let rhombus = catalog::rhombus();
        let sub = Rc::new(
            Model::restriction(rhombus.model(), &atoms(vec![0, 3]), rhombus.model().signature()).unwrap(),
        );
        let e = Model::natural_embedding(&sub).unwrap();
        assert_eq!(e.kind(), MorphismKind::Embedding);
        assert_eq!(e.image().len(), 2);
        assert!(Model::natural_embedding(rhombus.model()).is_err());
    }
}
