//! Signatures: operation and relation symbols with their arities.

use std::collections::BTreeMap;
use std::fmt::{Display, Write};

use serde::{Deserialize, Serialize};

use crate::error::{AlgebraError, Result};

/// A first-order signature: operation symbols and relation symbols with their arities.
/// Constants are 0-ary operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    operations: BTreeMap<String, usize>,
    relations: BTreeMap<String, usize>,
}

impl Signature {
    /// Creates a signature from operation and relation arities.
    pub fn new<O, R, S1, S2>(operations: O, relations: R) -> Signature
    where
        O: IntoIterator<Item = (S1, usize)>,
        R: IntoIterator<Item = (S2, usize)>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Signature {
            operations: operations.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            relations: relations.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// A purely algebraic signature, no relation symbols.
    pub fn algebraic<O, S>(operations: O) -> Signature
    where
        O: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Signature::new(operations, Vec::<(String, usize)>::new())
    }

    /// The signature with no symbols at all.
    pub fn empty() -> Signature {
        Signature::default()
    }

    /// Arity of the operation `symbol`, if there is one.
    pub fn operation_arity(&self, symbol: &str) -> Option<usize> {
        self.operations.get(symbol).copied()
    }

    /// Arity of the relation `symbol`, if there is one.
    pub fn relation_arity(&self, symbol: &str) -> Option<usize> {
        self.relations.get(symbol).copied()
    }

    /// Operation symbols with their arities, ordered by symbol.
    pub fn operations(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.operations.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Relation symbols with their arities, ordered by symbol.
    pub fn relations(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.relations.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Whether some relation symbol is present.
    pub fn has_relations(&self) -> bool {
        !self.relations.is_empty()
    }

    /// Whether there are no symbols at all.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.relations.is_empty()
    }

    /// Restricts the signature to the named symbols.
    pub fn subtype(&self, operations: &[&str], relations: &[&str]) -> Result<Signature> {
        let mut result = Signature::empty();
        for op in operations {
            let arity = self.operation_arity(op).ok_or_else(|| {
                AlgebraError::SignatureMismatch(format!("no operation `{}` in {}", op, self))
            })?;
            result.operations.insert(op.to_string(), arity);
        }
        for rel in relations {
            let arity = self.relation_arity(rel).ok_or_else(|| {
                AlgebraError::SignatureMismatch(format!("no relation `{}` in {}", rel, self))
            })?;
            result.relations.insert(rel.to_string(), arity);
        }
        Ok(result)
    }

    /// Every symbol of `self` occurs in `supertype` with the same arity.
    pub fn is_subtype_of(&self, supertype: &Signature) -> bool {
        self.operations
            .iter()
            .all(|(op, arity)| supertype.operations.get(op) == Some(arity))
            && self
                .relations
                .iter()
                .all(|(rel, arity)| supertype.relations.get(rel) == Some(arity))
    }

    /// Removes the symbols of `other`, which must be a subtype of `self`.
    pub fn difference(&self, other: &Signature) -> Result<Signature> {
        if !other.is_subtype_of(self) {
            return Err(AlgebraError::TypeMismatch(format!(
                "{} is not a subtype of {}",
                other, self
            )));
        }
        let mut result = self.clone();
        for op in other.operations.keys() {
            result.operations.remove(op);
        }
        for rel in other.relations.keys() {
            result.relations.remove(rel);
        }
        Ok(result)
    }

    /// Symbols declared in both signatures with the same arity.
    pub fn intersection(&self, other: &Signature) -> Signature {
        let common = |a: &BTreeMap<String, usize>, b: &BTreeMap<String, usize>| {
            a.iter()
                .filter(|(sym, arity)| b.get(*sym) == Some(*arity))
                .map(|(sym, arity)| (sym.clone(), *arity))
                .collect()
        };
        Signature {
            operations: common(&self.operations, &other.operations),
            relations: common(&self.relations, &other.relations),
        }
    }

    /// Disjoint union of two signatures.
    pub fn disjoint_union(&self, other: &Signature) -> Result<Signature> {
        let mut result = self.clone();
        for (op, arity) in other.operations.iter() {
            if result.operations.insert(op.clone(), *arity).is_some() {
                return Err(AlgebraError::TypeMismatch(format!(
                    "operation `{}` is declared in both {} and {}",
                    op, self, other
                )));
            }
        }
        for (rel, arity) in other.relations.iter() {
            if result.relations.insert(rel.clone(), *arity).is_some() {
                return Err(AlgebraError::TypeMismatch(format!(
                    "relation `{}` is declared in both {} and {}",
                    rel, self, other
                )));
            }
        }
        Ok(result)
    }
}

fn write_symbols(f: &mut std::fmt::Formatter<'_>, symbols: &BTreeMap<String, usize>) -> std::fmt::Result {
    f.write_char('{')?;
    for (i, (sym, arity)) in symbols.iter().enumerate() {
        if i != 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {}", sym, arity)?;
    }
    f.write_char('}')
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Signature(")?;
        write_symbols(f, &self.operations)?;
        f.write_str(", ")?;
        write_symbols(f, &self.relations)?;
        f.write_char(')')
    }
}

#[cfg(test)]
mod tests {
    use super::Signature;

    #[test]
    fn subtype_restricts_symbols() {
        let t = Signature::new(vec![("+", 2)], vec![("<", 2)]);
        let st = t.subtype(&["+"], &[]).unwrap();
        assert_eq!(st, Signature::algebraic(vec![("+", 2)]));
        assert!(st.is_subtype_of(&t));
        assert!(!t.is_subtype_of(&st));
        assert!(t.subtype(&["*"], &[]).is_err());
    }

    #[test]
    fn union_and_difference() {
        let sum = Signature::new(vec![("+", 2)], vec![("<", 2)])
            .disjoint_union(&Signature::new(vec![("-", 2)], vec![("<=", 2)]))
            .unwrap();
        assert_eq!(
            sum.operations().map(|(s, _)| s).collect::<Vec<_>>(),
            vec!["+", "-"]
        );
        assert_eq!(
            sum.relations().map(|(s, _)| s).collect::<Vec<_>>(),
            vec!["<", "<="]
        );

        let rest = sum
            .difference(&Signature::new(vec![("-", 2)], vec![("<=", 2)]))
            .unwrap();
        assert_eq!(rest, Signature::new(vec![("+", 2)], vec![("<", 2)]));
    }

    #[test]
    fn intersection_needs_matching_arity() {
        let a = Signature::new(vec![("+", 2), ("-", 1)], vec![("<", 2)]);
        let b = Signature::new(vec![("+", 2), ("-", 2)], vec![("<=", 2)]);
        assert_eq!(a.intersection(&b), Signature::algebraic(vec![("+", 2)]));
        assert_eq!(a.intersection(&a), a);
        assert!(a.intersection(&Signature::empty()).is_empty());
    }

    #[test]
    fn union_rejects_collisions() {
        let t = Signature::algebraic(vec![("+", 2)]);
        assert!(t.disjoint_union(&t).is_err());
    }

    #[test]
    fn difference_requires_containment() {
        let t = Signature::algebraic(vec![("+", 2)]);
        let other = Signature::algebraic(vec![("+", 3)]);
        assert!(t.difference(&other).is_err());
    }

    #[test]
    fn displays_symbols() {
        let t = Signature::new(vec![("+", 2)], vec![("<", 2)]);
        assert_eq!(t.to_string(), "Signature({+: 2}, {<: 2})");
    }
}
