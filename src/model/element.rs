//! Universe elements: integer atoms and tuples of elements.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A member of a universe. Plain structures use integer atoms, products use
/// tuples of the factors' elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Element {
    /// A plain element.
    Atom(i64),
    /// An element of a product, one coordinate per factor.
    Tuple(Vec<Element>),
}

impl Element {
    /// The integer of an atom.
    pub fn atom(&self) -> Option<i64> {
        match self {
            Element::Atom(x) => Some(*x),
            Element::Tuple(_) => None,
        }
    }

    /// The `i`-th coordinate of a tuple element.
    pub fn coordinate(&self, i: usize) -> Option<&Element> {
        match self {
            Element::Atom(_) => None,
            Element::Tuple(xs) => xs.get(i),
        }
    }
}

impl From<i64> for Element {
    fn from(x: i64) -> Self {
        Element::Atom(x)
    }
}

impl From<Vec<Element>> for Element {
    fn from(xs: Vec<Element>) -> Self {
        Element::Tuple(xs)
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Element::Atom(x) => write!(f, "{}", x),
            Element::Tuple(xs) => {
                write!(f, "(")?;
                for (i, x) in xs.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Builds a universe of atoms.
pub fn atoms<I: IntoIterator<Item = i64>>(xs: I) -> Vec<Element> {
    xs.into_iter().map(Element::Atom).collect()
}

/// Displays a slice of elements as `[a, b, c]`.
pub(crate) fn show(xs: &[Element]) -> String {
    format!("[{}]", xs.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuples_display_coordinatewise() {
        let e = Element::Tuple(vec![Element::Atom(1), Element::Tuple(atoms(vec![0, 2]))]);
        assert_eq!(e.to_string(), "(1,(0,2))");
        assert_eq!(e.coordinate(0), Some(&Element::Atom(1)));
        assert_eq!(e.coordinate(2), None);
        assert_eq!(e.atom(), None);
    }
}
