//! # Finite Algebra
//!
//! Finite first-order structures and the objects derived from them:
//! subuniverses and substructures, congruences and their lattices,
//! homomorphisms found by an in-process search or by the Minion constraint
//! solver, products and quotients.
//!
//! ```no_run
//! use finite_algebra::{catalog, congruence};
//!
//! let rhombus = catalog::rhombus();
//! let con = congruence::congruence_lattice(rhombus.model()).unwrap();
//! assert_eq!(con.len(), 4);
//! ```

#![warn(missing_docs)]

pub mod catalog;
pub mod congruence;
pub mod error;
pub mod format;
pub mod lattice;
pub mod methods;
pub mod model;
pub mod partition;
pub mod quasivariety;
pub mod signature;
pub mod solver;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{AlgebraError, Result};
