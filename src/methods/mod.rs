//! Enumeration of subuniverses and substructures.
//!
//! Closures are computed under the operations of a sub-signature. The
//! enumerators never produce the empty set, and with `proper` they skip the
//! whole universe.

pub mod substructures;
pub mod subuniverses;

pub use substructures::{substructures, substructures_by_maximals, EnumerationOptions, Substructures};
pub use subuniverses::{closure, is_subuniverse, subuniverses, Closure, Strategy, Subuniverses};
