//! Congruence lattices, full or generated by a set of congruences.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::error::{AlgebraError, Result};
use crate::lattice::Lattice;
use crate::model::{Element, Model};

use super::{congruences, sup_proj, Congruence};

/// A lattice whose elements stand for congruences of one algebra. Element
/// `i` of the underlying lattice is `congruences()[i]`.
#[derive(Debug)]
pub struct CongruenceLattice {
    algebra: Rc<Model>,
    congruences: Vec<Congruence>,
    lattice: Lattice,
}

/// The lattice of all congruences of `algebra`.
pub fn congruence_lattice(algebra: &Rc<Model>) -> Result<CongruenceLattice> {
    CongruenceLattice::full(algebra)
}

impl CongruenceLattice {
    /// Every congruence of `algebra`; joins are joins of partitions.
    pub fn full(algebra: &Rc<Model>) -> Result<CongruenceLattice> {
        let all = congruences(algebra);
        Self::tabulate(algebra, all, |x, y| x.join(y))
    }

    /// The closure of `seeds` under meets together with the maximum
    /// congruence. The join of two members is the least member above both,
    /// which need not be the join of the partitions.
    pub fn generated_by(algebra: &Rc<Model>, seeds: Vec<Congruence>) -> Result<CongruenceLattice> {
        let mut members = vec![Congruence::maximum(algebra)];
        let mut keys = vec![members[0].key()];
        for seed in seeds {
            if !Rc::ptr_eq(seed.algebra(), algebra) && **seed.algebra() != **algebra {
                return Err(AlgebraError::TypeMismatch(
                    "seed congruence of another algebra".to_owned(),
                ));
            }
            if !keys.contains(&seed.key()) {
                keys.push(seed.key());
                members.push(seed);
            }
        }
        let mut fresh = true;
        while fresh {
            fresh = false;
            let n = members.len();
            for i in 0..n {
                for j in (i + 1)..n {
                    let m = members[i].meet(&members[j])?;
                    let key = m.key();
                    if !keys.contains(&key) {
                        keys.push(key);
                        members.push(m);
                        fresh = true;
                    }
                }
            }
        }
        let sigma = members.clone();
        Self::tabulate(algebra, members, |x, y| sup_proj(&sigma, x, y))
    }

    fn tabulate<F>(algebra: &Rc<Model>, mut members: Vec<Congruence>, join: F) -> Result<CongruenceLattice>
    where
        F: Fn(&Congruence, &Congruence) -> Result<Congruence>,
    {
        members.sort_by_key(|c| Reverse(c.partition().block_count()));
        let position = members
            .iter()
            .enumerate()
            .map(|(i, c)| (c.key(), i))
            .collect::<HashMap<_, _>>();
        let lookup = |c: Congruence| {
            position.get(&c.key()).copied().ok_or_else(|| {
                AlgebraError::TypeMismatch(format!("{} is not a member of the lattice", c))
            })
        };
        let n = members.len();
        let mut meet = vec![vec![0; n]; n];
        let mut join_table = vec![vec![0; n]; n];
        for i in 0..n {
            for j in i..n {
                let m = lookup(members[i].meet(&members[j])?)?;
                let k = lookup(join(&members[i], &members[j])?)?;
                meet[i][j] = m;
                meet[j][i] = m;
                join_table[i][j] = k;
                join_table[j][i] = k;
            }
        }
        debug!("Tabulated a congruence lattice of {} elements", n);
        let universe = (0..n as i64).map(Element::Atom).collect();
        Ok(CongruenceLattice {
            algebra: algebra.clone(),
            congruences: members,
            lattice: Lattice::from_tables(universe, meet, join_table),
        })
    }

    /// The algebra whose congruences these are.
    pub fn algebra(&self) -> &Rc<Model> {
        &self.algebra
    }

    /// The lattice over the atoms `0..len`.
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Members ordered by decreasing number of classes.
    pub fn congruences(&self) -> &[Congruence] {
        &self.congruences
    }

    /// Number of congruences in the lattice.
    pub fn len(&self) -> usize {
        self.congruences.len()
    }

    /// Never true: the maximum is always a member.
    pub fn is_empty(&self) -> bool {
        self.congruences.is_empty()
    }

    /// The congruence an element of the lattice stands for.
    pub fn congruence(&self, x: &Element) -> Option<&Congruence> {
        let i = usize::try_from(x.atom()?).ok()?;
        self.congruences.get(i)
    }

    /// The element standing for `theta`.
    pub fn element(&self, theta: &Congruence) -> Option<Element> {
        self.congruences
            .iter()
            .position(|c| c == theta)
            .map(|i| Element::Atom(i as i64))
    }
}
