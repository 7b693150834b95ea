use std::collections::{BTreeMap, HashSet};

use log::debug;

use crate::error::{AlgebraError, Result};
use crate::model::functions::positions;
use crate::model::{Element, Homomorphism, Model, MorphismKind};

use super::{HomomorphismSearch, SearchRequest};

/// Depth first search over assignments of the source elements, in universe
/// order. A constraint is checked as soon as its last variable is assigned.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktrackSearch;

/// A source tuple whose image must fall in a table of target tuples.
struct Constraint {
    vars: Vec<usize>,
    table: usize,
}

struct Problem {
    n: usize,
    m: usize,
    tables: Vec<HashSet<Vec<usize>>>,
    /// Constraints indexed by their largest variable.
    ready: Vec<Vec<Constraint>>,
    /// Tuples of the target relations and the matching source relations,
    /// checked on complete injective maps.
    reflect: Vec<(Vec<Vec<usize>>, HashSet<Vec<usize>>)>,
    injective: bool,
    surjective: bool,
    all_solutions: bool,
    without: Vec<Vec<Option<usize>>>,
}

fn index_tuples<'a, I>(index: &std::collections::HashMap<&Element, usize>, tuples: I) -> Result<Vec<Vec<usize>>>
where
    I: Iterator<Item = &'a Vec<Element>>,
{
    tuples
        .map(|t| {
            t.iter()
                .map(|x| {
                    index
                        .get(x)
                        .copied()
                        .ok_or_else(|| AlgebraError::UnknownElement(x.to_string()))
                })
                .collect()
        })
        .collect()
}

impl Problem {
    fn new(request: &SearchRequest<'_>) -> Result<Problem> {
        let source: &Model = request.source;
        let target: &Model = request.target;
        let s_index = positions(source.universe());
        let t_index = positions(target.universe());
        let n = source.cardinality();
        let mut tables = Vec::new();
        let mut ready: Vec<Vec<Constraint>> = (0..n).map(|_| Vec::new()).collect();
        let mut add = |source_rows: Vec<Vec<usize>>, target_rows: Vec<Vec<usize>>| {
            let table = tables.len();
            tables.push(target_rows.into_iter().collect::<HashSet<_>>());
            for vars in source_rows {
                let last = vars.iter().max().copied();
                match last {
                    Some(last) => ready[last].push(Constraint { vars, table }),
                    None => {
                        if let Some(first) = ready.first_mut() {
                            first.push(Constraint { vars, table });
                        }
                    }
                }
            }
        };

        for (sym, _) in request.subtype.operations() {
            let (Some(op_s), Some(op_t)) = (source.operation(sym), target.operation(sym)) else {
                return Err(AlgebraError::SignatureMismatch(format!("no operation `{}`", sym)));
            };
            let s_graph = op_s.graph();
            let t_graph = op_t.graph();
            add(
                index_tuples(&s_index, s_graph.tuples())?,
                index_tuples(&t_index, t_graph.tuples())?,
            );
        }
        let mut reflect = Vec::new();
        for (sym, _) in request.subtype.relations() {
            let (Some(rel_s), Some(rel_t)) = (source.relation(sym), target.relation(sym)) else {
                return Err(AlgebraError::SignatureMismatch(format!("no relation `{}`", sym)));
            };
            let s_rows = index_tuples(&s_index, rel_s.tuples())?;
            let t_rows = index_tuples(&t_index, rel_t.tuples())?;
            if request.kind >= MorphismKind::Embedding {
                reflect.push((t_rows.clone(), s_rows.iter().cloned().collect()));
            }
            add(s_rows, t_rows);
        }

        let without = request
            .without
            .iter()
            .map(|map| {
                source
                    .universe()
                    .iter()
                    .map(|x| map.get(x).and_then(|y| t_index.get(y).copied()))
                    .collect()
            })
            .collect();
        Ok(Problem {
            n,
            m: target.cardinality(),
            tables,
            ready,
            reflect,
            injective: request.injective,
            surjective: request.surjective,
            all_solutions: request.all_solutions,
            without,
        })
    }

    fn consistent(&self, i: usize, assignment: &[usize]) -> bool {
        self.ready[i].iter().all(|c| {
            let image = c.vars.iter().map(|&v| assignment[v]).collect::<Vec<_>>();
            self.tables[c.table].contains(&image)
        })
    }

    fn complete(&self, assignment: &[usize]) -> bool {
        if self
            .without
            .iter()
            .any(|w| w.iter().zip(assignment).all(|(x, &y)| *x == Some(y)))
        {
            return false;
        }
        if self.reflect.is_empty() {
            return true;
        }
        let mut preimage = vec![None; self.m];
        for (x, &y) in assignment.iter().enumerate() {
            preimage[y] = Some(x);
        }
        self.reflect.iter().all(|(target_rows, source_rows)| {
            target_rows.iter().all(|row| {
                match row.iter().map(|&y| preimage[y]).collect::<Option<Vec<_>>>() {
                    Some(pre) => source_rows.contains(&pre),
                    None => true,
                }
            })
        })
    }

    fn solve(&self) -> Vec<Vec<usize>> {
        let mut solutions = Vec::new();
        let mut assignment = Vec::with_capacity(self.n);
        let mut used = vec![0usize; self.m];
        self.extend(&mut assignment, &mut used, &mut solutions);
        solutions
    }

    /// Returns true once the search should stop.
    fn extend(&self, assignment: &mut Vec<usize>, used: &mut Vec<usize>, solutions: &mut Vec<Vec<usize>>) -> bool {
        let i = assignment.len();
        if i == self.n {
            if self.complete(assignment) {
                solutions.push(assignment.clone());
                return !self.all_solutions;
            }
            return false;
        }
        if self.surjective {
            let missing = used.iter().filter(|&&k| k == 0).count();
            if missing > self.n - i {
                return false;
            }
        }
        for y in 0..self.m {
            if self.injective && used[y] > 0 {
                continue;
            }
            assignment.push(y);
            used[y] += 1;
            let stop = self.consistent(i, assignment) && self.extend(assignment, used, solutions);
            used[y] -= 1;
            assignment.pop();
            if stop {
                return true;
            }
        }
        false
    }
}

impl HomomorphismSearch for BacktrackSearch {
    fn solve(&self, request: &SearchRequest<'_>) -> Result<Vec<Homomorphism>> {
        request.check()?;
        if request.is_impossible() {
            return Ok(Vec::new());
        }
        let problem = Problem::new(request)?;
        if problem.n == 0 {
            // only the empty map, which no constraint can reject
            return match request.wrap(BTreeMap::new()) {
                Ok(h) if problem.complete(&[]) && (!problem.surjective || problem.m == 0) => Ok(vec![h]),
                _ => Ok(Vec::new()),
            };
        }
        let solutions = problem.solve();
        debug!(
            "Backtracking found {} {:?} solutions",
            solutions.len(),
            request.kind
        );
        let source = request.source.universe();
        let target = request.target.universe();
        solutions
            .into_iter()
            .map(|values| {
                let map = source
                    .iter()
                    .cloned()
                    .zip(values.into_iter().map(|y| target[y].clone()))
                    .collect();
                request.wrap(map)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::lattice::MEET;
    use std::rc::Rc;

    #[test]
    fn embeddings_reflect_the_order() {
        let chain = Rc::new(catalog::chain_poset(3));
        let m3 = Rc::new(catalog::m3_poset());
        let request = SearchRequest::new(MorphismKind::Embedding, &chain, &m3, chain.signature());
        // bottom, an atom, top
        assert_eq!(BacktrackSearch.solve(&request).unwrap().len(), 3);

        // an injective order preserving map from a chain already reflects the order
        let injective = SearchRequest::new(MorphismKind::Homomorphism, &chain, &m3, chain.signature())
            .injective(true);
        assert_eq!(BacktrackSearch.solve(&injective).unwrap().len(), 3);

        // the two atoms of the rhombus are incomparable, the chain above them is not
        let two = Rc::new(catalog::chain_poset(2));
        let square = Rc::new(catalog::rhombus_poset());
        let homs = SearchRequest::new(MorphismKind::Homomorphism, &square, &two, square.signature());
        let embeds = SearchRequest::new(MorphismKind::Embedding, &two, &square, two.signature());
        assert_eq!(BacktrackSearch.solve(&embeds).unwrap().len(), 5);
        assert!(BacktrackSearch.solve(&homs).unwrap().len() > 5);
    }

    #[test]
    fn first_solution_only() {
        let rhombus = catalog::rhombus().model().clone();
        let request = SearchRequest::new(MorphismKind::Homomorphism, &rhombus, &rhombus, rhombus.signature())
            .first_only();
        assert_eq!(BacktrackSearch.solve(&request).unwrap().len(), 1);
    }

    #[test]
    fn reducts_have_more_maps() {
        let rhombus = catalog::rhombus().model().clone();
        let meets = rhombus.signature().subtype(&[MEET], &[]).unwrap();
        let full = SearchRequest::new(MorphismKind::Isomorphism, &rhombus, &rhombus, rhombus.signature());
        let reduct = SearchRequest::new(MorphismKind::Isomorphism, &rhombus, &rhombus, &meets);
        assert_eq!(BacktrackSearch.solve(&full).unwrap().len(), 2);
        assert_eq!(BacktrackSearch.solve(&reduct).unwrap().len(), 2);
        for h in BacktrackSearch.solve(&reduct).unwrap() {
            assert_eq!(h.subtype(), &meets);
            assert!(h.is_auto());
        }
    }

    #[test]
    fn solutions_are_homomorphisms() {
        let n5 = catalog::n5().model().clone();
        let c2 = catalog::chain(2).model().clone();
        let request = SearchRequest::new(MorphismKind::Homomorphism, &n5, &c2, n5.signature());
        for h in BacktrackSearch.solve(&request).unwrap() {
            assert!(h.preserves_operation(MEET).unwrap());
            assert!(h.kernel().unwrap().is_compatible());
        }
    }
}
