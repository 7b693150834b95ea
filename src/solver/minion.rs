use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tempdir::TempDir;
use wait_timeout::ChildExt;

use crate::error::{AlgebraError, Result};
use crate::model::functions::positions;
use crate::model::{Element, Homomorphism, Model, MorphismKind, Operation, Relation};
use crate::signature::Signature;

use super::{HomomorphismSearch, SearchRequest};

/// How to run the Minion executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// The `minion` binary, looked up on `PATH` when relative.
    pub minion_path: PathBuf,
    /// Kill a solver process running longer than this.
    pub timeout_ms: Option<u64>,
    /// Passed to `-randomseed`.
    pub seed: u64,
    /// Most solver processes running at once, rayon's default when unset.
    pub parallelism: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            minion_path: PathBuf::from("minion"),
            timeout_ms: None,
            seed: 0,
            parallelism: None,
        }
    }
}

impl SolverConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<SolverConfig> {
        serde_json::from_str(text).map_err(|e| AlgebraError::Parse {
            line: e.line(),
            message: e.to_string(),
        })
    }

    /// Reads a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<SolverConfig> {
        SolverConfig::from_json(&fs::read_to_string(path)?)
    }

    /// The bound on a single run, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Input for one Minion run. Elements are numbered by their position in the
/// universes, solutions are read back through the same numbering.
#[derive(Debug, Clone)]
struct MinionInput {
    text: String,
    source: Vec<Element>,
    target: Vec<Element>,
}

/// Names Minion accepts: alphabetic symbols are kept, anything else is
/// renamed after its position in the signature.
fn minion_names(subtype: &Signature) -> HashMap<String, String> {
    subtype
        .operations()
        .map(|(sym, _)| sym)
        .chain(subtype.relations().map(|(sym, _)| sym))
        .enumerate()
        .map(|(i, sym)| {
            let name = if !sym.is_empty() && sym.chars().all(|c| c.is_ascii_alphabetic()) {
                sym.to_owned()
            } else {
                format!("sym{}", i)
            };
            (sym.to_owned(), name)
        })
        .collect()
}

fn index_rows<'a, I>(index: &HashMap<&Element, usize>, rows: I) -> Result<Vec<Vec<usize>>>
where
    I: Iterator<Item = &'a Vec<Element>>,
{
    rows.map(|row| {
        row.iter()
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

fn join_indices<'a, I: IntoIterator<Item = &'a usize>>(xs: I, sep: &str) -> String {
    xs.into_iter().map(|x| x.to_string()).collect::<Vec<_>>().join(sep)
}

/// A tuple list `name height width` followed by its rows.
fn write_table(out: &mut String, name: &str, width: usize, rows: &[Vec<usize>]) {
    let _ = writeln!(out, "{} {} {}", name, rows.len(), width);
    for row in rows {
        let _ = writeln!(out, "{}", join_indices(row, " "));
    }
    out.push('\n');
}

/// Rows of an operation as `args.. image`, or of a relation as its tuples.
enum Symbol<'a> {
    Op(&'a Operation),
    Rel(&'a Relation),
}

impl Symbol<'_> {
    fn width(&self) -> usize {
        match self {
            Symbol::Op(op) => op.arity() + 1,
            Symbol::Rel(rel) => rel.arity(),
        }
    }

    fn rows(&self, index: &HashMap<&Element, usize>) -> Result<Vec<Vec<usize>>> {
        match self {
            Symbol::Op(op) => {
                let graph = op.graph();
                index_rows(index, graph.tuples())
            }
            Symbol::Rel(rel) => index_rows(index, rel.tuples()),
        }
    }
}

fn symbols<'a>(model: &'a Model, subtype: &Signature) -> Result<Vec<(String, bool, Symbol<'a>)>> {
    let ops = subtype.operations().map(|(sym, _)| {
        model
            .operation(sym)
            .map(|op| (sym.to_owned(), false, Symbol::Op(op)))
            .ok_or_else(|| AlgebraError::SignatureMismatch(format!("no operation `{}`", sym)))
    });
    let rels = subtype.relations().map(|(sym, _)| {
        model
            .relation(sym)
            .map(|rel| (sym.to_owned(), true, Symbol::Rel(rel)))
            .ok_or_else(|| AlgebraError::SignatureMismatch(format!("no relation `{}`", sym)))
    });
    ops.chain(rels).collect()
}

fn f_vector(vars: &[usize], name: &str) -> String {
    let inner = vars
        .iter()
        .map(|v| format!("{}[{}]", name, v))
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", inner)
}

/// Writes the Minion model for `request`: a variable `f[x]` per source
/// element ranging over the target, one tuple list per target table and a
/// table constraint per source row. Embeddings add an inverse `g` with `-1`
/// off the image so that target relations are reflected.
fn minion_input(request: &SearchRequest<'_>) -> Result<MinionInput> {
    let source: &Model = request.source;
    let target: &Model = request.target;
    let (n, m) = (source.cardinality(), target.cardinality());
    let s_index = positions(source.universe());
    let t_index = positions(target.universe());
    let names = minion_names(request.subtype);
    let embedding = request.kind >= MorphismKind::Embedding;
    let (t_prefix, s_prefix) = if embedding { ("b", "a") } else { ("", "") };
    let name_of = |sym: &str| names.get(sym).cloned().unwrap_or_else(|| sym.to_owned());

    let s_symbols = symbols(source, request.subtype)?;
    let t_symbols = symbols(target, request.subtype)?;

    let mut out = String::from("MINION 3\n\n");
    let _ = writeln!(
        out,
        "# {:?} from {} to {} elements for {}\n",
        request.kind, n, m, request.subtype
    );
    out.push_str("**VARIABLES**\n");
    let _ = writeln!(out, "DISCRETE f[{}]{{0..{}}}\n", n, m.saturating_sub(1));
    if embedding {
        let _ = writeln!(out, "DISCRETE g[{}]{{-1..{}}}\n", m, n.saturating_sub(1));
        out.push_str("**SEARCH**\nPRINT [f]\n\n");
    }

    out.push_str("**TUPLELIST**\n");
    let mut t_rows = Vec::new();
    for (sym, _, symbol) in t_symbols.iter() {
        let rows = symbol.rows(&t_index)?;
        write_table(&mut out, &format!("{}{}", t_prefix, name_of(sym)), symbol.width(), &rows);
        t_rows.push(rows);
    }
    let mut s_rows = Vec::new();
    for (sym, is_relation, symbol) in s_symbols.iter() {
        let rows = symbol.rows(&s_index)?;
        if embedding && *is_relation {
            write_table(&mut out, &format!("{}{}", s_prefix, name_of(sym)), symbol.width(), &rows);
        }
        s_rows.push(rows);
    }
    if !request.without.is_empty() {
        let rows = request
            .without
            .iter()
            .map(|map| {
                source
                    .universe()
                    .iter()
                    .map(|x| {
                        map.get(x)
                            .and_then(|y| t_index.get(y))
                            .map_or(-1, |&i| i as i64)
                            .to_string()
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>();
        let _ = writeln!(out, "without {} {}", rows.len(), n);
        for row in rows {
            let _ = writeln!(out, "{}", row);
        }
        out.push('\n');
    }

    out.push_str("**CONSTRAINTS**\n");
    if request.injective {
        let all = (0..n).collect::<Vec<_>>();
        let _ = writeln!(out, "alldiff({})", f_vector(&all, "f"));
    }
    if request.surjective {
        for y in 0..m {
            let _ = writeln!(out, "occurrencegeq(f, {}, 1)", y);
        }
    }
    for ((sym, _, _), rows) in s_symbols.iter().zip(s_rows.iter()) {
        for row in rows {
            let _ = writeln!(out, "table({},{}{})", f_vector(row, "f"), t_prefix, name_of(sym));
        }
    }
    if embedding {
        for ((sym, is_relation, _), rows) in t_symbols.iter().zip(t_rows.iter()) {
            if !*is_relation {
                continue;
            }
            for row in rows {
                let undefined = row
                    .iter()
                    .map(|y| format!("element(g, {}, -1),", y))
                    .collect::<String>();
                let _ = writeln!(
                    out,
                    "watched-or({{{}table({},{}{})}})",
                    undefined,
                    f_vector(row, "g"),
                    s_prefix,
                    name_of(sym)
                );
            }
        }
        for x in 0..n {
            let _ = writeln!(out, "element(g, f[{}], {})", x, x);
        }
        let _ = writeln!(out, "occurrencegeq(g, -1, {})", m.saturating_sub(n));
    }
    if !request.without.is_empty() {
        out.push_str("negativetable(f,without)\n");
    }
    out.push_str("**EOF**\n");

    Ok(MinionInput {
        text: out,
        source: source.universe().to_vec(),
        target: target.universe().to_vec(),
    })
}

/// One solution per nonempty line, `n` target positions each. Anything else
/// is reported verbatim.
fn parse_solutions(stdout: &str, n: usize, m: usize) -> Result<Vec<Vec<usize>>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let values = line
                .split_whitespace()
                .map(|v| v.parse::<usize>().ok().filter(|&v| v < m))
                .collect::<Option<Vec<_>>>();
            match values {
                Some(values) if values.len() == n => Ok(values),
                _ => Err(AlgebraError::Solver(stdout.to_owned())),
            }
        })
        .collect()
}

impl MinionInput {
    fn map(&self, values: Vec<usize>) -> BTreeMap<Element, Element> {
        self.source
            .iter()
            .cloned()
            .zip(values.into_iter().filter_map(|y| self.target.get(y).cloned()))
            .collect()
    }
}

/// How often a running solver is checked for cancellation.
const POLL: Duration = Duration::from_millis(20);

/// Runs Minion once per request. Every run gets its own temporary directory
/// holding the input file, removed when the run is over.
#[derive(Debug, Clone, Default)]
pub struct MinionSolver {
    config: SolverConfig,
}

impl MinionSolver {
    /// A solver running Minion as `config` says.
    pub fn new(config: SolverConfig) -> MinionSolver {
        MinionSolver { config }
    }

    /// The configuration runs are started with.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Standard output of a run on `input`.
    fn run(&self, input: &str, all_solutions: bool) -> Result<String> {
        let idle = AtomicBool::new(false);
        self.run_cancellable(input, all_solutions, &idle)?
            .ok_or_else(|| AlgebraError::Solver("the run was cancelled".to_owned()))
    }

    /// Like [MinionSolver::run], but the process is killed and `None`
    /// returned once `cancel` is set.
    fn run_cancellable(
        &self,
        input: &str,
        all_solutions: bool,
        cancel: &AtomicBool,
    ) -> Result<Option<String>> {
        if cancel.load(Ordering::Acquire) {
            return Ok(None);
        }
        let dir = TempDir::new("minion")?;
        let path = dir.path().join("input.minion");
        fs::write(&path, input)?;

        let mut cmd = Command::new(&self.config.minion_path);
        cmd.arg("-printsolsonly")
            .arg("-randomseed")
            .arg(self.config.seed.to_string());
        if all_solutions {
            cmd.arg("-findallsols");
        }
        cmd.arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            AlgebraError::Solver(format!(
                "failed to run {}: {}",
                self.config.minion_path.display(),
                e
            ))
        })?;
        // drain both pipes while waiting so a chatty solver never blocks
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match self.wait(&mut child, cancel)? {
            Some(status) => status,
            None => {
                debug!("Minion run cancelled");
                let _ = collect(stdout);
                let _ = collect(stderr);
                return Ok(None);
            }
        };
        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;
        debug!("Minion exited with {}", status);

        if !status.success() || (!stderr.trim().is_empty() && stdout.trim().is_empty()) {
            let text = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(AlgebraError::Solver(text));
        }
        Ok(Some(stdout))
    }

    /// Waits for `child` in slices of [POLL], killing it on timeout or once
    /// `cancel` is set. `None` when cancelled.
    fn wait(&self, child: &mut Child, cancel: &AtomicBool) -> Result<Option<ExitStatus>> {
        let deadline = self.config.timeout().map(|t| (t, Instant::now() + t));
        loop {
            if cancel.load(Ordering::Acquire) {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            let slice = match deadline {
                Some((_, at)) => at.saturating_duration_since(Instant::now()).min(POLL),
                None => POLL,
            };
            if let Some(status) = child.wait_timeout(slice)? {
                return Ok(Some(status));
            }
            if let Some((timeout, at)) = deadline {
                if Instant::now() >= at {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!("Minion killed after {:?}", timeout);
                    return Err(AlgebraError::SolverTimeout(timeout));
                }
            }
        }
    }

    fn solutions(&self, request: &SearchRequest<'_>, input: &MinionInput, stdout: &str) -> Result<Vec<Homomorphism>> {
        let n = input.source.len();
        let m = input.target.len();
        let mut solutions = parse_solutions(stdout, n, m)?;
        if !request.all_solutions {
            solutions.truncate(1);
        }
        solutions
            .into_iter()
            .map(|values| request.wrap(input.map(values)))
            .collect()
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<std::io::Result<String>> {
    thread::spawn(move || {
        let mut text = String::new();
        pipe.read_to_string(&mut text)?;
        Ok(text)
    })
}

fn collect(reader: Option<thread::JoinHandle<std::io::Result<String>>>) -> Result<String> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| AlgebraError::Solver("reading the solver output failed".to_owned()))?
            .map_err(AlgebraError::from),
        None => Ok(String::new()),
    }
}

impl HomomorphismSearch for MinionSolver {
    fn solve(&self, request: &SearchRequest<'_>) -> Result<Vec<Homomorphism>> {
        request.check()?;
        if request.is_impossible() {
            return Ok(Vec::new());
        }
        if request.source.cardinality() == 0 || request.target.cardinality() == 0 {
            return super::BacktrackSearch.solve(request);
        }
        let input = minion_input(request)?;
        let stdout = self.run(&input.text, request.all_solutions)?;
        let found = self.solutions(request, &input, &stdout)?;
        info!("Minion found {} {:?} solutions", found.len(), request.kind);
        Ok(found)
    }

    /// Runs the requests concurrently and keeps the first one answered.
    fn solve_any(&self, requests: &[SearchRequest<'_>]) -> Result<Option<(usize, Homomorphism)>> {
        let mut inputs = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            request.check()?;
            if request.is_impossible() {
                continue;
            }
            if request.source.cardinality() == 0 || request.target.cardinality() == 0 {
                if let Some(h) = super::BacktrackSearch.solve(&request.first_only())?.into_iter().next() {
                    return Ok(Some((i, h)));
                }
                continue;
            }
            inputs.push((i, minion_input(request)?));
        }
        if inputs.is_empty() {
            return Ok(None);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.parallelism.unwrap_or(0))
            .build()
            .map_err(|e| AlgebraError::Solver(e.to_string()))?;
        debug!("Running {} Minion searches concurrently", inputs.len());
        // set by the first run to answer, the others are killed
        let cancel = AtomicBool::new(false);
        let answered = pool.install(|| {
            inputs.par_iter().find_map_any(|(i, input)| {
                let outcome = match self.run_cancellable(&input.text, false, &cancel) {
                    Ok(None) => return None,
                    Ok(Some(stdout)) if stdout.trim().is_empty() => return None,
                    Ok(Some(stdout)) => Ok((*i, stdout)),
                    Err(e) => Err(e),
                };
                cancel.store(true, Ordering::Release);
                Some(outcome)
            })
        });
        match answered {
            None => Ok(None),
            Some(Err(e)) => Err(e),
            Some(Ok((i, stdout))) => {
                let input = inputs
                    .iter()
                    .find(|(j, _)| *j == i)
                    .map(|(_, input)| input)
                    .ok_or_else(|| AlgebraError::Solver(stdout.clone()))?;
                let request = requests[i].first_only();
                Ok(self
                    .solutions(&request, input, &stdout)?
                    .into_iter()
                    .next()
                    .map(|h| (i, h)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use std::rc::Rc;

    #[test]
    fn homomorphism_input() {
        let c2 = catalog::chain(2).model().clone();
        let request = SearchRequest::new(MorphismKind::Homomorphism, &c2, &c2, c2.signature()).surjective(true);
        let input = minion_input(&request).unwrap();
        let text = input.text;
        assert!(text.starts_with("MINION 3\n"));
        assert!(text.contains("DISCRETE f[2]{0..1}"));
        // `^` and `v` are renamed, the join keeps its letter name
        assert!(text.contains("sym0 4 3\n0 0 0\n0 1 0\n1 0 0\n1 1 1\n"));
        assert!(text.contains("v 4 3\n"));
        assert!(text.contains("table([f[0],f[1],f[0]],sym0)"));
        assert!(text.contains("occurrencegeq(f, 1, 1)"));
        assert!(!text.contains("alldiff"));
        assert!(text.trim_end().ends_with("**EOF**"));
    }

    #[test]
    fn embedding_input_reflects_relations() {
        let two = Rc::new(catalog::chain_poset(2));
        let square = Rc::new(catalog::rhombus_poset());
        let request = SearchRequest::new(MorphismKind::Embedding, &two, &square, two.signature());
        let text = minion_input(&request).unwrap().text;
        assert!(text.contains("DISCRETE g[4]{-1..1}"));
        assert!(text.contains("PRINT [f]"));
        assert!(text.contains("bsym0 9 2"));
        assert!(text.contains("asym0 3 2"));
        assert!(text.contains("alldiff([f[0],f[1]])"));
        assert!(text.contains("watched-or({element(g, 0, -1),element(g, 3, -1),table([g[0],g[3]],asym0)})"));
        assert!(text.contains("element(g, f[1], 1)"));
        assert!(text.contains("occurrencegeq(g, -1, 2)"));
    }

    #[test]
    fn without_table() {
        let c2 = catalog::chain(2).model().clone();
        let identity = c2.universe().iter().map(|x| (x.clone(), x.clone())).collect::<BTreeMap<_, _>>();
        let skip = vec![identity];
        let request = SearchRequest::new(MorphismKind::Homomorphism, &c2, &c2, c2.signature()).without(&skip);
        let text = minion_input(&request).unwrap().text;
        assert!(text.contains("without 1 2\n0 1\n"));
        assert!(text.contains("negativetable(f,without)"));
    }

    #[test]
    fn solutions_are_read_back() {
        let parsed = parse_solutions("0 1\n\n1 1\n", 2, 2).unwrap();
        assert_eq!(parsed, vec![vec![0, 1], vec![1, 1]]);
        assert!(matches!(
            parse_solutions("Error: parse failure\n", 2, 2),
            Err(AlgebraError::Solver(text)) if text.contains("parse failure")
        ));
        assert!(parse_solutions("0 5\n", 2, 2).is_err());
        assert!(parse_solutions("", 2, 2).unwrap().is_empty());
    }

    #[test]
    fn config_from_json() {
        let config = SolverConfig::from_json(r#"{"minion_path": "/opt/minion/bin/minion", "timeout_ms": 500}"#).unwrap();
        assert_eq!(config.minion_path, PathBuf::from("/opt/minion/bin/minion"));
        assert_eq!(config.timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.seed, 0);
        assert!(matches!(
            SolverConfig::from_json("{ nope"),
            Err(AlgebraError::Parse { .. })
        ));
    }

    #[test]
    fn missing_executable_is_a_solver_error() {
        crate::test_utils::init_logging();
        let solver = MinionSolver::new(SolverConfig {
            minion_path: PathBuf::from("/nonexistent/minion"),
            ..SolverConfig::default()
        });
        let c2 = catalog::chain(2).model().clone();
        let request = SearchRequest::new(MorphismKind::Homomorphism, &c2, &c2, c2.signature());
        assert!(matches!(solver.solve(&request), Err(AlgebraError::Solver(_))));
    }

    /// A stand-in for the solver: inputs over a four element target hang,
    /// the others answer with the identity on two elements.
    #[cfg(unix)]
    fn stand_in_solver(dir: &TempDir) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("minion");
        let script = "#!/bin/sh\n\
                      for input; do :; done\n\
                      if grep -q '{0..3}' \"$input\"; then exec sleep 60; fi\n\
                      echo '0 1'\n";
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn losing_runs_are_killed() {
        crate::test_utils::init_logging();
        let dir = TempDir::new("stand_in").unwrap();
        let solver = MinionSolver::new(SolverConfig {
            minion_path: stand_in_solver(&dir),
            parallelism: Some(2),
            ..SolverConfig::default()
        });
        let c2 = catalog::chain(2).model().clone();
        let rhombus = catalog::rhombus().model().clone();
        let requests = [
            SearchRequest::new(MorphismKind::Homomorphism, &c2, &rhombus, c2.signature()),
            SearchRequest::new(MorphismKind::Homomorphism, &c2, &c2, c2.signature()),
        ];
        let started = Instant::now();
        let (i, h) = solver.solve_any(&requests).unwrap().unwrap();
        assert_eq!(i, 1);
        assert_eq!(h.target().cardinality(), 2);
        // no timeout is configured, so only cancellation ends the hanging run
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[cfg(unix)]
    #[test]
    fn hanging_run_times_out() {
        let dir = TempDir::new("stand_in").unwrap();
        let solver = MinionSolver::new(SolverConfig {
            minion_path: stand_in_solver(&dir),
            timeout_ms: Some(200),
            ..SolverConfig::default()
        });
        let c2 = catalog::chain(2).model().clone();
        let rhombus = catalog::rhombus().model().clone();
        let request = SearchRequest::new(MorphismKind::Homomorphism, &c2, &rhombus, c2.signature());
        assert!(matches!(
            solver.solve(&request),
            Err(AlgebraError::SolverTimeout(_))
        ));
    }
}
