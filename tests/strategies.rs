use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;
use std::rc::Rc;

use finite_algebra::catalog;
use finite_algebra::format::{parse_model, read_model_file, write_model};
use finite_algebra::lattice::Lattice;
use finite_algebra::methods::{
    substructures, substructures_by_maximals, subuniverses, EnumerationOptions, Strategy,
};
use finite_algebra::model::{Element, Model};
use finite_algebra::solver::{self, BacktrackSearch};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn path_from_test_data(name: &str) -> PathBuf {
    let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    d.push("test_data");
    d.push(name);
    d
}

fn universes<I: Iterator<Item = Vec<Element>>>(walk: I) -> BTreeSet<Vec<Element>> {
    walk.collect()
}

fn substructure_universes(
    found: impl Iterator<Item = finite_algebra::Result<Rc<Model>>>,
) -> BTreeSet<Vec<Element>> {
    found
        .map(|m| {
            let mut universe = m.unwrap().universe().to_vec();
            universe.sort();
            universe
        })
        .collect()
}

#[test]
fn rhombus_agrees_across_strategies() {
    init();
    let rhombus = catalog::rhombus().model().clone();
    let sig = rhombus.signature();
    let power_set = universes(subuniverses(&rhombus, sig, true, Strategy::PowerSet).unwrap());
    let generators = universes(subuniverses(&rhombus, sig, true, Strategy::GeneratorJoin).unwrap());
    assert_eq!(power_set.len(), 11);
    assert_eq!(power_set, generators);

    let options = EnumerationOptions::default();
    let plain = substructure_universes(substructures(&rhombus, &options, &BacktrackSearch).unwrap());
    let maximals =
        substructure_universes(substructures_by_maximals(&rhombus, &options, &BacktrackSearch).unwrap());
    let sorted = power_set
        .into_iter()
        .map(|mut u| {
            u.sort();
            u
        })
        .collect::<BTreeSet<_>>();
    assert_eq!(plain, sorted);
    assert_eq!(maximals, sorted);
}

#[test]
fn improper_adds_the_whole_model() {
    let model = catalog::chain(3).model().clone();
    let proper = substructures(&model, &EnumerationOptions::default(), &BacktrackSearch)
        .unwrap()
        .count();
    let improper = substructures(&model, &EnumerationOptions::default().improper(), &BacktrackSearch)
        .unwrap()
        .count();
    assert_eq!(improper, proper + 1);
}

#[test]
fn test_data_round_trips() {
    init();
    for name in ["n5.model", "m3.model", "chain4.model", "rhombus_poset.model"] {
        let model = read_model_file(&path_from_test_data(name)).unwrap();
        assert_eq!(model.name(), Some(name.trim_end_matches(".model")));
        let text = write_model(&model).unwrap();
        assert_eq!(parse_model(&text).unwrap(), model);
    }
}

#[test]
fn test_data_matches_the_catalog() {
    let m3 = read_model_file(&path_from_test_data("m3.model")).unwrap();
    let lattice = Lattice::new(Rc::new(m3)).unwrap();
    assert!(!lattice.is_distributive());
    let catalog_m3 = catalog::m3();
    let found = solver::is_isomorphic(
        &BacktrackSearch,
        lattice.model(),
        catalog_m3.model(),
        lattice.model().signature(),
    )
    .unwrap();
    assert!(found.is_some());

    let chain = read_model_file(&path_from_test_data("chain4.model")).unwrap();
    assert_eq!(&chain, &**catalog::chain(4).model());

    let poset = read_model_file(&path_from_test_data("rhombus_poset.model")).unwrap();
    assert_eq!(poset, catalog::rhombus_poset());
}

#[test]
fn model_stats_reports_counts() {
    let output = Command::new(env!("CARGO_BIN_EXE_model_stats"))
        .arg(path_from_test_data("n5.model"))
        .arg("--dot")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("congruences: 5"));
    assert!(stdout.contains("lattice: distributive false, modular false"));
    assert!(stdout.contains("digraph"));

    let missing = Command::new(env!("CARGO_BIN_EXE_model_stats"))
        .arg(path_from_test_data("missing.model"))
        .output()
        .unwrap();
    assert!(!missing.status.success());
}
