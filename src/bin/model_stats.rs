use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, Context};
use clap::{App, Arg};
use finite_algebra::congruence::{congruence_lattice, principal_congruences};
use finite_algebra::format::read_model_file;
use finite_algebra::lattice::Lattice;
use finite_algebra::methods::{substructures, subuniverses, EnumerationOptions, Strategy};
use finite_algebra::signature::Signature;
use finite_algebra::solver::{BacktrackSearch, HomomorphismSearch, MinionSolver, SolverConfig};
use log::info;
use petgraph::dot::{Config, Dot};

fn parse_subtype(signature: &Signature, list: &str) -> anyhow::Result<Signature> {
    let mut ops = Vec::new();
    let mut rels = Vec::new();
    for symbol in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if signature.operation_arity(symbol).is_some() {
            ops.push(symbol);
        } else if signature.relation_arity(symbol).is_some() {
            rels.push(symbol);
        } else {
            return Err(anyhow!("`{}` is not a symbol of {}", symbol, signature));
        }
    }
    Ok(signature.subtype(&ops, &rels)?)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let matches = App::new("model_stats")
        .about("Counts subuniverses, substructures and congruences of a model file")
        .arg(Arg::with_name("model").required(true).index(1))
        .arg(
            Arg::with_name("subtype")
                .long("subtype")
                .help("comma separated symbols to restrict to")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("improper")
                .long("improper")
                .takes_value(false),
        )
        .arg(
            Arg::with_name("filter_isos")
                .long("filter-isos")
                .takes_value(false),
        )
        .arg(
            Arg::with_name("solver_config")
                .long("solver-config")
                .help("JSON configuration of the Minion solver, backtracking is used without it")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("dot")
                .long("dot")
                .help("print the congruence lattice as a dot graph")
                .takes_value(false),
        )
        .get_matches();

    let model_path = matches
        .value_of("model")
        .ok_or_else(|| anyhow!("no model file given"))?;
    let model = Rc::new(
        read_model_file(Path::new(model_path))
            .with_context(|| format!("unable to read model {}", model_path))?,
    );

    let subtype = match matches.value_of("subtype") {
        Some(list) => parse_subtype(model.signature(), list)?,
        None => model.signature().clone(),
    };
    let proper = !matches.is_present("improper");

    let search: Box<dyn HomomorphismSearch> = match matches.value_of("solver_config") {
        Some(path) => {
            let config = SolverConfig::from_file(Path::new(path))
                .with_context(|| format!("unable to read solver config {}", path))?;
            info!("Using Minion at {}", config.minion_path.display());
            Box::new(MinionSolver::new(config))
        }
        None => Box::new(BacktrackSearch),
    };

    println!("{}: {} elements, signature {}", model, model.cardinality(), model.signature());

    let count = subuniverses(&model, &subtype, proper, Strategy::GeneratorJoin)?.count();
    println!("subuniverses: {}", count);

    let mut options = EnumerationOptions::default().with_subtype(subtype.clone());
    if !proper {
        options = options.improper();
    }
    if matches.is_present("filter_isos") {
        options = options.filter_isos();
    }
    let mut found = 0;
    for sub in substructures(&model, &options, search.as_ref())? {
        sub?;
        found += 1;
    }
    println!("substructures: {}", found);

    if model.signature().has_relations() {
        return Ok(());
    }
    let principal = principal_congruences(&model);
    println!("principal congruences: {}", principal.congruences.len());

    let con = congruence_lattice(&model).context("unable to compute the congruence lattice")?;
    let lattice = con.lattice();
    println!("congruences: {}", con.len());
    println!("distributive: {}", lattice.is_distributive());
    println!("modular: {}", lattice.is_modular());
    println!("join irreducibles: {}", lattice.join_irreducibles().len());

    if let Ok(own) = Lattice::new(model.clone()) {
        println!("lattice: distributive {}, modular {}", own.is_distributive(), own.is_modular());
    }

    if matches.is_present("dot") {
        let hasse = lattice
            .hasse_diagram()
            .map(|_, x| x.to_string(), |_, _| String::new());
        println!("{}", Dot::with_config(&hasse, &[Config::EdgeNoLabel]));
    }
    Ok(())
}
