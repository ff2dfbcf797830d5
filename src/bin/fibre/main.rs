//! fibre CLI - inspect, select, match and convert fibre collections.

use std::collections::BTreeMap;
use std::env;
use std::process::ExitCode;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use fibre::core::ElementData;
use fibre::geom::{convert, ConvertParams, Fibre, FibreKind, Strand, Track, Tractlet};
use fibre::matching::DistanceOpts;
use fibre::set::Set;
use fibre::util::Result;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut filter = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => filter = "debug",
            "-vv" | "--trace" => filter = "trace",
            "-q" | "--quiet" => filter = "error",
            _ => filtered_args.push(arg),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if filtered_args.is_empty() {
        print_help();
        return ExitCode::SUCCESS;
    }

    let result = match filtered_args[0] {
        "info" | "i" => cmd_info(&filtered_args[1..]),
        "select" | "s" => cmd_select(&filtered_args[1..]),
        "match" | "m" => cmd_match(&filtered_args[1..]),
        "convert" | "c" => cmd_convert(&filtered_args[1..]),
        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("fibre CLI - fibre tractography collections");
    println!();
    println!("Usage: fibre-cli [flags] <command> [args]");
    println!();
    println!("Commands:");
    println!("  info <file> [--kind K]                 Show header, sizes and properties");
    println!("  select <in> <out> <idx..> [--kind K]   Write a subset of elements");
    println!("  match <file> <reference> [--kind K]    Optimal matching and total distance");
    println!("  convert <in> <out> --from K --to K     Convert between fibre kinds");
    println!("                      [--points N] [--degree D]");
    println!();
    println!("Kinds: strand (default), tractlet, track");
    println!();
    println!("Flags:");
    println!("  -v, --verbose    Debug logging");
    println!("  -vv, --trace     Trace logging");
    println!("  -q, --quiet      Errors only");
}

/// Pull `--name value` out of an argument list.
fn take_flag(args: &mut Vec<&str>, name: &str) -> Option<String> {
    let pos = args.iter().position(|a| *a == name)?;
    if pos + 1 >= args.len() {
        return None;
    }
    let value = args[pos + 1].to_string();
    args.drain(pos..pos + 2);
    Some(value)
}

fn parse_kind(args: &mut Vec<&str>) -> Result<FibreKind> {
    match take_flag(args, "--kind") {
        Some(name) => FibreKind::from_name(&name),
        None => Ok(FibreKind::Strand),
    }
}

fn cmd_info(args: &[&str]) -> Result<()> {
    let mut args = args.to_vec();
    let kind = parse_kind(&mut args)?;
    let [path] = args[..] else {
        return Err(fibre::Error::other("usage: info <file> [--kind K]"));
    };
    info!("Opening {path}");
    match kind {
        FibreKind::Strand => print_info(&Set::<Strand>::load(path)?),
        FibreKind::Tractlet => print_info(&Set::<Tractlet>::load(path)?),
        FibreKind::Track => print_info(&Set::<Track>::load(path)?),
    }
    Ok(())
}

fn print_info<T: Fibre>(set: &Set<T>) {
    println!("kind:           {}", T::NAME);
    println!("elements:       {}", set.size());
    match set.uniform_degree() {
        Some(degree) => println!("degree:         {degree} (uniform)"),
        None => {
            let degrees: Vec<String> =
                (0..set.size()).map(|i| set.elem_degree(i).to_string()).collect();
            println!("degree:         variable [{}]", degrees.join(", "));
        }
    }
    println!("set props:      {}", set.schema());
    println!("element props:  {}", set.elem_schema());
    if !set.extend_props().is_empty() {
        println!("extended props:");
        for (key, value) in set.extend_props() {
            println!("  {key}: {value}");
        }
    }
    let columns = set.extend_elem_prop_keys();
    if !columns.is_empty() {
        println!("element columns: {}", columns.join(", "));
    }
}

fn cmd_select(args: &[&str]) -> Result<()> {
    let mut args = args.to_vec();
    let kind = parse_kind(&mut args)?;
    if args.len() < 3 {
        return Err(fibre::Error::other(
            "usage: select <in> <out> <idx..> [--kind K]",
        ));
    }
    let input = args[0];
    let output = args[1];
    let indices: Vec<usize> = args[2..]
        .iter()
        .map(|a| {
            a.parse::<usize>()
                .map_err(|_| fibre::Error::other(format!("bad index '{a}'")))
        })
        .collect::<Result<_>>()?;

    fn run<T: Fibre>(input: &str, output: &str, indices: &[usize]) -> Result<()> {
        let set = Set::<T>::load(input)?;
        let picked = set.select(indices)?;
        picked.save(output)?;
        info!("Selected {} of {} elements", picked.size(), set.size());
        Ok(())
    }
    match kind {
        FibreKind::Strand => run::<Strand>(input, output, &indices),
        FibreKind::Tractlet => run::<Tractlet>(input, output, &indices),
        FibreKind::Track => run::<Track>(input, output, &indices),
    }
}

fn cmd_match(args: &[&str]) -> Result<()> {
    let mut args = args.to_vec();
    let kind = parse_kind(&mut args)?;
    let [path, reference] = args[..] else {
        return Err(fibre::Error::other(
            "usage: match <file> <reference> [--kind K]",
        ));
    };

    fn run<T: Fibre>(path: &str, reference: &str) -> Result<()> {
        let set = Set::<T>::load(path)?;
        let reference = Set::<T>::load(reference)?;
        debug!("matching {} elements against {}", set.size(), reference.size());
        let (cost, matched) = set.distance(&reference, DistanceOpts::default())?;
        println!("total distance: {cost}");
        for (i, j) in matched.iter().enumerate() {
            println!("  {i} -> {j}");
        }
        Ok(())
    }
    match kind {
        FibreKind::Strand => run::<Strand>(path, reference),
        FibreKind::Tractlet => run::<Tractlet>(path, reference),
        FibreKind::Track => run::<Track>(path, reference),
    }
}

fn cmd_convert(args: &[&str]) -> Result<()> {
    let mut args = args.to_vec();
    let from = take_flag(&mut args, "--from")
        .ok_or_else(|| fibre::Error::other("convert requires --from"))?;
    let to = take_flag(&mut args, "--to")
        .ok_or_else(|| fibre::Error::other("convert requires --to"))?;
    let mut params = ConvertParams::default();
    if let Some(points) = take_flag(&mut args, "--points") {
        params.num_points = points
            .parse()
            .map_err(|_| fibre::Error::other("bad --points value"))?;
    }
    if let Some(degree) = take_flag(&mut args, "--degree") {
        params.degree = degree
            .parse()
            .map_err(|_| fibre::Error::other("bad --degree value"))?;
    }
    let from = FibreKind::from_name(&from)?;
    let to = FibreKind::from_name(&to)?;
    let [input, output] = args[..] else {
        return Err(fibre::Error::other(
            "usage: convert <in> <out> --from K --to K [--points N] [--degree D]",
        ));
    };

    fn run<F: Fibre, G: Fibre>(
        input: &str,
        output: &str,
        params: &ConvertParams,
    ) -> Result<()> {
        let source = Set::<F>::load(input)?;
        let mut target: Set<G> = Set::new(source.schema().clone(), source.elem_schema().clone());
        for i in 0..source.size() {
            let converted: ElementData = convert(&source.elem_data(i), F::KIND, G::KIND, params)?;
            let row: BTreeMap<String, String> = source.get_extend_elem_prop_row(i)?;
            for (key, _) in row.iter() {
                if !target.has_extend_elem_prop(key) {
                    target.add_extend_elem_prop(key.clone(), "");
                }
            }
            target.push_back_with_props(&converted, &row)?;
        }
        target.freeze_elem_degree(true)?;
        target.save(output)?;
        info!("Converted {} elements: {} -> {}", source.size(), F::NAME, G::NAME);
        Ok(())
    }

    match (from, to) {
        (FibreKind::Strand, FibreKind::Strand) => run::<Strand, Strand>(input, output, &params),
        (FibreKind::Strand, FibreKind::Track) => run::<Strand, Track>(input, output, &params),
        (FibreKind::Strand, FibreKind::Tractlet) => {
            run::<Strand, Tractlet>(input, output, &params)
        }
        (FibreKind::Track, FibreKind::Strand) => run::<Track, Strand>(input, output, &params),
        (FibreKind::Track, FibreKind::Track) => run::<Track, Track>(input, output, &params),
        (FibreKind::Track, FibreKind::Tractlet) => {
            run::<Track, Tractlet>(input, output, &params)
        }
        (FibreKind::Tractlet, FibreKind::Strand) => {
            run::<Tractlet, Strand>(input, output, &params)
        }
        (FibreKind::Tractlet, FibreKind::Track) => {
            run::<Tractlet, Track>(input, output, &params)
        }
        (FibreKind::Tractlet, FibreKind::Tractlet) => {
            run::<Tractlet, Tractlet>(input, output, &params)
        }
    }
}
