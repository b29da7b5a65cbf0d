//! Flint CLI
//!
//! Inspects compiled source units: decoded trees, scopes and flow graphs.

use std::path::Path;

use flint_ir::SourceUnit;
use flintc::{parse_command_line, CommandLine, CompileError};

fn main() {
    flintc::init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return;
    }

    let line = match parse_command_line(&args[2..]) {
        Ok(line) => line,
        Err(error) => fail(&error),
    };

    let result = match command {
        "dump" => {
            let [path] = line.positional.as_slice() else {
                usage_error("flint dump <unit>");
            };
            load(path).and_then(|unit| flintc::dump(&unit))
        }
        "scopes" => {
            let [path, member] = line.positional.as_slice() else {
                usage_error("flint scopes <unit> <member> [--kind=<kind>]");
            };
            load(path).and_then(|unit| flintc::scopes(&unit, member, line.kind, &line.options))
        }
        "graph" => graph(&line),
        _ => {
            eprintln!("error: unknown command '{command}'");
            print_usage();
            std::process::exit(1);
        }
    };

    match result {
        Ok(output) => print!("{output}"),
        Err(error) => fail(&error),
    }
}

fn graph(line: &CommandLine) -> Result<String, CompileError> {
    let (path, member) = match line.positional.as_slice() {
        [path] => (path, None),
        [path, member] => (path, Some(member.as_str())),
        _ => usage_error("flint graph <unit> [member] [options]"),
    };
    let unit = load(path)?;
    if line.options.verbose {
        let members = flintc::compilable_members(&unit).len();
        eprintln!("{path}: {members} compilable members");
    }
    flintc::graph(&unit, member, line.kind, &line.options)
}

fn load(path: &str) -> Result<SourceUnit, CompileError> {
    Ok(SourceUnit::load(Path::new(path))?)
}

fn fail(error: &CompileError) -> ! {
    eprintln!("error: {error}");
    std::process::exit(1);
}

fn usage_error(usage: &str) -> ! {
    eprintln!("Usage: {usage}");
    std::process::exit(1);
}

fn print_usage() {
    println!("Flint IR frontend");
    println!();
    println!("Usage: flint <command> [options]");
    println!();
    println!("Commands:");
    println!("  dump <unit>                 Print every decoded function tree");
    println!("  scopes <unit> <member>      Print the variables of a member and where they live");
    println!("  graph <unit> [member]       Print the flow graph of a member, or of every member");
    println!();
    println!("Options:");
    println!("  --enable-asserts            Lower assert statements");
    println!("  --no-stack-checks           Omit stack overflow checks");
    println!("  -D <name>=<value>           Define an environment constant");
    println!("  --jobs=<n>                  Worker threads when compiling a whole unit");
    println!("  --kind=<kind>               Compile the member as a synthesized function:");
    println!("                              getter, setter, static-getter, extractor, tear-off,");
    println!("                              dynamic-forwarder, nsm-forwarder");
    println!("  -v, --verbose               Verbose output");
    println!();
    println!("Environment:");
    println!("  RUST_LOG                    Tracing filter, e.g. flint_flow=debug");
    println!("  FLINT_TRACE_TREE            Print tracing output as a span tree");
}
