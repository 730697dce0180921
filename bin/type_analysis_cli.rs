// Runs the type analyzer over one of the canned example functions and
// prints its per-value facts table, seeded by a JSON sidecar of argument
// kinds — the JSON-sidecar-next-to-the-real-input convention `bin/rdef.rs`
// uses, with the the real input itself swapped for a function name since
// parsing a textual host IR is out of scope here (SPEC_FULL.md §0/§1).

use std::env;

use type_analysis::cache::TypeAnalysisSession;
use type_analysis::demo;
use type_analysis::ir::DataLayout;
use type_analysis::lattice::{OffsetMap, ScalarKind};
use type_analysis::summary::{ArgumentInfo, FunctionSummary};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        panic!("usage: type_analysis_cli <function-name> [argument-kinds.json]");
    }

    let function_name = &args[1];
    let json_file_name = args.get(2);

    match run(function_name, json_file_name.map(String::as_str)) {
        Ok(report) => println!("{report}"),
        Err(e) => panic!("{e}"),
    }
}

fn run(function_name: &str, json_file_name: Option<&str>) -> Result<String, String> {
    let function = demo::by_name(function_name)
        .ok_or_else(|| format!("no such example function: {function_name}"))?;

    let argument_kinds: Vec<ScalarKind> = match json_file_name {
        Some(path) => parse_argument_kinds(&read_from(path)?)?,
        None => vec![ScalarKind::Unknown; function.args.len()],
    };

    let arguments = argument_kinds
        .into_iter()
        .map(|kind| ArgumentInfo::with_facts(OffsetMap::scalar(kind)))
        .collect();
    let summary = FunctionSummary::new(function_name, arguments);

    let program = type_analysis::cache::Program::new().with_function(function);
    let session = TypeAnalysisSession::new(&program, DataLayout::default());
    let result = session
        .query(&summary)
        .ok_or_else(|| format!("function {function_name} not found in its own program"))?;

    Ok(render_report(&result))
}

fn read_from(path: &str) -> Result<String, String> {
    String::from_utf8(std::fs::read(path).map_err(|e| format!("could not read {path}: {e}"))?)
        .map_err(|_| format!("{path} does not contain valid utf-8 text"))
}

fn parse_argument_kinds(json: &str) -> Result<Vec<ScalarKind>, String> {
    let names: Vec<String> = serde_json::from_str(json).map_err(|e| format!("invalid argument-kinds json: {e}"))?;
    names.iter().map(|name| parse_kind(name)).collect()
}

fn parse_kind(name: &str) -> Result<ScalarKind, String> {
    match name {
        "unknown" => Ok(ScalarKind::Unknown),
        "integer" => Ok(ScalarKind::Integer),
        "pointer" => Ok(ScalarKind::Pointer),
        "anything" => Ok(ScalarKind::Anything),
        "float32" => Ok(ScalarKind::Float(type_analysis::ir::Precision::Single)),
        "float64" => Ok(ScalarKind::Float(type_analysis::ir::Precision::Double)),
        other => Err(format!("unknown argument kind: {other}")),
    }
}

fn render_report(result: &type_analysis::summary::ReturnSummary) -> String {
    let mut s = String::new();
    s += &format!("return: {}\n", result.return_facts);
    for (v, facts) in &result.per_value {
        if facts.top() == ScalarKind::Unknown && format!("{facts}") == "{}" {
            continue;
        }
        s += &format!("{v} -> {facts}\n");
    }
    s
}
