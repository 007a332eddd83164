//! modelgen CLI
//!
//! Thin wrapper over the generator core: argument parsing, config
//! layering, and artifact writing. No generation logic lives here.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use modelgen::emit::FsSink;
use modelgen::pipeline::generate_into;
use modelgen::printer::PythonPrinter;
use modelgen::{generate, GenerateConfig, Input, InputKind, OutputModelType};

#[derive(Parser)]
#[command(name = "modelgen")]
#[command(about = "Generate data models from schema documents")]
struct Cli {
    /// Schema file or directory
    input: PathBuf,

    /// Output directory; single-module runs print to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file (default: modelgen.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input kind: auto, openapi, jsonschema, json, yaml, dict, csv, graphql
    #[arg(long)]
    input_kind: Option<String>,

    /// Output model family, e.g. pydantic_v2.BaseModel
    #[arg(long)]
    output_model_type: Option<String>,

    /// Remove single-reference root wrappers
    #[arg(long)]
    collapse_root_models: bool,

    /// Deduplicate identical models across the whole tree
    #[arg(long)]
    reuse_tree: bool,

    /// Emit built-in union syntax
    #[arg(long)]
    use_union_operator: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = GenerateConfig::load(cli.config.as_deref()).context("loading config")?;

    if let Some(kind) = &cli.input_kind {
        config.input_kind = parse_option::<InputKind>(kind).context("--input-kind")?;
    }
    if let Some(model_type) = &cli.output_model_type {
        config.output_model_type =
            parse_option::<OutputModelType>(model_type).context("--output-model-type")?;
    }
    if cli.collapse_root_models {
        config.collapse_root_models = true;
    }
    if cli.reuse_tree {
        config.reuse_scope = modelgen::ReuseScope::Tree;
    }
    if cli.use_union_operator {
        config.use_union_operator = true;
    }

    let input = Input::Path(cli.input);

    match cli.output {
        Some(directory) => {
            let mut sink = FsSink::new(&directory, "py");
            let diagnostics = generate_into(&input, &config, &PythonPrinter, &mut sink)
                .context("generation failed")?;
            report(&diagnostics);
        }
        None => {
            let artifacts = generate(&input, &config).context("generation failed")?;
            report(&artifacts.diagnostics);
            for (path, bytes) in &artifacts.files {
                if artifacts.files.len() > 1 {
                    println!("# --- {path} ---");
                }
                std::io::stdout().write_all(bytes)?;
            }
        }
    }
    Ok(())
}

fn report(diagnostics: &modelgen::Diagnostics) {
    for item in diagnostics.warnings() {
        eprintln!("warning: {item}");
    }
}

/// Parse a kebab/wire-named option through its serde representation
fn parse_option<T: serde::de::DeserializeOwned>(raw: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|e| anyhow::anyhow!("unrecognized value {raw:?}: {e}"))
}
