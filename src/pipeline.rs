//! Pipeline driver
//!
//! Runs the stages in order: parse, resolve/build, name, dedup, order,
//! partition, emit. Each stage consumes an immutable snapshot from the
//! previous one; the reference table is the only structure spanning
//! stages and it only ever grows. Dropping the intermediate values between
//! stages is the cancellation point.

use tracing::info;

use crate::config::GenerateConfig;
use crate::dedup;
use crate::diagnostics::Diagnostics;
use crate::emit::{self, ArtifactSink, MemorySink, Printer};
use crate::error::{GeneratorError, Result};
use crate::graph;
use crate::input::{self, DocumentSet, Input};
use crate::model::builder::ModelBuilder;
use crate::model::ModelRegistry;
use crate::modules;
use crate::names;
use crate::printer::PythonPrinter;

/// The result of a generator run: `(module_path, bytes)` pairs plus the
/// collected diagnostics
#[derive(Debug)]
pub struct Artifacts {
    pub files: Vec<(String, Vec<u8>)>,
    pub diagnostics: Diagnostics,
}

/// Generate artifacts with the default printer
pub fn generate(input: &Input, config: &GenerateConfig) -> Result<Artifacts> {
    generate_with(input, config, &PythonPrinter)
}

/// Generate artifacts with a caller-supplied printer
pub fn generate_with(
    input: &Input,
    config: &GenerateConfig,
    printer: &dyn Printer,
) -> Result<Artifacts> {
    let mut sink = MemorySink::new();
    let diagnostics = generate_into(input, config, printer, &mut sink)?;
    Ok(Artifacts {
        files: sink.artifacts,
        diagnostics,
    })
}

/// Generate artifacts directly into a sink; returns the diagnostics
pub fn generate_into(
    input: &Input,
    config: &GenerateConfig,
    printer: &dyn Printer,
    sink: &mut dyn ArtifactSink,
) -> Result<Diagnostics> {
    config.validate()?;
    let mut diagnostics = Diagnostics::new();

    let DocumentSet {
        mut table,
        roots,
        document_modules,
    } = input::load(input, config)?;
    info!(roots = roots.len(), "documents parsed");

    let builder = ModelBuilder::new(&mut table, &mut diagnostics, config, document_modules);
    let mut registry = builder.build_roots(&roots)?;
    info!(models = registry.live_count(), "models built");

    names::resolve_names(&mut registry, config, &mut diagnostics);

    let merged = dedup::deduplicate(&mut registry, config, &mut diagnostics);
    if merged > 0 {
        info!(merged, "structurally identical models merged");
    }

    let order = graph::order_models(&mut registry, &mut diagnostics);
    registry.freeze();

    check_inheritance_support(&registry, config)?;

    let plans = modules::partition(&registry, &order, config)?;
    info!(modules = plans.len(), "modules partitioned");

    emit::emit_modules(&plans, &mut registry, config, printer, sink)?;
    Ok(diagnostics)
}

/// Model families without multiple inheritance refuse multi-base models
/// rather than silently flattening, unless allOf merge mode `all` is on
/// (which inlines parents during building)
fn check_inheritance_support(registry: &ModelRegistry, config: &GenerateConfig) -> Result<()> {
    use crate::config::AllOfMergeMode;

    if config.output_model_type.supports_multiple_inheritance()
        || config.all_of_merge_mode == AllOfMergeMode::All
    {
        return Ok(());
    }
    for model in registry.iter_live() {
        if model.bases.len() > 1 {
            return Err(GeneratorError::UnsupportedFeature {
                feature: format!("multiple inheritance (model {})", model.name),
                model_type: config.output_model_type.as_str().to_string(),
            });
        }
    }
    Ok(())
}
