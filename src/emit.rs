//! Emission interface
//!
//! The printing layer is external to the core: it receives finalized
//! module plans whose models are already ordered so a single forward pass
//! suffices except where forward references appear, and returns byte
//! strings. The core writes those through a sink.

use std::path::PathBuf;

use crate::config::GenerateConfig;
use crate::error::Result;
use crate::model::ModelRegistry;
use crate::modules::ModulePlan;

/// Renders one module to bytes
pub trait Printer {
    fn print_module(
        &self,
        plan: &ModulePlan,
        registry: &ModelRegistry,
        config: &GenerateConfig,
    ) -> Result<Vec<u8>>;
}

/// Receives rendered modules. Paths use forward slashes and carry no
/// extension; the sink applies one.
pub trait ArtifactSink {
    fn write(&mut self, module_path: &str, bytes: &[u8]) -> Result<()>;
}

/// Collects artifacts in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub artifacts: Vec<(String, Vec<u8>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactSink for MemorySink {
    fn write(&mut self, module_path: &str, bytes: &[u8]) -> Result<()> {
        self.artifacts.push((module_path.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// Writes artifacts under a directory root with a fixed extension
pub struct FsSink {
    root: PathBuf,
    extension: String,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }
}

impl ArtifactSink for FsSink {
    fn write(&mut self, module_path: &str, bytes: &[u8]) -> Result<()> {
        let relative = if module_path.is_empty() {
            "__init__".to_string()
        } else {
            module_path.to_string()
        };
        let path = self.root.join(format!("{relative}.{}", self.extension));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Print every module in order and hand the bytes to the sink
pub fn emit_modules(
    plans: &[ModulePlan],
    registry: &mut ModelRegistry,
    config: &GenerateConfig,
    printer: &dyn Printer,
    sink: &mut dyn ArtifactSink,
) -> Result<()> {
    for plan in plans {
        let bytes = printer.print_module(plan, registry, config)?;
        sink.write(&plan.path, &bytes)?;
        for model in &plan.models {
            registry.advance_state(*model, crate::model::BuildState::Emitted);
        }
    }
    Ok(())
}
