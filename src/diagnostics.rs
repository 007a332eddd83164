//! Diagnostics
//!
//! Collects non-fatal findings during resolution, model building, and
//! normalization. The diagnostics channel is returned alongside the artifact
//! set so callers can report warnings without failing the run.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// $ref points at a fragment that does not exist but is never used
    UnresolvedRef,
    /// Discriminator object is missing mapping entries for some variants
    MissingDiscriminatorMapping,
    /// `pattern` constraint is not a valid regular expression
    InvalidPattern,
    /// An identifier was renamed during sanitization or collision handling
    RenamedIdentifier,
    /// `format` value is not recognized; the base type is kept
    UnknownFormat,
    /// A reference cycle was broken with a forward reference
    CycleBroken,
    /// Two structurally identical models were merged
    DuplicateModelMerged,
    /// Schema construct was skipped because no model can represent it
    SkippedFragment,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnresolvedRef => "W001",
            Self::MissingDiscriminatorMapping => "W002",
            Self::InvalidPattern => "W003",
            Self::RenamedIdentifier => "I001",
            Self::UnknownFormat => "W004",
            Self::CycleBroken => "I002",
            Self::DuplicateModelMerged => "I003",
            Self::SkippedFragment => "W005",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::UnresolvedRef
            | Self::MissingDiscriminatorMapping
            | Self::InvalidPattern
            | Self::UnknownFormat
            | Self::SkippedFragment => Severity::Warning,
            Self::RenamedIdentifier | Self::CycleBroken | Self::DuplicateModelMerged => {
                Severity::Info
            }
        }
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

// =============================================================================
// Diagnostic Items
// =============================================================================

/// A single diagnostic finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    pub code: DiagnosticCode,
    /// Schema path of the offending fragment, e.g.
    /// `#/components/schemas/Pet/properties/id`
    pub schema_path: String,
    pub message: String,
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.as_str(),
            self.schema_path,
            self.message
        )
    }
}

/// Collected diagnostics for a generator run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding
    pub fn push(&mut self, code: DiagnosticCode, schema_path: &str, message: impl Into<String>) {
        self.items.push(DiagnosticItem {
            code,
            schema_path: schema_path.to_string(),
            message: message.into(),
        });
    }

    pub fn unresolved_ref(&mut self, schema_path: &str, target: &str) {
        self.push(
            DiagnosticCode::UnresolvedRef,
            schema_path,
            format!("$ref target {target} does not exist"),
        );
    }

    pub fn missing_discriminator_mapping(&mut self, schema_path: &str, variant: &str) {
        self.push(
            DiagnosticCode::MissingDiscriminatorMapping,
            schema_path,
            format!("discriminator mapping has no entry for variant {variant}; union treated as non-discriminated"),
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items
            .iter()
            .filter(|i| i.code.severity() == Severity::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(DiagnosticCode::UnresolvedRef.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::CycleBroken.severity(), Severity::Info);
    }

    #[test]
    fn test_display() {
        let mut diags = Diagnostics::new();
        diags.unresolved_ref("#/components/schemas/Pet", "#/definitions/Missing");
        let rendered = diags.iter().next().unwrap().to_string();
        assert!(rendered.starts_with("[W001] #/components/schemas/Pet:"));
    }
}
