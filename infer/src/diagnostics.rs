//! Structured diagnostics collector.
//!
//! Recoverable inference conditions are recorded here *and* logged through
//! `tracing`, so callers and tests can assert on exactly which conditions
//! fired instead of scraping console output.

/// What kind of recoverable condition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Elementwise inputs had incompatible non-1 dimensions; the larger
    /// dimension was taken.
    BroadcastMismatch,
    /// An input had no resolvable shape; a best-effort substitute was used.
    MissingShape,
    /// An input had no resolvable dtype.
    MissingDtype,
    /// Input ranks disagreed with the operator's expectation; the rule fell
    /// back to the first known shape.
    RankFallback,
    /// A Loop body's carried output disagreed with the incoming state; the
    /// incoming shape and dtype were kept.
    CarryMismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Name of the operation node the condition fired on.
    pub node: String,
    pub message: String,
}

/// Append-only collection of recoverable conditions from one pass run.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: DiagnosticKind, node: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(node, kind = ?kind, "{message}");
        self.records.push(Diagnostic { kind, node: node.to_string(), message });
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    /// All records of one kind, for test assertions.
    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<&Diagnostic> {
        self.records.iter().filter(|d| d.kind == kind).collect()
    }

    /// Merge another collector's records into this one.
    pub fn extend(&mut self, other: Diagnostics) {
        self.records.extend(other.records);
    }
}
