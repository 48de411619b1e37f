use serde_json::{Value, json};

use crate::plugin::envelope::CompilationReport;

/// Last known compilation outcome, handed to a plugin right after it gains focus.
#[derive(Debug, Default)]
pub struct CompilationSnapshot {
    last: Option<Value>,
}

impl CompilationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A successful run replaces the snapshot; a failed run clears it.
    pub fn record(&mut self, report: &CompilationReport) {
        self.last = report
            .success
            .then(|| json!({ "data": report.data, "source": report.source }));
    }

    pub fn current(&self) -> Option<Value> {
        self.last.clone()
    }
}
