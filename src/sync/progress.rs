use crate::db::{JobStatus, Lines};

/// Messages, warnings and errors collected while a job runs.
/// Index 0 is about the whole job, other indices about a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub messages: Lines,
    pub warnings: Lines,
    pub errors: Lines,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, index: usize, message: impl Into<String>) {
        self.messages.add(index, message);
    }

    pub fn add_warning(&mut self, index: usize, warning: impl Into<String>) {
        self.warnings.add(index, warning);
    }

    pub fn add_error(&mut self, index: usize, error: impl Into<String>) {
        self.errors.add(index, error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Copies everything collected so far into a job status, keeping its state
    pub fn write_to(&self, status: &mut JobStatus) {
        status.messages = self.messages.clone();
        status.warnings = self.warnings.clone();
        status.errors = self.errors.clone();
    }
}
