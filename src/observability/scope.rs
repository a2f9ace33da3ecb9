//! ObservationScope for start/complete logging around a unit of work
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` on `complete()`
//! - Logs `{name}_FAILED` on `fail()`
//! - Logs `{name}_INCOMPLETE` at WARN if dropped without either

use std::time::Instant;

use super::logger::Logger;

/// A scope that logs begin and end events with shared fields
pub struct ObservationScope {
    name: String,
    finished: bool,
    fields: Vec<(String, String)>,
    started: Instant,
}

impl ObservationScope {
    /// Create a scope carrying `fields` on every event it logs
    pub fn with_fields(name: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        let scope = Self {
            name: name.into(),
            finished: false,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            started: Instant::now(),
        };
        Logger::info(&format!("{}_BEGIN", scope.name), &scope.field_refs(&[]));
        scope
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self::with_fields(name, &[])
    }

    fn field_refs<'a>(&'a self, extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut refs: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        refs.extend_from_slice(extra);
        refs
    }

    /// Milliseconds since the scope began
    pub fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }

    /// Mark the scope complete, logging `extra` alongside the scope fields
    pub fn complete_with_fields(&mut self, extra: &[(&str, &str)]) {
        if self.finished {
            return;
        }
        self.finished = true;
        let elapsed = self.elapsed_ms();
        let mut fields = self.field_refs(extra);
        fields.push(("elapsed_ms", &elapsed));
        Logger::info(&format!("{}_COMPLETE", self.name), &fields);
    }

    pub fn complete(&mut self) {
        self.complete_with_fields(&[]);
    }

    /// Mark the scope failed
    pub fn fail(&mut self, reason: &str) {
        if self.finished {
            return;
        }
        self.finished = true;
        Logger::error(
            &format!("{}_FAILED", self.name),
            &self.field_refs(&[("reason", reason)]),
        );
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &self.field_refs(&[("reason", "scope dropped without completion")]),
            );
        }
    }
}
