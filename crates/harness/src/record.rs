use std::io;

use serde::Serialize;

use crate::{AssertionRecord, Harness};

/// Keeps every protocol call in memory.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RecordingHarness {
    pub planned: Option<usize>,
    pub records: Vec<AssertionRecord>,
    pub diagnostics: Vec<String>,
    pub summarized: Option<usize>,
}

impl RecordingHarness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_count(&self) -> usize {
        self.records.iter().filter(|r| !r.passed).count()
    }

    pub fn sequences(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.sequence).collect()
    }

    /// Records whose description contains `needle`.
    pub fn matching<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a AssertionRecord> {
        self.records
            .iter()
            .filter(move |r| r.description.contains(needle))
    }
}

impl Harness for RecordingHarness {
    fn plan(&mut self, count: usize) -> io::Result<()> {
        self.planned = Some(count);
        Ok(())
    }

    fn assertion(&mut self, record: &AssertionRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn diag(&mut self, message: &str) -> io::Result<()> {
        self.diagnostics.push(message.to_string());
        Ok(())
    }

    fn summary(&mut self, count: usize) -> io::Result<()> {
        self.summarized = Some(count);
        Ok(())
    }
}
