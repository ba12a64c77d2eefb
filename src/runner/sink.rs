use crate::models::{ConsoleOutput, OutputKind};

/// Receives console lines produced by a run, in order.
pub trait OutputSink: Send {
    fn write(&mut self, kind: OutputKind, message: &str);
}

/// Collects lines in memory with their timestamps.
#[derive(Debug, Default, Clone)]
pub struct ConsoleBuffer {
    pub entries: Vec<ConsoleOutput>,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, kind: OutputKind) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.message.as_str())
            .collect()
    }
}

impl OutputSink for ConsoleBuffer {
    fn write(&mut self, kind: OutputKind, message: &str) {
        self.entries.push(ConsoleOutput::now(kind, message));
    }
}
