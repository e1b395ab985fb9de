//! Host output collaborator for the PRINT instruction.
//!
//! The VM never writes to a terminal itself; PRINT hands the top-of-stack
//! word to an [`Output`] supplied by the host for the duration of a run.

use std::io::Write;

/// Receives values emitted by PRINT.
pub trait Output {
    /// Called once per executed PRINT with the current top-of-stack word.
    fn print(&mut self, value: u64);
}

/// Writes each value on its own line to stdout.
#[derive(Debug, Default)]
pub struct StdoutOutput;

impl Output for StdoutOutput {
    fn print(&mut self, value: u64) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{value}");
    }
}

/// Collects emitted values in memory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CapturedOutput {
    values: Vec<u64>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values in emission order.
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<u64> {
        self.values
    }
}

impl Output for CapturedOutput {
    fn print(&mut self, value: u64) {
        self.values.push(value);
    }
}

/// Discards every value.
#[derive(Debug, Default)]
pub struct NullOutput;

impl Output for NullOutput {
    fn print(&mut self, _value: u64) {}
}

impl<O: Output + ?Sized> Output for &mut O {
    fn print(&mut self, value: u64) {
        (**self).print(value);
    }
}
