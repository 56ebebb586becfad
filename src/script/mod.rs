//! Script engine: running toggle scripts and interpreting their answers.

pub mod mutate;
pub mod probe;
pub mod runner;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use mutate::{effective_timeout, MutationOutcome, StateMutator};
pub use probe::{classify, ProbeOutcome, StateProber, LOCKED_ON_MESSAGE};
pub use runner::{ProcessRunner, ScriptRunner};
pub use stream::{classify_line, StreamMonitor, StreamOutcome, StreamRequest};
