//! Error types for graph evaluation.

use std::fmt;

/// Failures surfaced by reads and writes on graph nodes.
///
/// These are the only two error conditions the engine distinguishes.
/// Everything else that can go "wrong" internally (a reclaimed reader, an
/// edge left over from an earlier computation, a version mismatch) is normal
/// control flow and silently repairs the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// A derived node's computation, directly or transitively, read the node
    /// itself.
    ///
    /// Detected when a recomputation finds its own cache already in the
    /// in-progress state. Fatal for the read that triggered it; the rest of
    /// the graph stays usable.
    Cycle,

    /// A producer changed while a computation that reads it was running.
    ///
    /// This means the computation wrote to one of its own inputs, which is a
    /// programming error in the computation. Fatal for the enclosing write.
    ChangedWhileEvaluating,
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalError::Cycle => write!(f, "dependency cycle detected during evaluation"),
            SignalError::ChangedWhileEvaluating => {
                write!(f, "input changed while its reader was evaluating")
            }
        }
    }
}

impl std::error::Error for SignalError {}
