//! Exception kinds surfaced across the monitor boundary.
//!
//! Errors here are never thrown as Rust unwinds across that boundary:
//! each monitor-level primitive returns a plain `bool`/enum status, and
//! each object-level facade function calls [`crate::Runtime::signal_exception`]
//! and then returns normally, exactly like the grounding source's
//! `signalException(...)` followed by a plain `return`. See `SPEC_FULL.md`
//! `# 7`.

/// A VM-level exception this core knows how to raise. Named after the
/// condition that triggers it rather than after any particular VM's
/// exception class, since the concrete exception type/class is the
/// embedder's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncException {
    /// `wait`/`notify`/`notifyAll` called by a thread that does not hold
    /// the object's monitor.
    IllegalMonitorState,
    /// A parked `wait` was woken by an interrupt rather than a notify or
    /// a timeout.
    Interrupted,
}

impl std::fmt::Display for SyncException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncException::IllegalMonitorState => write!(f, "IllegalMonitorStateException"),
            SyncException::Interrupted => write!(f, "InterruptedException"),
        }
    }
}

impl std::error::Error for SyncException {}
