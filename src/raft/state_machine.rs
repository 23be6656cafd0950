use crate::Result;

/// Deterministic replicated state machine driven by committed log entries.
///
/// Entries are applied one at a time, in log order, from the Raft core task.
pub trait StateMachine: Send + 'static {
    /// Applies the command committed at `index` and returns its encoded
    /// result. The outcome must depend only on the current state and
    /// `command`.
    fn apply(
        &mut self,
        index: u64,
        command: &[u8],
    ) -> Result<Vec<u8>>;

    /// Answers a read-only query against the applied state
    fn query(
        &self,
        query: &[u8],
    ) -> Result<Vec<u8>>;

    fn snapshot(&self) -> Result<Vec<u8>>;

    fn restore(
        &mut self,
        data: &[u8],
    ) -> Result<()>;
}
