/// Why the node is shutting down
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// An operating-system signal was received
    Signal(String),
    /// The acquisition session ended on its own
    SessionEnded,
}
