//! Realtime channel events.

/// Inbound event carrying a countdown duration in seconds.
pub const DURATION_EVENT: &str = "time-received";

/// Outbound event announcing that a countdown has run out.
pub const SESSION_FINISHED_EVENT: &str = "timer-finished";

/// Events delivered by the realtime channel to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The server announced a countdown duration (seconds, unclamped).
    DurationReceived(i64),
    /// The channel (re)established its session with the server.
    Connected,
    /// The channel lost its session with the server; it will keep retrying.
    Disconnected,
}
