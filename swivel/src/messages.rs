/// Standardise how messages are sent out of the current
/// control system. Provide test suite to ensure interfaces
/// are respected.
pub mod control {
    /// Move messages are sent to the broker to point the
    /// camera at a waypoint over a given duration.
    pub mod move_to;
}
