/// Components that drive a networked camera.
pub mod camera {
    /// The swivel component which sweeps a camera through its waypoints.
    pub mod swivel;
    /// Latest image captured at each waypoint.
    pub mod snapshots;
    /// Waypoint labels and the cycle they are visited in.
    pub mod waypoint;
}

/// Helpful prelude when working with components.
pub mod prelude {
    pub use crate::components::camera::snapshots::*;
    pub use crate::components::camera::swivel::*;
    pub use crate::components::camera::waypoint::*;
    pub use crate::devices::hardware::broker::{Broker, BrokerClient};
    pub use crate::error::*;
}
