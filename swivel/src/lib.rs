/**
The swivel control system follows the same layout as the other onyx services: a
component owns the control loop, the devices it talks to are atomic units behind
their own module, and the messages crossing the wire are typed and tested on
their own. The component here sweeps a single networked camera through a fixed
cycle of waypoints and keeps the latest image taken at each one.
*/

/// Components in the system are created by grouping together
/// devices into a logical unit that performs some function
/// for the overall control system.
pub mod components;
/// Devices that are an atomic unit, and can be composed
/// with other devices into components to perform some function.
pub mod devices;
/// Error types shared by the devices and components.
pub mod error;
/// Message structure for communication out of the control
/// system, such as the commands sent to the camera broker.
pub mod messages;
/// Development utilities for scheduling work on the runtime.
pub mod utils;
