//! GPIO pin assignments for the RoboArm controller board.
//!
//! Single source of truth: every sensor binding references this module
//! rather than hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Presence sensing
// ---------------------------------------------------------------------------

/// Digital input: object-detected line of the gripper presence sensor.
/// HIGH = object present.  Pulled down on-chip.
pub const PRESENCE_SENSOR_GPIO: i32 = 4;

/// Digital input: object-detected line at the pick-up bay.
pub const BAY_PRESENCE_GPIO: i32 = 5;
