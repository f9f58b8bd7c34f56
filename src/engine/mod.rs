//! Attendance sequencing and time aggregation.
//!
//! Role-agnostic: callers decide who may invoke what, the engine only sees
//! a company and its employees.

pub mod blocks;
pub mod clock;
pub mod error;
pub mod period;
pub mod sequencing;
pub mod tenant;
