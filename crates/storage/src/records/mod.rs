//! Per-entity implementations of the `Record` trait, matching the wire
//! layouts in §6.1.

pub mod group;
pub mod section;
pub mod user;
