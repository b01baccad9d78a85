//! Snooze daemon: loads the inventory, runs the scheduler, analysis and
//! inventory loops, and serves health and metrics endpoints.

pub mod api;
pub mod config;
pub mod inventory;
