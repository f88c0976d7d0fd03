//! Outreach pipeline: lead funnel, work queues and usage limits.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod leads;
pub mod queue;
pub mod snapshot;
pub mod store;
pub mod todos;
pub mod usage;
