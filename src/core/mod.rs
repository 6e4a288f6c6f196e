//! Core domain models for validation pipelines
//!
//! This module defines the fundamental data structures that represent
//! pipelines, steps, their results, and the job/run lifecycles.

pub mod catalog;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod state;
pub mod step;

pub use catalog::*;
pub use context::*;
pub use error::*;
pub use job::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
