//! Sequence execution engine.
//!
//! A request carries sequences of typed steps plus a coordinate map. The
//! [`service::ExecutionService`] validates the steps, takes a capacity permit,
//! opens a browser session and hands everything to a one-shot
//! [`runner::SequenceRunner`]. Each step goes through the
//! [`interpreter::StepInterpreter`], which applies the retry state machine in
//! [`retry`] and resolves secrets through [`resolver`].
pub mod artifacts;
pub mod budget;
pub mod capacity;
pub mod context;
pub mod error;
pub mod interpreter;
pub mod model;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod runner;
pub mod service;

pub use error::{ConfigurationError, EngineError};
pub use model::{ExecutionRequest, SequenceDef, StepDef};
pub use report::ExecutionReport;
pub use resolver::{CoordinateMap, Credentials};
pub use service::{EngineDeps, ExecutionService};
