//! # codecgate
//!
//! Asynchronous front end for a parameter-set parsing module.
//!
//! The module is loaded once, in the background, when a [`ModuleGate`] is
//! built. Callers may invoke [`ModuleGate::parse_codec`] at any time: before
//! the module is ready their calls are parked and released in arrival order,
//! afterwards they go straight through. A failed load is terminal and every
//! caller sees the same [`ModuleLoadError`].
//!
//! ## Crate structure
//!
//! - [`gate`] — [`ModuleGate`] state machine, FIFO pending queue, call admission
//! - [`module`] — [`CodecModule`] trait, the native module and loaders
//! - [`outcome`] — [`ParseOutcome`] and its JSON shape [`OutcomeRecord`]
//! - [`config`] — TOML configuration (module source, admission policy)
//! - [`error`] — [`ModuleLoadError`], [`CodecError`]

pub mod config;
pub mod error;
pub mod gate;
pub mod module;
pub mod outcome;

pub use codecgate_params::{CodecDescription, ParameterSets, ParseError};
pub use config::{Admission, GateConfig, ModuleSource};
pub use error::{CodecError, ModuleLoadError};
pub use gate::{GateStatus, ModuleGate};
pub use module::{CodecModule, EntryPoint, LoadResult, NativeModule};
pub use outcome::{OutcomeRecord, ParseOutcome};
