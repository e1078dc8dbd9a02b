//! Incremental dependency tracking.
//!
//! A [`DepFile`] ties the main file of a build step to its extra inputs and
//! its outputs. Persisted between runs, it answers whether the step has to
//! run again: any tracked file that changed, appeared or disappeared (within
//! the rules of its [`DepRule`]) means it does. A [`DependencyStore`] keeps
//! every [`DepFile`] of a build scope; a [`DependencySystem`] adds the scopes
//! of other machines whose outputs might be reused.

mod config;
pub mod error;
mod file;
pub mod format;
mod record;
mod state;
mod store;
mod system;

pub use crate::config::DependencyConfig;
pub use crate::file::{DepFile, Lifecycle};
pub use crate::format::RecordFormat;
pub use crate::record::{DepRecord, DepRule, DepStatus};
pub use crate::state::State;
pub use crate::store::DependencyStore;
pub use crate::system::{DependencySystem, Scope};
