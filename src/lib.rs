// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # modwire
//!
//! An asynchronous module-definition and dependency-resolution engine.
//!
//! Callers declare named or anonymous modules with a list of dependency names
//! and a factory. The engine resolves names to canonical ids, requests
//! missing resources through a host-supplied [`ResourceTransport`], waits for
//! transitive dependencies, invokes each factory exactly once, and caches its
//! result as the module's export value.
//!
//! - Named and anonymous `define`, with anonymous definitions bound to the
//!   resource id that loaded them
//! - Asynchronous `require` with positional dependency values in declared
//!   order, independent of completion order
//! - Synchronous `require` for already-initialized modules
//! - Relative id resolution against the requesting module's own location
//! - A single outstanding resource request per id, shared by all waiters
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use modwire::{Factory, Loader};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> modwire::Result<()> {
//!     let loader = Loader::new(Arc::new(MyTransport::new()));
//!     loader.define("greeting", &[], Factory::from("hello"))?;
//!     loader.require(&["greeting"], |values| {
//!         println!("{:?}", values[0]);
//!     })?;
//!     Ok(())
//! }
//! ```
//!
//! The transport is the only host obligation: given an id and a resource
//! location, make the resource executable so that it calls `define` against
//! the loader handle, and return when loading has finished.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod transport;
pub mod value;

// Re-exports
pub use config::{ConfigUpdate, LoaderConfig};
pub use error::{LoaderError, Result};
pub use loader::{Context, Factory, Loader, ScopedRequire, DEFAULT_DEPENDENCIES};
pub use registry::ModuleState;
pub use resolver::ModuleId;
pub use transport::{InertTransport, ResourceTransport, ScriptedTransport};
pub use value::{ObjectRef, Value};

/// Version of the modwire engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capability marker advertising that a loader implements the AMD-style
/// module-wiring contract; see [`Loader::AMD`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmdMarker;
