// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader

use crate::resolver::ModuleId;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors surfaced at a loader call site.
///
/// Failures are local to the call that triggered them and never poison the
/// registry. A resource request that never signals readiness has no error
/// representation at all: its waiters stay pending forever.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A dependency name could not be reduced to a canonical module id
    #[error("cannot resolve module id '{id}': {reason}")]
    Resolution {
        /// Raw dependency name as written by the caller
        id: String,
        /// Reason the reduction failed
        reason: String,
    },

    /// Synchronous require for a module that has not finished initializing
    #[error("module '{0}' is not initialized")]
    NotInitialized(ModuleId),
}

impl LoaderError {
    /// Create a resolution error for a raw dependency name
    pub fn resolution(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
