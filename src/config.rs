// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration

use serde::{Deserialize, Serialize};

/// Default base path prepended to resolved resource locations
pub const DEFAULT_BASE_URL: &str = "./";

/// Default suffix appended to resolved resource locations
pub const DEFAULT_RESOURCE_SUFFIX: &str = ".js";

/// Process-wide resolution settings consumed by the identifier resolver.
///
/// Changing the configuration affects resolutions performed afterwards;
/// locations of requests already in flight were computed at request time and
/// are not revisited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base path prepended to non-verbatim resource locations
    pub base_url: String,

    /// Suffix appended to non-verbatim resource locations
    pub resource_suffix: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            resource_suffix: DEFAULT_RESOURCE_SUFFIX.to_string(),
        }
    }
}

/// Partial configuration update; only the fields that are set are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    /// New base path, if any
    pub base_url: Option<String>,

    /// New resource suffix, if any
    pub resource_suffix: Option<String>,
}

impl ConfigUpdate {
    /// Update only the base path
    pub fn base_url(url: impl Into<String>) -> Self {
        Self {
            base_url: Some(url.into()),
            ..Self::default()
        }
    }
}

impl LoaderConfig {
    /// Apply a partial update, leaving unset fields untouched
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(base_url) = update.base_url {
            self.base_url = base_url;
        }
        if let Some(resource_suffix) = update.resource_suffix {
            self.resource_suffix = resource_suffix;
        }
    }
}
