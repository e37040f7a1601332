// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module identifier resolution
//!
//! Normalizes raw dependency names into canonical module ids and resource
//! locations. Two names refer to the same module exactly when their canonical
//! ids are equal string-for-string.

use std::fmt;

use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};

/// Canonical module identifier.
///
/// The canonical form carries no `./` or `../` segments; relative names are
/// reduced against the requesting module's id before an id is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    /// Wrap an already-canonical id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The top-level base path: relative names resolved against it keep only
    /// their own segments
    pub(crate) fn root() -> Self {
        Self(String::new())
    }

    /// Directory portion of the id, including the trailing slash.
    /// `"pkg/sub/main"` yields `"pkg/sub/"`; a bare id yields `""`.
    pub(crate) fn directory(&self) -> &str {
        match self.0.rfind('/') {
            Some(index) => &self.0[..=index],
            None => "",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Outcome of resolving a raw dependency name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Canonical module id
    pub id: ModuleId,
    /// Where the resource backing the module can be requested from
    pub location: String,
}

/// Resolve a raw dependency name against the base id of the requesting module.
///
/// Absolute paths, names with an explicit scheme, and names already carrying
/// the resource suffix are used verbatim as both id and location. Relative
/// names (`./`, `../`) are joined against the directory portion of `base` and
/// reduced; everything else is a bare id located under the configured base
/// path.
pub fn resolve(raw: &str, base: &ModuleId, config: &LoaderConfig) -> Result<Resolved> {
    if is_verbatim(raw, &config.resource_suffix) {
        return Ok(Resolved {
            id: ModuleId::new(raw),
            location: raw.to_string(),
        });
    }

    let id = if raw.starts_with('.') {
        reduce(&format!("{}{}", base.directory(), raw), raw)?
    } else {
        raw.to_string()
    };

    let location = format!("{}{}{}", config.base_url, id, config.resource_suffix);
    Ok(Resolved {
        id: ModuleId::new(id),
        location,
    })
}

fn is_verbatim(raw: &str, suffix: &str) -> bool {
    raw.starts_with('/') || has_scheme(raw) || raw.ends_with(suffix)
}

fn has_scheme(raw: &str) -> bool {
    match raw.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// Reduce a joined path to canonical form: `.` segments are dropped and `..`
/// segments pop their predecessor. Processing segments left to right always
/// terminates; a `..` with nothing left to pop escapes above the root and is
/// an error.
fn reduce(joined: &str, raw: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(LoaderError::resolution(
                        raw,
                        "relative segment escapes above the root",
                    ));
                }
            }
            segment => segments.push(segment),
        }
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LoaderConfig {
        LoaderConfig::default()
    }

    #[test]
    fn relative_sibling() {
        let resolved = resolve("./a", &ModuleId::new("pkg/main"), &config()).unwrap();
        assert_eq!(resolved.id, ModuleId::new("pkg/a"));
        assert_eq!(resolved.location, "./pkg/a.js");
    }

    #[test]
    fn relative_parent() {
        let resolved = resolve("../a", &ModuleId::new("pkg/sub/main"), &config()).unwrap();
        assert_eq!(resolved.id, ModuleId::new("pkg/a"));
    }

    #[test]
    fn relative_two_levels_up() {
        let resolved = resolve("../../a", &ModuleId::new("pkg/sub/deep/main"), &config()).unwrap();
        assert_eq!(resolved.id, ModuleId::new("pkg/a"));
    }

    #[test]
    fn escape_above_root_is_an_error() {
        let result = resolve("../a", &ModuleId::new("main"), &config());
        assert!(matches!(result, Err(LoaderError::Resolution { .. })));
    }

    #[test]
    fn bare_id_gets_base_url_and_suffix() {
        let resolved = resolve("widgets/button", &ModuleId::root(), &config()).unwrap();
        assert_eq!(resolved.id, ModuleId::new("widgets/button"));
        assert_eq!(resolved.location, "./widgets/button.js");
    }

    #[test]
    fn absolute_path_is_verbatim() {
        let resolved = resolve("/lib/a", &ModuleId::new("pkg/main"), &config()).unwrap();
        assert_eq!(resolved.id, ModuleId::new("/lib/a"));
        assert_eq!(resolved.location, "/lib/a");
    }

    #[test]
    fn scheme_is_verbatim() {
        let resolved = resolve("https://cdn.example/lib", &ModuleId::root(), &config()).unwrap();
        assert_eq!(resolved.id, ModuleId::new("https://cdn.example/lib"));
        assert_eq!(resolved.location, "https://cdn.example/lib");
    }

    #[test]
    fn explicit_suffix_is_verbatim() {
        let resolved = resolve("./a.js", &ModuleId::new("pkg/main"), &config()).unwrap();
        // No reduction happens for direct resource references.
        assert_eq!(resolved.id, ModuleId::new("./a.js"));
        assert_eq!(resolved.location, "./a.js");
    }

    #[test]
    fn configured_base_url_applies() {
        let mut config = config();
        config.base_url = "v2/".to_string();
        let resolved = resolve("a", &ModuleId::root(), &config).unwrap();
        assert_eq!(resolved.location, "v2/a.js");
    }

    #[test]
    fn configured_suffix_applies() {
        let mut config = config();
        config.resource_suffix = ".mjs".to_string();
        let resolved = resolve("a", &ModuleId::root(), &config).unwrap();
        assert_eq!(resolved.location, "./a.mjs");
        // The suffix also drives the verbatim rule.
        let verbatim = resolve("a.mjs", &ModuleId::root(), &config).unwrap();
        assert_eq!(verbatim.location, "a.mjs");
    }

    #[test]
    fn dot_segments_inside_path_reduce() {
        let resolved = resolve("./sub/./x", &ModuleId::new("pkg/main"), &config()).unwrap();
        assert_eq!(resolved.id, ModuleId::new("pkg/sub/x"));
    }

    #[test]
    fn directory_portion() {
        assert_eq!(ModuleId::new("pkg/sub/main").directory(), "pkg/sub/");
        assert_eq!(ModuleId::new("main").directory(), "");
        assert_eq!(ModuleId::root().directory(), "");
    }
}
