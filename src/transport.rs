// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resource transport seam
//!
//! The engine never fetches anything itself. When dependency resolution needs
//! a module that has no record yet, it hands the id and resource location to
//! the host-supplied [`ResourceTransport`] and treats completion of the
//! returned future as the readiness signal. The transport is expected to
//! evaluate the resource against the loader handle (calling
//! [`Loader::define`](crate::Loader::define) or
//! [`Loader::define_anonymous`](crate::Loader::define_anonymous)) before
//! returning. A future that never resolves models a load that never finishes:
//! the module stays `Requested` and its waiters stay pending.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::loader::Loader;
use crate::resolver::ModuleId;

/// Host collaborator that turns a resource location into an executed resource.
///
/// The engine requests each id at most once; deduplication of concurrent
/// requires happens before the transport is involved.
#[async_trait]
pub trait ResourceTransport: Send + Sync {
    /// Fetch and evaluate the resource at `location`.
    ///
    /// Returning signals, exactly once, that the resource finished loading —
    /// whether or not it actually defined anything.
    async fn fetch(&self, loader: Loader, id: ModuleId, location: String);
}

/// Transport that never signals readiness. Every request through it leaves
/// the module permanently `Requested`; useful for hosts that only consume
/// pre-defined modules, and for tests of the stalled-load path.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertTransport;

#[async_trait]
impl ResourceTransport for InertTransport {
    async fn fetch(&self, _loader: Loader, _id: ModuleId, _location: String) {
        std::future::pending::<()>().await;
    }
}

/// Body of a scripted resource: runs against the loader handle when the
/// resource is "evaluated"
pub type ResourceScript = Box<dyn Fn(&Loader) + Send + Sync>;

/// Record of one request issued to a [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// Canonical module id that was requested
    pub id: String,
    /// Resource location computed at request time
    pub location: String,
}

/// In-memory transport backed by scripted resources.
///
/// Each scripted id runs its closure once, when fetched. In gated mode a
/// fetch additionally waits until [`ScriptedTransport::release`] is called
/// for its id, which lets tests drive completion order explicitly. Fetches
/// for ids with no script complete without defining anything.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, ResourceScript>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    gated: bool,
    requests: Mutex<Vec<RequestRecord>>,
}

impl ScriptedTransport {
    /// Transport whose fetches complete as soon as their script has run
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose fetches wait for an explicit [`release`](Self::release)
    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }

    /// Install the resource script for `id`
    pub fn script(&self, id: impl Into<String>, script: impl Fn(&Loader) + Send + Sync + 'static) {
        self.scripts.lock().insert(id.into(), Box::new(script));
    }

    /// Let a gated fetch for `id` proceed. Calling this before the fetch
    /// arrives is fine; the permit is kept.
    pub fn release(&self, id: &str) {
        self.gate(id).notify_one();
    }

    /// Requests observed so far, in issue order
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.requests.lock().clone()
    }

    fn gate(&self, id: &str) -> Arc<Notify> {
        self.gates
            .lock()
            .entry(id.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl ResourceTransport for ScriptedTransport {
    async fn fetch(&self, loader: Loader, id: ModuleId, location: String) {
        self.requests.lock().push(RequestRecord {
            id: id.as_str().to_string(),
            location,
        });
        if self.gated {
            let gate = self.gate(id.as_str());
            gate.notified().await;
        }
        let script = self.scripts.lock().remove(id.as_str());
        if let Some(script) = script {
            script(&loader);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gated_fetch_waits_for_release() {
        let transport = Arc::new(ScriptedTransport::gated());
        let loader = Loader::new(transport.clone());

        transport.release("a");
        // Permit was stored, so the fetch completes immediately once issued.
        transport
            .fetch(loader, ModuleId::new("a"), "./a.js".to_string())
            .await;
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(transport.requests()[0].location, "./a.js");
    }

    #[tokio::test]
    async fn script_runs_once() {
        let transport = Arc::new(ScriptedTransport::new());
        let loader = Loader::new(transport.clone());
        transport.script("a", |loader| {
            loader.define("a", &[], crate::Factory::from("A")).unwrap();
        });

        transport
            .fetch(loader.clone(), ModuleId::new("a"), "./a.js".to_string())
            .await;
        assert!(transport.scripts.lock().is_empty());
    }
}
