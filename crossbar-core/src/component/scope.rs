/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::component::error::ComponentError;
use crate::component::registry::ComponentInstance;

/// Scope for components living for the whole session.
pub const SCOPE_SESSION: &str = "session";
/// Scope for components created fresh per test.
pub const SCOPE_TEST: &str = "test";
/// Scope for components living as long as one dispatcher.
pub const SCOPE_DISPATCHER: &str = "dispatcher";
/// Scope for components living for one handled message.
pub const SCOPE_MESSAGE: &str = "message";
/// Pseudo scope for components that are never cached.
pub const SCOPE_TRANSIENT: &str = "transient";

type Finalizer = (
    String,
    Arc<dyn Fn(&ComponentInstance) -> anyhow::Result<()> + Send + Sync>,
    ComponentInstance,
);

struct ScopeInner {
    name: String,
    parent: Option<ScopeHandle>,
    instances: Mutex<HashMap<u64, ComponentInstance>>,
    creation_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
    finalizers: Mutex<Vec<Finalizer>>,
}

/// A named scope in the component lifetime hierarchy.
///
/// Scopes form a parent chain (for example session -> dispatcher ->
/// message); a component instantiated "in" a scope is cached on the ancestor
/// matching its registered scope name and dropped when that scope exits.
#[derive(Clone)]
pub struct ScopeHandle {
    inner: Arc<ScopeInner>,
}

impl ScopeHandle {
    /// Creates a scope under `parent`. Duplicate names in one hierarchy are
    /// rejected, they would make ancestor lookup ambiguous.
    pub(crate) fn new(name: &str, parent: Option<&ScopeHandle>) -> Result<Self, ComponentError> {
        if let Some(parent) = parent {
            if parent.hierarchy().iter().any(|ancestor| ancestor == name) {
                return Err(ComponentError::DuplicateScopeName {
                    name: name.to_string(),
                });
            }
        }
        Ok(Self {
            inner: Arc::new(ScopeInner {
                name: name.to_string(),
                parent: parent.cloned(),
                instances: Mutex::new(HashMap::new()),
                creation_locks: Mutex::new(HashMap::new()),
                finalizers: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The scope's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parent scope, if any.
    pub fn parent(&self) -> Option<&ScopeHandle> {
        self.inner.parent.as_ref()
    }

    /// Scope names from the root down to this scope.
    pub fn hierarchy(&self) -> Vec<String> {
        let mut hierarchy = match &self.inner.parent {
            Some(parent) => parent.hierarchy(),
            None => Vec::new(),
        };
        hierarchy.push(self.inner.name.clone());
        hierarchy
    }

    /// Finds the closest ancestor (including self) with the given name.
    pub fn find_ancestor(&self, name: &str) -> Result<ScopeHandle, ComponentError> {
        if self.inner.name == name {
            return Ok(self.clone());
        }
        match &self.inner.parent {
            Some(parent) => parent.find_ancestor(name),
            None => Err(ComponentError::ScopeNotFound {
                scope: name.to_string(),
            }),
        }
    }

    pub(crate) fn lookup(&self, registration_id: u64) -> Option<ComponentInstance> {
        self.inner
            .instances
            .lock()
            .expect("poisoned scope lock")
            .get(&registration_id)
            .cloned()
    }

    /// Stores an instance; when another creation raced us here the earlier
    /// instance wins and is returned instead.
    pub(crate) fn store(
        &self,
        registration_id: u64,
        instance: ComponentInstance,
    ) -> ComponentInstance {
        let mut instances = self.inner.instances.lock().expect("poisoned scope lock");
        instances
            .entry(registration_id)
            .or_insert(instance)
            .clone()
    }

    pub(crate) fn creation_lock(&self, registration_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self
            .inner
            .creation_locks
            .lock()
            .expect("poisoned scope lock");
        locks.entry(registration_id).or_default().clone()
    }

    pub(crate) fn push_finalizer(
        &self,
        component: String,
        on_exit: Arc<dyn Fn(&ComponentInstance) -> anyhow::Result<()> + Send + Sync>,
        instance: ComponentInstance,
    ) {
        self.inner
            .finalizers
            .lock()
            .expect("poisoned scope lock")
            .push((component, on_exit, instance));
    }

    /// Empties the scope, returning the finalizers to run, newest first.
    pub(crate) fn drain(&self) -> Vec<Finalizer> {
        self.inner
            .instances
            .lock()
            .expect("poisoned scope lock")
            .clear();
        self.inner
            .creation_locks
            .lock()
            .expect("poisoned scope lock")
            .clear();
        let mut finalizers = std::mem::take(
            &mut *self
                .inner
                .finalizers
                .lock()
                .expect("poisoned scope lock"),
        );
        finalizers.reverse();
        finalizers
    }

    /// Number of cached instances; diagnostics only.
    pub fn instance_count(&self) -> usize {
        self.inner
            .instances
            .lock()
            .expect("poisoned scope lock")
            .len()
    }
}

impl PartialEq for ScopeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ScopeHandle {}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self.hierarchy().join("->"))
    }
}

impl fmt::Display for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}
