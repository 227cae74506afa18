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

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::component::scope::SCOPE_SESSION;

/// A shared, type-erased component instance.
pub type ComponentInstance = Arc<dyn Any + Send + Sync>;

/// Downcasts a component instance back to its concrete type.
pub fn downcast_component<T: Send + Sync + 'static>(
    instance: &ComponentInstance,
) -> Option<Arc<T>> {
    instance.clone().downcast::<T>().ok()
}

type FactoryFn = dyn Fn(&ResolvedComponents) -> anyhow::Result<ComponentInstance> + Send + Sync;
type ExitFn = dyn Fn(&ComponentInstance) -> anyhow::Result<()> + Send + Sync;

/// A dependency declared by a component or a caller: a component name plus
/// the capabilities the selected candidate must have.
#[derive(Debug, Clone)]
pub struct Requirement {
    component: String,
    can: Vec<String>,
}

impl Requirement {
    /// Requires a component by name.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            can: Vec::new(),
        }
    }

    /// Restricts candidates to those with all the given capabilities.
    pub fn with_can(mut self, can: &[&str]) -> Self {
        self.can = can.iter().map(|c| c.to_string()).collect();
        self
    }

    /// The required component name.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The required capabilities.
    pub fn can(&self) -> &[String] {
        &self.can
    }
}

/// The dependencies resolved for one factory call, by requirement name.
#[derive(Default)]
pub struct ResolvedComponents {
    items: Vec<(String, ComponentInstance)>,
}

impl ResolvedComponents {
    pub(crate) fn push(&mut self, name: String, instance: ComponentInstance) {
        self.items.push((name, instance));
    }

    /// The resolved instance for a requirement name.
    pub fn get(&self, name: &str) -> Option<&ComponentInstance> {
        self.items
            .iter()
            .find(|(item, _)| item == name)
            .map(|(_, instance)| instance)
    }

    /// The resolved instance downcast to a concrete type.
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).and_then(downcast_component::<T>)
    }

    /// Iterates the resolved dependencies in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComponentInstance)> {
        self.items
            .iter()
            .map(|(name, instance)| (name.as_str(), instance))
    }
}

/// A registered component: name, scope lifetime, capability tags, priority,
/// optional entity binding, declared dependencies and the factory that
/// builds instances.
pub struct ComponentRegistration {
    pub(crate) id: u64,
    name: String,
    scope: String,
    can: HashSet<String>,
    priority: i32,
    entity: Option<String>,
    requires: Vec<Requirement>,
    factory: Arc<FactoryFn>,
    on_exit: Option<Arc<ExitFn>>,
}

impl ComponentRegistration {
    /// Starts building a component registration around a factory closure.
    ///
    /// The factory receives the resolved dependencies and returns the
    /// instance. The default scope is `session`.
    pub fn build<F>(name: impl Into<String>, factory: F) -> ComponentBuilder
    where
        F: Fn(&ResolvedComponents) -> anyhow::Result<ComponentInstance> + Send + Sync + 'static,
    {
        ComponentBuilder {
            registration: ComponentRegistration {
                id: 0,
                name: name.into(),
                scope: SCOPE_SESSION.to_string(),
                can: HashSet::new(),
                priority: 0,
                entity: None,
                requires: Vec::new(),
                factory: Arc::new(factory),
                on_exit: None,
            },
        }
    }

    /// Builds a registration around a pre-created shared value.
    pub fn instance<T: Send + Sync + 'static>(name: impl Into<String>, value: T) -> ComponentBuilder {
        let shared = Arc::new(value);
        Self::build(name, move |_| {
            let instance: ComponentInstance = shared.clone();
            Ok(instance)
        })
    }

    /// The component name requirements resolve against.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope name instances are cached on.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The capability tags of this candidate.
    pub fn can(&self) -> &HashSet<String> {
        &self.can
    }

    /// Selection priority among equally capable candidates.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The entity this candidate is bound to, if any.
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    pub(crate) fn requires(&self) -> &[Requirement] {
        &self.requires
    }

    pub(crate) fn factory(&self) -> &Arc<FactoryFn> {
        &self.factory
    }

    pub(crate) fn exit_fn(&self) -> Option<&Arc<ExitFn>> {
        self.on_exit.as_ref()
    }

    pub(crate) fn describe(&self) -> String {
        let mut can: Vec<&str> = self.can.iter().map(String::as_str).collect();
        can.sort_unstable();
        format!(
            "{}(scope={}, priority={}, can=[{}])",
            self.name,
            self.scope,
            self.priority,
            can.join(",")
        )
    }
}

impl fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Builder for a [`ComponentRegistration`]; finished by
/// [`ComponentRegistry::register_component`].
pub struct ComponentBuilder {
    registration: ComponentRegistration,
}

impl ComponentBuilder {
    /// Sets the scope instances are cached on (`transient` disables
    /// caching).
    pub fn scope(mut self, scope: &str) -> Self {
        self.registration.scope = scope.to_string();
        self
    }

    /// Adds capability tags.
    pub fn can(mut self, can: &[&str]) -> Self {
        self.registration
            .can
            .extend(can.iter().map(|c| c.to_string()));
        self
    }

    /// Sets the selection priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.registration.priority = priority;
        self
    }

    /// Binds this candidate to an entity.
    pub fn entity(mut self, entity: &str) -> Self {
        self.registration.entity = Some(entity.to_string());
        self
    }

    /// Declares a dependency injected into the factory.
    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.registration.requires.push(requirement);
        self
    }

    /// Registers a callback run with the instance when its owning scope
    /// exits.
    pub fn on_exit<F>(mut self, on_exit: F) -> Self
    where
        F: Fn(&ComponentInstance) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registration.on_exit = Some(Arc::new(on_exit));
        self
    }
}

#[derive(Default)]
struct RegistryInner {
    components: DashMap<String, Vec<Arc<ComponentRegistration>>>,
    ids: AtomicU64,
}

/// Registry of all component candidates, keyed by component name.
///
/// Extensions register their components here during loading; the
/// [`ComponentFactory`](crate::component::ComponentFactory) resolves
/// requirements against it at call time.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    inner: Arc<RegistryInner>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finishes a builder and adds the registration as a candidate for its
    /// name.
    pub fn register_component(&self, builder: ComponentBuilder) {
        let mut registration = builder.registration;
        registration.id = self.inner.ids.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("registering component {}", registration.describe());
        self.inner
            .components
            .entry(registration.name().to_string())
            .or_default()
            .push(Arc::new(registration));
    }

    pub(crate) fn candidates(&self, name: &str) -> Vec<Arc<ComponentRegistration>> {
        self.inner
            .components
            .get(name)
            .map(|candidates| candidates.clone())
            .unwrap_or_default()
    }

    /// Logs information about all registered components to assist in
    /// trouble-shooting.
    pub fn log_components_info(&self) {
        let mut names: Vec<String> = self
            .inner
            .components
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        for name in names {
            for candidate in self.candidates(&name) {
                debug!("component: {}", candidate.describe());
            }
        }
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.inner.components.len())
            .finish()
    }
}
