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

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::component::error::ComponentError;
use crate::component::registry::{
    ComponentInstance, ComponentRegistration, ComponentRegistry, Requirement, ResolvedComponents,
};
use crate::component::scope::{ScopeHandle, SCOPE_TRANSIENT};

/// The result of exiting a scope: the parent to fall back to and any errors
/// raised by component exit callbacks.
#[derive(Debug)]
pub struct ExitScopeResult {
    /// The exited scope's parent, if any.
    pub parent: Option<ScopeHandle>,
    /// Whether every exit callback succeeded.
    pub success: bool,
    /// Renderings of the exit callback failures.
    pub errors: Vec<String>,
}

/// Instantiates components on demand, honouring scope lifetimes and
/// transitive `requires` declarations.
///
/// Resolution selects among candidates by capability tags and priority; an
/// ambiguous selection or a dependency cycle is a fatal resolution error.
/// Session-scoped instances are shared across all callers of the session
/// scope and must be internally thread-safe when used from concurrent
/// dispatch contexts; that responsibility lies with component authors.
pub struct ComponentFactory {
    registry: ComponentRegistry,
}

impl ComponentFactory {
    /// Creates a factory resolving against the given registry.
    pub fn new(registry: ComponentRegistry) -> Self {
        Self { registry }
    }

    /// The registry this factory resolves against.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Creates a new child scope. This never instantiates anything, so it is
    /// safe to use at any time.
    pub fn enter_scope(
        &self,
        name: &str,
        parent: Option<&ScopeHandle>,
    ) -> Result<ScopeHandle, ComponentError> {
        ScopeHandle::new(name, parent)
    }

    /// Exits a scope: drops its cached instances and runs their exit
    /// callbacks, newest first. Callback failures are collected, not
    /// propagated; teardown always completes.
    pub fn exit_scope(&self, scope: ScopeHandle) -> ExitScopeResult {
        let mut errors = Vec::new();
        for (component, on_exit, instance) in scope.drain() {
            debug!("exiting scope '{scope}' for component '{component}'");
            if let Err(e) = on_exit(&instance) {
                error!(
                    "error occurred when exiting scope '{scope}' for component '{component}': {e:#}"
                );
                errors.push(format!("{component}: {e:#}"));
            }
        }
        ExitScopeResult {
            parent: scope.parent().cloned(),
            success: errors.is_empty(),
            errors,
        }
    }

    /// Resolves one requirement in the given scope.
    pub fn resolve(
        &self,
        requirement: &Requirement,
        scope: &ScopeHandle,
    ) -> Result<ComponentInstance, ComponentError> {
        self.resolve_fixated(requirement, scope, &[])
    }

    /// Resolves one requirement with a set of fixated entities: candidates
    /// bound to an entity are only eligible when their entity is in the set.
    pub fn resolve_fixated(
        &self,
        requirement: &Requirement,
        scope: &ScopeHandle,
        fixated_entities: &[String],
    ) -> Result<ComponentInstance, ComponentError> {
        let mut stack = Vec::new();
        self.resolve_inner(requirement, scope, fixated_entities, &mut stack)
    }

    /// Invokes `callable` with the given requirements resolved, creating
    /// missing components in the appropriate scopes as a side effect.
    pub fn call<R>(
        &self,
        scope: &ScopeHandle,
        requires: &[Requirement],
        callable: impl FnOnce(ResolvedComponents) -> R,
    ) -> Result<R, ComponentError> {
        let resolved = self.resolve_all(requires, scope, &[], &mut Vec::new())?;
        Ok(callable(resolved))
    }

    fn resolve_all(
        &self,
        requires: &[Requirement],
        scope: &ScopeHandle,
        fixated_entities: &[String],
        stack: &mut Vec<String>,
    ) -> Result<ResolvedComponents, ComponentError> {
        let mut resolved = ResolvedComponents::default();
        for requirement in requires {
            let instance = self.resolve_inner(requirement, scope, fixated_entities, stack)?;
            resolved.push(requirement.component().to_string(), instance);
        }
        Ok(resolved)
    }

    fn resolve_inner(
        &self,
        requirement: &Requirement,
        scope: &ScopeHandle,
        fixated_entities: &[String],
        stack: &mut Vec<String>,
    ) -> Result<ComponentInstance, ComponentError> {
        if stack.iter().any(|seen| seen == requirement.component()) {
            let mut path = stack.clone();
            path.push(requirement.component().to_string());
            return Err(ComponentError::DependencyCycle {
                path: path.join(" -> "),
            });
        }

        let registration = self.select_candidate(requirement, fixated_entities)?;
        let target_scope = if registration.scope() == SCOPE_TRANSIENT {
            None
        } else {
            Some(scope.find_ancestor(registration.scope())?)
        };

        if let Some(target) = &target_scope {
            if let Some(instance) = target.lookup(registration.id) {
                return Ok(instance);
            }
        }

        stack.push(requirement.component().to_string());
        let dependencies = self.resolve_all(
            registration.requires(),
            target_scope.as_ref().unwrap_or(scope),
            fixated_entities,
            stack,
        )?;
        stack.pop();

        match target_scope {
            None => self.instantiate(&registration, &dependencies),
            Some(target) => {
                // Serialise creation per (scope, registration) so concurrent
                // resolution yields a single instance.
                let lock = target.creation_lock(registration.id);
                let _created = lock.lock().expect("poisoned creation lock");
                if let Some(instance) = target.lookup(registration.id) {
                    return Ok(instance);
                }
                debug!(
                    "instantiating '{}' in scope '{}'",
                    registration.name(),
                    target.name()
                );
                let instance = self.instantiate(&registration, &dependencies)?;
                let instance = target.store(registration.id, instance);
                if let Some(on_exit) = registration.exit_fn() {
                    target.push_finalizer(
                        registration.name().to_string(),
                        on_exit.clone(),
                        instance.clone(),
                    );
                }
                Ok(instance)
            }
        }
    }

    fn instantiate(
        &self,
        registration: &ComponentRegistration,
        dependencies: &ResolvedComponents,
    ) -> Result<ComponentInstance, ComponentError> {
        (registration.factory())(dependencies).map_err(|e| ComponentError::Instantiation {
            component: registration.name().to_string(),
            message: format!("{e:#}"),
        })
    }

    fn select_candidate(
        &self,
        requirement: &Requirement,
        fixated_entities: &[String],
    ) -> Result<Arc<ComponentRegistration>, ComponentError> {
        let eligible: Vec<Arc<ComponentRegistration>> = self
            .registry
            .candidates(requirement.component())
            .into_iter()
            .filter(|candidate| {
                requirement
                    .can()
                    .iter()
                    .all(|capability| candidate.can().contains(capability))
            })
            .filter(|candidate| match candidate.entity() {
                Some(entity) => {
                    fixated_entities.is_empty()
                        || fixated_entities.iter().any(|fixated| fixated == entity)
                }
                None => true,
            })
            .collect();

        let Some(best_priority) = eligible.iter().map(|c| c.priority()).max() else {
            return Err(ComponentError::NoSuchComponent {
                component: requirement.component().to_string(),
                can: requirement.can().to_vec(),
            });
        };
        let best: Vec<&Arc<ComponentRegistration>> = eligible
            .iter()
            .filter(|candidate| candidate.priority() == best_priority)
            .collect();
        if best.len() > 1 {
            return Err(ComponentError::Ambiguous {
                component: requirement.component().to_string(),
                candidates: best
                    .iter()
                    .map(|candidate| candidate.describe())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        Ok(best[0].clone())
    }
}

impl fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("registry", &self.registry)
            .finish()
    }
}
