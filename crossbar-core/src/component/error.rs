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

use thiserror::Error;

/// Errors raised by the component factory during scope management and
/// resolution. All of these are fatal; resolution is never retried.
#[derive(Debug, Clone, Error)]
pub enum ComponentError {
    /// No registered component fulfils the requirement.
    #[error("no component found for requirement '{component}' with capabilities {can:?}")]
    NoSuchComponent {
        /// The required component name.
        component: String,
        /// The requested capabilities.
        can: Vec<String>,
    },

    /// More than one equally strong candidate fulfils the requirement.
    #[error("ambiguous resolution for component '{component}', candidates: {candidates}")]
    Ambiguous {
        /// The required component name.
        component: String,
        /// Descriptions of the tied candidates.
        candidates: String,
    },

    /// The `requires` chain loops back on itself.
    #[error("dependency cycle detected while resolving components: {path}")]
    DependencyCycle {
        /// The resolution path that closed the cycle.
        path: String,
    },

    /// A component's target scope is not an ancestor of the resolution
    /// scope.
    #[error("no scope found with name '{scope}'")]
    ScopeNotFound {
        /// The missing scope name.
        scope: String,
    },

    /// A scope name appeared twice in one hierarchy.
    #[error("multiple scopes with name '{name}' in the same hierarchy")]
    DuplicateScopeName {
        /// The duplicated scope name.
        name: String,
    },

    /// A component's factory returned an error.
    #[error("error occurred when instantiating '{component}': {message}")]
    Instantiation {
        /// The component being instantiated.
        component: String,
        /// The factory's error rendering.
        message: String,
    },

    /// Components were requested where no factory is wired.
    #[error("no component factory available to resolve '{component}'")]
    ComponentsUnavailable {
        /// The required component name.
        component: String,
    },
}
