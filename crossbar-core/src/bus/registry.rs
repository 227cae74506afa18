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

use std::collections::HashSet;
use std::sync::Arc;

use crate::dispatch::Dispatch;
use crate::message::{EndpointId, MessageId};

/// One dispatcher registration: the dispatcher plus its endpoint and entity
/// filters. `None` filters are wildcards.
pub(crate) struct Registration {
    pub(crate) seq: u64,
    pub(crate) dispatcher: Arc<dyn Dispatch>,
    pub(crate) endpoints: Option<HashSet<EndpointId>>,
    pub(crate) entities: Option<HashSet<String>>,
}

impl Registration {
    pub(crate) fn dispatcher_id(&self) -> u64 {
        self.dispatcher.id()
    }

    pub(crate) fn matches_endpoint(&self, endpoint: EndpointId) -> bool {
        match &self.endpoints {
            None => true,
            Some(set) => set.contains(&endpoint),
        }
    }

    /// The entities the delivered copies of a message should carry, given
    /// the message's own entity. An empty vec means no match.
    ///
    /// A message without an entity is a broadcast: an entity-filtered
    /// registration receives one copy per registered entity, each carrying
    /// that entity.
    pub(crate) fn delivery_entities(&self, entity: Option<&str>) -> Vec<Option<String>> {
        match (&self.entities, entity) {
            (None, entity) => vec![entity.map(str::to_owned)],
            (Some(set), Some(entity)) => {
                if set.contains(entity) {
                    vec![Some(entity.to_owned())]
                } else {
                    Vec::new()
                }
            }
            (Some(set), None) => {
                let mut entities: Vec<Option<String>> =
                    set.iter().cloned().map(Some).collect();
                entities.sort();
                entities
            }
        }
    }

    /// Whether this registration is selected by a deregistration filter.
    pub(crate) fn matches_filters(
        &self,
        endpoint_ids: Option<&[EndpointId]>,
        entities: Option<&[&str]>,
    ) -> bool {
        let endpoint_ok = match endpoint_ids {
            None => true,
            Some(filter) => match &self.endpoints {
                None => false,
                Some(set) => filter.iter().any(|endpoint| set.contains(endpoint)),
            },
        };
        let entity_ok = match entities {
            None => true,
            Some(filter) => match &self.entities {
                None => false,
                Some(set) => filter.iter().any(|entity| set.contains(*entity)),
            },
        };
        endpoint_ok && entity_ok
    }
}

/// All defined endpoints and registered dispatchers for one message id.
#[derive(Default)]
pub(crate) struct MessageRoutes {
    pub(crate) endpoints: HashSet<EndpointId>,
    pub(crate) registrations: Vec<Registration>,
}
