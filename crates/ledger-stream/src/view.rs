//! Client-side views maintained from stream events.

use ledger_codec::{matches_any, CreateEvent, Event, Query, Value};
use std::fmt::Debug;

/// A view folds events into a state.
pub trait View: Send + 'static {
    type State: Clone + Debug + Send + 'static;

    /// Apply one event. Returns whether the event is reported to the consumer.
    fn apply(&mut self, event: &Event) -> bool;

    fn state(&self) -> Self::State;
}

/// Active contracts matching any of a set of predicates, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct QueryView {
    queries: Vec<Query>,
    contracts: Vec<CreateEvent>,
}

impl QueryView {
    /// An empty predicate list matches every contract.
    pub fn new(queries: Vec<Query>) -> Self {
        Self {
            queries,
            contracts: Vec::new(),
        }
    }
}

impl View for QueryView {
    type State = Vec<CreateEvent>;

    fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::Created(created) => {
                if !matches_any(&self.queries, &created.payload) {
                    return false;
                }
                match self
                    .contracts
                    .iter_mut()
                    .find(|c| c.contract_id == created.contract_id)
                {
                    Some(existing) => *existing = created.clone(),
                    None => self.contracts.push(created.clone()),
                }
                true
            }
            // The gateway only sends archivals relevant to the subscription.
            Event::Archived(archived) => {
                self.contracts
                    .retain(|c| c.contract_id != archived.contract_id);
                true
            }
        }
    }

    fn state(&self) -> Self::State {
        self.contracts.clone()
    }
}

/// The active contract with one key, if any.
#[derive(Debug, Clone)]
pub struct KeyView {
    key: Value,
    contract: Option<CreateEvent>,
}

impl KeyView {
    pub fn new(key: Value) -> Self {
        Self {
            key,
            contract: None,
        }
    }
}

impl View for KeyView {
    type State = Option<CreateEvent>;

    fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::Created(created) => {
                if created.key.as_ref() != Some(&self.key) {
                    return false;
                }
                self.contract = Some(created.clone());
                true
            }
            Event::Archived(archived) => {
                if self
                    .contract
                    .as_ref()
                    .is_some_and(|c| c.contract_id == archived.contract_id)
                {
                    self.contract = None;
                }
                true
            }
        }
    }

    fn state(&self) -> Self::State {
        self.contract.clone()
    }
}

/// Active contracts for a list of keys, by position.
///
/// Repeated keys are separate positions that always hold the same contract.
#[derive(Debug, Clone)]
pub struct KeysView {
    keys: Vec<Value>,
    contracts: Vec<Option<CreateEvent>>,
}

impl KeysView {
    pub fn new(keys: Vec<Value>) -> Self {
        let contracts = vec![None; keys.len()];
        Self { keys, contracts }
    }
}

impl View for KeysView {
    type State = Vec<Option<CreateEvent>>;

    fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::Created(created) => {
                let Some(key) = created.key.as_ref() else {
                    return false;
                };
                let mut matched = false;
                for (slot, wanted) in self.contracts.iter_mut().zip(&self.keys) {
                    if wanted == key {
                        *slot = Some(created.clone());
                        matched = true;
                    }
                }
                matched
            }
            Event::Archived(archived) => {
                for slot in self.contracts.iter_mut() {
                    if slot
                        .as_ref()
                        .is_some_and(|c| c.contract_id == archived.contract_id)
                    {
                        *slot = None;
                    }
                }
                true
            }
        }
    }

    fn state(&self) -> Self::State {
        self.contracts.clone()
    }
}
