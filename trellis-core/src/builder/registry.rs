//! Named executor factories.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::config::{ControlConfig, ExecutorRef};
use crate::control::{Control, ControlOptions};
use crate::executor::{Disabler, Extraer, Hinter, Messager, Trigger, Validator};
use crate::search::SearchResolver;

/// Builds one executor for a control from the reference's params.
///
/// Returning `None` contributes nothing.
pub type Factory<T> = Arc<dyn Fn(&ControlConfig, &Control, &Value) -> Option<T> + Send + Sync>;

type Table<T> = HashMap<String, Factory<T>>;

/// Lookup tables the builder resolves config references against.
#[derive(Clone, Default)]
pub struct Registry {
    hints: Table<Hinter>,
    extras: Table<Extraer>,
    messagers: Table<Messager>,
    triggers: Table<Trigger>,
    disablers: Table<Disabler>,
    validators: Table<Validator>,
    search: Table<Arc<dyn SearchResolver>>,
}

macro_rules! registration {
    ($(#[$doc:meta])* $method:ident, $table:ident, $executor:ty) => {
        $(#[$doc])*
        pub fn $method<F>(mut self, name: impl Into<String>, factory: F) -> Self
        where
            F: Fn(&ControlConfig, &Control, &Value) -> Option<$executor> + Send + Sync + 'static,
        {
            self.$table.insert(name.into(), Arc::new(factory));
            self
        }
    };
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    registration!(with_hint, hints, Hinter);
    registration!(with_extra, extras, Extraer);
    registration!(with_messager, messagers, Messager);
    registration!(with_trigger, triggers, Trigger);
    registration!(with_disabler, disablers, Disabler);
    registration!(with_validator, validators, Validator);
    registration!(
        /// Register a search resolver, attached to controls naming it under
        /// `search`.
        with_search,
        search,
        Arc<dyn SearchResolver>
    );

    /// Resolve every executor reference of `config` against `control`.
    pub(crate) fn options_for(&self, config: &ControlConfig, control: &Control) -> ControlOptions {
        let mut options = ControlOptions::new().disabled(config.disabled);
        for hinter in resolve(&self.hints, "hints", &config.hints, config, control) {
            options = options.hinter(hinter);
        }
        for extraer in resolve(&self.extras, "extras", &config.extras, config, control) {
            options = options.extraer(extraer);
        }
        for messager in resolve(&self.messagers, "messagers", &config.messagers, config, control) {
            options = options.messager(messager);
        }
        for trigger in resolve(&self.triggers, "triggers", &config.triggers, config, control) {
            options = options.trigger(trigger);
        }
        for disabler in resolve(&self.disablers, "disablers", &config.disablers, config, control) {
            options = options.disabler(disabler);
        }
        for validator in resolve(&self.validators, "validators", &config.validators, config, control) {
            options = options.validator(validator);
        }
        options
    }

    pub(crate) fn resolver_for(
        &self,
        config: &ControlConfig,
        control: &Control,
    ) -> Option<Arc<dyn SearchResolver>> {
        let reference = config.search.as_ref()?;
        resolve(&self.search, "search", std::slice::from_ref(reference), config, control)
            .into_iter()
            .next()
    }
}

fn resolve<T>(
    table: &Table<T>,
    family: &'static str,
    references: &[ExecutorRef],
    config: &ControlConfig,
    control: &Control,
) -> Vec<T> {
    references
        .iter()
        .filter_map(|reference| {
            let Some(factory) = table.get(&reference.name) else {
                tracing::warn!(family, name = %reference.name, control = %control.id(), "unknown registry name, skipping");
                return None;
            };
            let executor = factory(config, control, &reference.params);
            if executor.is_none() {
                tracing::trace!(family, name = %reference.name, "registry entry declined");
            }
            executor
        })
        .collect()
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn names<T>(table: &Table<T>) -> Vec<&str> {
            let mut names: Vec<&str> = table.keys().map(String::as_str).collect();
            names.sort_unstable();
            names
        }

        f.debug_struct("Registry")
            .field("hints", &names(&self.hints))
            .field("extras", &names(&self.extras))
            .field("messagers", &names(&self.messagers))
            .field("triggers", &names(&self.triggers))
            .field("disablers", &names(&self.disablers))
            .field("validators", &names(&self.validators))
            .field("search", &names(&self.search))
            .finish()
    }
}
