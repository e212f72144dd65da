//! Walks a config tree and builds controls.

use std::sync::Arc;

use serde_json::Value;

use super::config::ControlConfig;
use super::registry::Registry;
use crate::control::{ArrayControl, ArrayFactory, Control, GroupControl};
use crate::error::{FormError, Result};
use crate::tree::ControlKind;

/// Turns [`ControlConfig`] trees into ready controls.
///
/// Controls are built bottom-up: each one is created unready, its
/// executors are resolved against it and installed, and it is marked ready
/// only once all of its children are. Items inside a group are attached to
/// it as tree children outside the group's value.
#[derive(Debug, Clone, Copy)]
pub struct FormBuilder<'r> {
    registry: &'r Registry,
}

impl<'r> FormBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Build the control tree described by `config`.
    ///
    /// Structural problems are reported before anything is built. If an
    /// executor faults while its control settles, the first fault is
    /// returned.
    pub fn build(&self, config: &ControlConfig) -> Result<Control> {
        check(config, true)?;

        let mut fault = None;
        let control = self.build_node(config, None, &mut fault);
        match fault {
            Some(err) => Err(err),
            None => Ok(control),
        }
    }

    /// Build a node whose structure has been checked.
    fn build_node(
        &self,
        config: &ControlConfig,
        seed: Option<&Value>,
        fault: &mut Option<FormError>,
    ) -> Control {
        let seed = seed.or(config.value.as_ref());
        let control = match config.classify() {
            ControlKind::Item => Control::unready_item(),
            ControlKind::Field => Control::unready_field(seed.cloned().unwrap_or(Value::Null)),
            ControlKind::Group => self.build_group(config, seed, fault).into_control(),
            ControlKind::Array => self.build_array(config, seed).into_control(),
        };

        control.install(self.registry.options_for(config, &control));
        if let Some(resolver) = self.registry.resolver_for(config, &control) {
            control.set_search_resolver(resolver);
        }
        if let Err(err) = control.mark_ready() {
            tracing::error!(control = %control.id(), error = %err, "control settled with a fault");
            fault.get_or_insert(err);
        }
        control
    }

    fn build_group(
        &self,
        config: &ControlConfig,
        seed: Option<&Value>,
        fault: &mut Option<FormError>,
    ) -> GroupControl {
        let seed = seed.filter(|seed| expect_shape(config, seed, "object", Value::is_object));

        let mut members = Vec::new();
        let mut attached = Vec::new();
        for field in &config.fields {
            let child_seed = field
                .name
                .as_deref()
                .and_then(|name| seed.and_then(|seed| seed.get(name)));
            let child = self.build_node(field, child_seed, fault);
            match (&field.name, child.kind()) {
                (Some(name), kind) if kind.has_value() => members.push((name.clone(), child)),
                _ => attached.push(child),
            }
        }

        let group = GroupControl::unready(members);
        for child in attached {
            if let Err(err) = group.attach(child) {
                fault.get_or_insert(err);
            }
        }
        group
    }

    fn build_array(&self, config: &ControlConfig, seed: Option<&Value>) -> ArrayControl {
        let values = match seed {
            Some(Value::Array(values)) => values.clone(),
            Some(seed) => {
                expect_shape(config, seed, "array", Value::is_array);
                Vec::new()
            }
            None => Vec::new(),
        };

        let registry = self.registry.clone();
        let element = config.element();
        let factory: ArrayFactory = Arc::new(move |value: Option<&Value>| {
            let mut fault = None;
            let control = FormBuilder::new(&registry).build_node(&element, value, &mut fault);
            if let Some(err) = fault {
                tracing::error!(control = %control.id(), error = %err, "array element settled with a fault");
            }
            control
        });
        ArrayControl::unready(factory, values)
    }
}

/// Log and reject a default value of the wrong shape.
fn expect_shape(
    config: &ControlConfig,
    seed: &Value,
    expected: &'static str,
    matches: fn(&Value) -> bool,
) -> bool {
    if matches(seed) {
        return true;
    }
    tracing::warn!(
        name = config.name.as_deref().unwrap_or_default(),
        error = %FormError::invalid_value(expected, seed),
        "ignoring default value"
    );
    false
}

/// Reject config trees that cannot be built.
fn check(config: &ControlConfig, is_root: bool) -> Result<()> {
    let label = config.name.as_deref().unwrap_or(config.kind.as_str());
    match config.classify() {
        ControlKind::Array if config.fields.is_empty() => {
            return Err(FormError::Config(format!("array `{label}` declares no fields")));
        }
        ControlKind::Array | ControlKind::Group if !is_root && config.name.is_none() => {
            return Err(FormError::Config(format!(
                "nested {} `{label}` needs a name",
                config.classify()
            )));
        }
        _ => {}
    }
    config.fields.iter().try_for_each(|field| check(field, false))
}
