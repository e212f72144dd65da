//! Group controls: a fixed map of named child controls.

use std::ops::Deref;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use super::{keep_first, Control, ControlOptions, Members};
use crate::error::{FormError, Result};
use crate::tree::ControlKind;

/// A control whose value is the key-wise map of its children's values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupControl(Control);

impl GroupControl {
    /// Build a group over `controls`. Every control becomes a tree child.
    pub fn new<I, K>(controls: I) -> Self
    where
        I: IntoIterator<Item = (K, Control)>,
        K: Into<String>,
    {
        let group = Self::unready(controls);
        group.ready_empty();
        group
    }

    /// Build a group with its own executors.
    pub fn with_options<I, K>(controls: I, options: ControlOptions) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Control)>,
        K: Into<String>,
    {
        Self::unready(controls).0.finish(options).map(Self)
    }

    pub(crate) fn unready<I, K>(controls: I) -> Self
    where
        I: IntoIterator<Item = (K, Control)>,
        K: Into<String>,
    {
        let controls: IndexMap<String, Control> = controls
            .into_iter()
            .map(|(name, control)| (name.into(), control))
            .collect();
        let value = Value::Object(
            controls
                .iter()
                .map(|(name, control)| (name.clone(), control.value()))
                .collect(),
        );

        let group = Control::create(
            ControlKind::Group,
            value,
            Members::Group(RwLock::new(controls.clone())),
        );
        for control in controls.values() {
            group.adopt(control);
        }
        Self(group)
    }

    pub(super) fn from_control(control: Control) -> Option<Self> {
        (control.kind() == ControlKind::Group).then_some(Self(control))
    }

    pub fn into_control(self) -> Control {
        self.0
    }

    /// The named controls, in insertion order.
    pub fn controls(&self) -> IndexMap<String, Control> {
        self.0.group_entries().into_iter().collect()
    }

    pub fn control(&self, name: &str) -> Option<Control> {
        self.0.group_member(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.group_member(name).is_some()
    }

    /// Add a control after construction.
    ///
    /// The control always contributes to the group's value. Only when
    /// `is_child` is set does it become a tree child, taking part in
    /// disabled propagation and status aggregation; otherwise the group
    /// only follows its value. A control already registered under `name`
    /// is disposed.
    pub fn add_control(
        &self,
        name: impl Into<String>,
        control: Control,
        is_child: bool,
    ) -> Result<()> {
        self.ensure_live()?;
        let name = name.into();
        let previous = self.map()?.write().insert(name.clone(), control.clone());
        let readded = previous.as_ref() == Some(&control);
        if let Some(previous) = previous.filter(|previous| *previous != control) {
            previous.dispose();
        }
        if is_child {
            self.adopt(&control);
        } else if !readded {
            self.follow_value(&control);
        }
        tracing::debug!(group = %self.id(), control = %control.id(), %name, is_child, "added control");
        self.update();
        Ok(())
    }

    /// Remove and dispose a control. Returns whether it existed.
    pub fn remove_control(&self, name: &str) -> Result<bool> {
        self.ensure_live()?;
        let removed = self.map()?.write().shift_remove(name);
        let Some(removed) = removed else {
            return Ok(false);
        };
        tracing::debug!(group = %self.id(), control = %removed.id(), %name, "removed control");
        removed.dispose();
        self.update();
        Ok(true)
    }

    /// Keep `control` as a tree child that is not part of the value.
    ///
    /// Used for items such as headings placed between fields.
    pub fn attach(&self, control: Control) -> Result<()> {
        self.ensure_live()?;
        self.0.node.attached.write().push(control.clone());
        self.adopt(&control);
        self.update();
        Ok(())
    }

    /// Controls kept through [`attach`](Self::attach).
    pub fn attached(&self) -> Vec<Control> {
        self.0.node.attached.read().clone()
    }

    /// Update the group whenever `member` publishes a value. The callback
    /// goes away with the member's signals when it is disposed.
    fn follow_value(&self, member: &Control) {
        let group = self.0.downgrade();
        member.node.facets.value.subscribe(move |_| {
            if let Some(group) = group.upgrade() {
                group.update();
            }
        });
    }

    fn map(&self) -> Result<&RwLock<IndexMap<String, Control>>> {
        match &self.0.node.members {
            Members::Group(controls) => Ok(controls),
            _ => Err(self.unsupported("group")),
        }
    }
}

impl Deref for GroupControl {
    type Target = Control;

    fn deref(&self) -> &Control {
        &self.0
    }
}

impl From<GroupControl> for Control {
    fn from(group: GroupControl) -> Self {
        group.0
    }
}

impl Control {
    fn group_member(&self, name: &str) -> Option<Control> {
        match &self.node.members {
            Members::Group(controls) => controls.read().get(name).cloned(),
            _ => None,
        }
    }
}

fn expect_object(value: Value) -> Result<serde_json::Map<String, Value>> {
    match value {
        Value::Object(entries) => Ok(entries),
        other => Err(FormError::invalid_value("object", &other)),
    }
}

/// Fan a value out to the children by key.
///
/// Unknown keys are ignored and missing keys leave their child alone. A
/// patch recurses with `patch_value` so nested siblings are preserved.
pub(super) fn assign(group: &Control, value: Value, patch: bool) -> Result<()> {
    let entries = expect_object(value)?;

    let mut fault = None;
    for (name, value) in entries {
        let Some(child) = group.group_member(&name) else {
            continue;
        };
        let result = if patch {
            child.patch_value(value)
        } else {
            child.set_value(value)
        };
        keep_first(&mut fault, result);
    }

    group.mark_changed();
    keep_first(&mut fault, group.settle());
    fault.map_or(Ok(()), Err)
}

/// Reset every child, handing each its entry of `value` if there is one.
pub(super) fn reset(group: &Control, value: Option<Value>) -> Result<()> {
    let mut entries = value.map(expect_object).transpose()?.unwrap_or_default();

    let mut fault = None;
    for (name, child) in group.group_entries() {
        keep_first(&mut fault, child.reset(entries.remove(&name)));
    }

    group.mark_restored();
    keep_first(&mut fault, group.settle());
    fault.map_or(Ok(()), Err)
}
