//! Array controls: an ordered, resizable list of child controls.
//!
//! Children are created by a factory from an element value. Bulk value
//! assignment (`set_value`, `patch_value`, `reset`) always rebuilds the
//! children through the factory, so child-local state such as `touched` is
//! lost. The structural edits (`push`, `insert_at`, `remove_at`, ...) keep
//! every untouched sibling as it is.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::{keep_first, Control, ControlOptions, Members};
use crate::error::{FormError, Result};
use crate::tree::ControlKind;

/// Builds one array element from its value, or from nothing for a blank
/// element.
pub type ArrayFactory = Arc<dyn Fn(Option<&Value>) -> Control + Send + Sync>;

/// A control whose value is the ordered list of its children's values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArrayControl(Control);

impl ArrayControl {
    /// Build an array with one child per value.
    pub fn new<F>(factory: F, values: Vec<Value>) -> Self
    where
        F: Fn(Option<&Value>) -> Control + Send + Sync + 'static,
    {
        let array = Self::unready(Arc::new(factory), values);
        array.ready_empty();
        array
    }

    /// Build an array with its own executors.
    pub fn with_options<F>(factory: F, values: Vec<Value>, options: ControlOptions) -> Result<Self>
    where
        F: Fn(Option<&Value>) -> Control + Send + Sync + 'static,
    {
        Self::unready(Arc::new(factory), values)
            .0
            .finish(options)
            .map(Self)
    }

    pub(crate) fn unready(factory: ArrayFactory, values: Vec<Value>) -> Self {
        let controls: Vec<Control> = values.iter().map(|value| factory(Some(value))).collect();
        let array = Control::create(
            ControlKind::Array,
            Value::Array(values),
            Members::Array {
                factory,
                controls: RwLock::new(controls.clone()),
            },
        );
        for control in &controls {
            array.adopt(control);
        }
        Self(array)
    }

    pub(super) fn from_control(control: Control) -> Option<Self> {
        (control.kind() == ControlKind::Array).then_some(Self(control))
    }

    pub fn into_control(self) -> Control {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.array_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, index: usize) -> Option<Control> {
        self.0.array_entries().get(index).cloned()
    }

    pub fn controls(&self) -> Vec<Control> {
        self.0.array_entries()
    }

    pub fn push(&self, control: Control) -> Result<()> {
        self.insert_at(self.len(), [control])
    }

    /// Append an element built by the factory.
    pub fn push_value(&self, value: Value) -> Result<()> {
        self.insert_values_at(self.len(), [value])
    }

    /// Remove the last element and return its value.
    pub fn pop(&self) -> Result<Option<Value>> {
        match self.len() {
            0 => {
                self.ensure_live()?;
                Ok(None)
            }
            len => self.remove_at(len - 1).map(Some),
        }
    }

    pub fn unshift(&self, control: Control) -> Result<()> {
        self.insert_at(0, [control])
    }

    pub fn unshift_value(&self, value: Value) -> Result<()> {
        self.insert_values_at(0, [value])
    }

    /// Insert controls before `index`. `index == len` appends.
    pub fn insert_at<I>(&self, index: usize, controls: I) -> Result<()>
    where
        I: IntoIterator<Item = Control>,
    {
        self.ensure_live()?;
        let (_, slots) = self.0.array_storage()?;
        let added: Vec<Control> = controls.into_iter().collect();
        {
            let mut list = slots.write();
            check_insert(index, list.len())?;
            list.splice(index..index, added.iter().cloned());
        }

        for control in &added {
            self.adopt(control);
        }
        tracing::debug!(array = %self.id(), index, count = added.len(), "inserted controls");
        self.update();
        Ok(())
    }

    /// Insert elements built by the factory before `index`.
    pub fn insert_values_at<I>(&self, index: usize, values: I) -> Result<()>
    where
        I: IntoIterator<Item = Value>,
    {
        self.ensure_live()?;
        let (factory, _) = self.0.array_storage()?;
        check_insert(index, self.len())?;
        let controls: Vec<Control> = values
            .into_iter()
            .map(|value| factory(Some(&value)))
            .collect();
        self.insert_at(index, controls)
    }

    /// Remove and dispose the element at `index`, returning its last value.
    pub fn remove_at(&self, index: usize) -> Result<Value> {
        self.ensure_live()?;
        let (_, slots) = self.0.array_storage()?;
        let removed = {
            let mut list = slots.write();
            if index >= list.len() {
                return Err(FormError::IndexOutOfBounds {
                    index,
                    len: list.len(),
                });
            }
            list.remove(index)
        };

        let value = removed.value();
        tracing::debug!(array = %self.id(), index, control = %removed.id(), "removed control");
        removed.dispose();
        self.update();
        Ok(value)
    }

    /// Remove and dispose every element.
    pub fn clear(&self) -> Result<()> {
        self.ensure_live()?;
        let (_, slots) = self.0.array_storage()?;
        let removed: Vec<Control> = slots.write().drain(..).collect();
        for control in &removed {
            control.dispose();
        }
        self.update();
        Ok(())
    }

    /// Rebuild the array with `len` elements, seeding each from the current
    /// value at its index.
    pub fn resize(&self, len: usize) -> Result<()> {
        self.ensure_live()?;
        let current: Vec<Value> = self.controls().iter().map(Control::value).collect();
        self.0.rebuild(len, &current)
    }
}

impl Deref for ArrayControl {
    type Target = Control;

    fn deref(&self) -> &Control {
        &self.0
    }
}

impl From<ArrayControl> for Control {
    fn from(array: ArrayControl) -> Self {
        array.0
    }
}

fn check_insert(index: usize, len: usize) -> Result<()> {
    if index > len {
        return Err(FormError::IndexOutOfBounds { index, len });
    }
    Ok(())
}

fn expect_array(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(values) => Ok(values),
        other => Err(FormError::invalid_value("array", &other)),
    }
}

impl Control {
    fn array_storage(&self) -> Result<(&ArrayFactory, &RwLock<Vec<Control>>)> {
        match &self.node.members {
            Members::Array { factory, controls } => Ok((factory, controls)),
            _ => Err(self.unsupported("array")),
        }
    }

    /// Replace every child with `len` fresh ones built from `seed`.
    fn rebuild(&self, len: usize, seed: &[Value]) -> Result<()> {
        let (factory, slots) = self.array_storage()?;
        let fresh: Vec<Control> = (0..len).map(|i| factory(seed.get(i))).collect();
        let stale: Vec<Control> = std::mem::replace(&mut *slots.write(), fresh.clone());

        for control in &fresh {
            self.adopt(control);
        }
        for control in &stale {
            control.dispose();
        }
        tracing::debug!(array = %self.id(), len, "rebuilt array");
        self.update();
        Ok(())
    }
}

/// Rebuild to the value's length, then hand each element to its child.
pub(super) fn assign(array: &Control, value: Value, patch: bool) -> Result<()> {
    let values = expect_array(value)?;
    let current: Vec<Value> = array.array_entries().iter().map(Control::value).collect();
    array.rebuild(values.len(), &current)?;

    let mut fault = None;
    for (child, value) in array.array_entries().into_iter().zip(values) {
        let result = if patch {
            child.patch_value(value)
        } else {
            child.set_value(value)
        };
        keep_first(&mut fault, result);
    }

    array.mark_changed();
    keep_first(&mut fault, array.settle());
    fault.map_or(Ok(()), Err)
}

/// Rebuild from the initial value, which `value` replaces if given.
pub(super) fn reset(array: &Control, value: Option<Value>) -> Result<()> {
    let initial = match value {
        Some(value) => {
            let values = expect_array(value)?;
            array.node.flags.write().initial_value = Value::Array(values.clone());
            values
        }
        None => match array.initial_value() {
            Value::Array(values) => values,
            _ => Vec::new(),
        },
    };
    array.rebuild(initial.len(), &initial)?;

    let mut fault = None;
    for (child, value) in array.array_entries().into_iter().zip(initial) {
        keep_first(&mut fault, child.reset(Some(value)));
    }

    array.mark_restored();
    keep_first(&mut fault, array.settle());
    fault.map_or(Ok(()), Err)
}
