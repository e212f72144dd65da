//! Field behaviour: value, validation, triggers, disablers and the update
//! protocol shared by every control that holds a value.
//!
//! # Update protocol
//!
//! [`Control::update`] recomputes a node from its own flags and its children,
//! publishes the combined state, then updates the parent. The effective
//! disabled flag is pulled from the parent on every update. When it flips,
//! every descendant re-pulls it in parent-first order and any validation
//! deferred while disabled is resumed.

use serde_json::Value;

use super::{array, group, Control, ControlOptions, Members};
use crate::error::{FormError, Result};
use crate::executor::{any_true, merge_messages, Disabler, Trigger, Validator};
use crate::reactive::Completion;
use crate::tree::{ControlKind, Tree};

impl Control {
    /// Create a field holding `value`.
    pub fn field(value: Value) -> Control {
        let control = Self::create(ControlKind::Field, value, Members::Leaf);
        control.ready_empty();
        control
    }

    /// Create a field with executors.
    pub fn field_with(value: Value, options: ControlOptions) -> Result<Control> {
        Self::create(ControlKind::Field, value, Members::Leaf).finish(options)
    }

    /// Create a field that is not ready yet.
    pub(crate) fn unready_field(value: Value) -> Control {
        Self::create(ControlKind::Field, value, Members::Leaf)
    }

    /// Create an item that is not ready yet.
    pub(crate) fn unready_item() -> Control {
        Self::create(ControlKind::Item, Value::Null, Members::Leaf)
    }

    // ------------------------------------------------------------------
    // Value
    // ------------------------------------------------------------------

    /// Replace the value.
    ///
    /// Marks the control dirty and touched, then revalidates, reruns
    /// triggers and updates the tree. Groups fan the value out to their
    /// children by key; arrays rebuild their children to match its length.
    pub fn set_value(&self, value: Value) -> Result<()> {
        self.ensure_live()?;
        match self.kind() {
            ControlKind::Item => Err(self.unsupported("set_value")),
            ControlKind::Field => self.assign(value),
            ControlKind::Group => group::assign(self, value, false),
            ControlKind::Array => array::assign(self, value, false),
        }
    }

    /// Apply a partial value.
    ///
    /// Same as [`set_value`](Self::set_value) for fields and arrays. Groups
    /// only touch the keys present, recursing with `patch_value`.
    pub fn patch_value(&self, value: Value) -> Result<()> {
        self.ensure_live()?;
        match self.kind() {
            ControlKind::Item => Err(self.unsupported("patch_value")),
            ControlKind::Field => self.assign(value),
            ControlKind::Group => group::assign(self, value, true),
            ControlKind::Array => array::assign(self, value, true),
        }
    }

    /// Restore the initial value and clear dirty and touched.
    ///
    /// A supplied value becomes the new initial value first.
    pub fn reset(&self, value: Option<Value>) -> Result<()> {
        self.ensure_live()?;
        match self.kind() {
            ControlKind::Item => Err(self.unsupported("reset")),
            ControlKind::Field => {
                let initial = {
                    let mut flags = self.node.flags.write();
                    if let Some(value) = value {
                        flags.initial_value = value;
                    }
                    flags.own_dirty = false;
                    flags.own_touched = false;
                    flags.initial_value.clone()
                };
                self.node.facets.value.set(initial);
                self.settle()
            }
            ControlKind::Group => group::reset(self, value),
            ControlKind::Array => array::reset(self, value),
        }
    }

    fn assign(&self, value: Value) -> Result<()> {
        self.mark_changed();
        self.node.facets.value.set(value);
        self.settle()
    }

    /// Set the own dirty and touched flags without updating.
    pub(super) fn mark_changed(&self) {
        let mut flags = self.node.flags.write();
        flags.own_dirty = true;
        flags.own_touched = true;
    }

    /// Clear the own dirty and touched flags without updating.
    pub(super) fn mark_restored(&self) {
        let mut flags = self.node.flags.write();
        flags.own_dirty = false;
        flags.own_touched = false;
    }

    /// Revalidate, rerun triggers and update, after a value change.
    pub(super) fn settle(&self) -> Result<()> {
        let validated = self.validate();
        let triggered = self.trigger();
        self.update();
        validated.and(triggered)
    }

    pub(super) fn unsupported(&self, op: &'static str) -> FormError {
        FormError::Unsupported {
            op,
            kind: self.kind(),
        }
    }

    // ------------------------------------------------------------------
    // Status flags
    // ------------------------------------------------------------------

    pub fn mark_dirty(&self) -> Result<()> {
        self.set_flag(|flags| flags.own_dirty = true)
    }

    pub fn mark_touched(&self) -> Result<()> {
        self.set_flag(|flags| flags.own_touched = true)
    }

    /// Clear dirty on this control and every owned control.
    pub fn mark_pristine(&self) -> Result<()> {
        for child in self.owned_controls() {
            child.mark_pristine()?;
        }
        self.set_flag(|flags| flags.own_dirty = false)
    }

    /// Clear touched on this control and every owned control.
    pub fn mark_untouched(&self) -> Result<()> {
        for child in self.owned_controls() {
            child.mark_untouched()?;
        }
        self.set_flag(|flags| flags.own_touched = false)
    }

    /// Set the control's own disabled flag.
    ///
    /// The effective flag stays true while an ancestor is disabled. A
    /// disabler emission overwrites the own flag.
    pub fn set_disabled(&self, disabled: bool) -> Result<()> {
        self.set_flag(|flags| flags.own_disabled = disabled)
    }

    pub fn disable(&self) -> Result<()> {
        self.set_disabled(true)
    }

    pub fn enable(&self) -> Result<()> {
        self.set_disabled(false)
    }

    fn set_flag(&self, apply: impl FnOnce(&mut super::Flags)) -> Result<()> {
        self.ensure_live()?;
        if !self.kind().has_value() {
            return Ok(());
        }
        apply(&mut *self.node.flags.write());
        self.update();
        Ok(())
    }

    fn owned_controls(&self) -> Vec<Control> {
        match self.kind() {
            ControlKind::Group => self.group_entries().into_iter().map(|(_, c)| c).collect(),
            ControlKind::Array => self.array_entries(),
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Executors
    // ------------------------------------------------------------------

    /// Replace the validators and revalidate.
    pub fn set_validators(&self, validators: Vec<Validator>) -> Result<()> {
        self.ensure_live()?;
        self.require_value("set_validators")?;
        self.node.behaviors.validators.replace(validators);
        self.validate()
    }

    /// Replace the triggers and run them, cancelling any run in flight.
    pub fn set_triggers(&self, triggers: Vec<Trigger>) -> Result<()> {
        self.ensure_live()?;
        self.require_value("set_triggers")?;
        self.node.behaviors.triggers.replace(triggers);
        self.trigger()
    }

    /// Replace the disablers and restart the disablers pipeline.
    pub fn set_disablers(&self, disablers: Vec<Disabler>) -> Result<()> {
        self.ensure_live()?;
        self.require_value("set_disablers")?;
        self.node.behaviors.disablers.replace(disablers);
        self.update_disablers()
    }

    fn require_value(&self, op: &'static str) -> Result<()> {
        if self.kind().has_value() {
            Ok(())
        } else {
            Err(self.unsupported(op))
        }
    }

    /// Run the validators.
    ///
    /// Cancels any run in flight. While the control is disabled or not ready
    /// the request is recorded and replayed once it becomes enabled and
    /// ready. The first combined emission of the validators becomes
    /// `errors`; later emissions of the same run are ignored.
    pub fn validate(&self) -> Result<()> {
        self.ensure_live()?;
        if !self.kind().has_value() {
            return Ok(());
        }

        let validators = &self.node.behaviors.validators;
        validators.pipeline.stop();
        let deferred = {
            let mut flags = self.node.flags.write();
            if !flags.ready || self.node.facets.disabled.get() {
                flags.validation_deferred = true;
                Some(std::mem::replace(&mut flags.own_pending, false))
            } else {
                flags.validation_deferred = false;
                flags.own_pending = true;
                None
            }
        };
        if let Some(was_pending) = deferred {
            // The stopped run can no longer clear pending.
            if was_pending {
                self.update();
            }
            return Ok(());
        }
        self.node.facets.pending.set_if_changed(true);

        let result = self.run_slot(validators, Completion::FirstEmission, |control, entries| {
            control.node.flags.write().own_pending = false;
            control.node.facets.errors.set_if_changed(merge_messages(entries));
            control.update();
        });

        if self.node.flags.read().own_pending {
            self.update();
        }
        result
    }

    /// Run the triggers once. Their output is discarded.
    pub fn trigger(&self) -> Result<()> {
        self.ensure_live()?;
        if !self.kind().has_value() || !self.is_ready() {
            return Ok(());
        }
        let triggers = &self.node.behaviors.triggers;
        if triggers.is_empty() {
            triggers.pipeline.stop();
            return Ok(());
        }
        self.run_slot(triggers, Completion::FirstEmission, |control, _| {
            tracing::trace!(control = %control.id(), "triggers settled");
        })
    }

    /// Restart the disablers pipeline.
    ///
    /// Any true disabler disables the control. With no disablers installed
    /// the own disabled flag is left alone.
    pub fn update_disablers(&self) -> Result<()> {
        self.ensure_live()?;
        if !self.kind().has_value() || !self.is_ready() {
            return Ok(());
        }
        let disablers = &self.node.behaviors.disablers;
        if disablers.is_empty() {
            disablers.pipeline.stop();
            return Ok(());
        }
        self.run_slot(disablers, Completion::Continuous, |control, verdicts| {
            control.node.flags.write().own_disabled = any_true(verdicts);
            control.update();
        })
    }

    // ------------------------------------------------------------------
    // Update protocol
    // ------------------------------------------------------------------

    /// Recompute this control's derived state, then update the parent.
    ///
    /// Does nothing before the control is ready or after it is disposed.
    pub fn update(&self) {
        {
            let flags = self.node.flags.read();
            if !flags.ready || flags.disposed {
                return;
            }
        }

        self.refresh_aggregates();
        let flipped = self.refresh_disabled();
        self.publish_state();

        if flipped {
            self.propagate_disabled();
            self.resume_validation();
        }

        if let Some(parent) = self.parent() {
            parent.update();
        }
    }

    /// Recompute value and status from own flags and children.
    fn refresh_aggregates(&self) {
        if !self.kind().has_value() {
            return;
        }

        let (mut dirty, mut touched, mut pending) = {
            let flags = self.node.flags.read();
            (flags.own_dirty, flags.own_touched, flags.own_pending)
        };
        let mut children_valid = true;

        if let Some(value) = self.composite_value() {
            self.node.facets.value.set_if_changed(value);
            for child in self.children() {
                dirty |= child.dirty();
                touched |= child.touched();
                pending |= child.pending();
                children_valid &= child.valid();
            }
        }

        let facets = &self.node.facets;
        let valid = facets.errors.with(Option::is_none) && children_valid;
        facets.dirty.set_if_changed(dirty);
        facets.touched.set_if_changed(touched);
        facets.pending.set_if_changed(pending);
        facets.valid.set_if_changed(valid);
    }

    /// Pull the parent's disabled flag. Returns whether the effective flag
    /// changed.
    pub(super) fn refresh_disabled(&self) -> bool {
        if !self.kind().has_value() {
            return false;
        }
        let own = self.node.flags.read().own_disabled;
        let inherited = self.parent().map(|parent| parent.disabled()).unwrap_or(false);
        self.node.facets.disabled.set_if_changed(own || inherited)
    }

    /// Make every descendant re-pull its disabled flag, parents first.
    pub(super) fn propagate_disabled(&self) {
        for id in Tree::descendants(self.id()) {
            let Some(descendant) = Tree::lookup(id) else {
                continue;
            };
            if !descendant.is_ready() || descendant.is_disposed() {
                continue;
            }
            if descendant.refresh_disabled() {
                descendant.publish_state();
                descendant.resume_validation();
            }
        }
    }

    /// Run a validation that was deferred while disabled.
    fn resume_validation(&self) {
        if self.disabled() || !self.node.flags.read().validation_deferred {
            return;
        }
        if let Err(err) = self.validate() {
            tracing::debug!(control = %self.id(), error = %err, "deferred validation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{GroupControl, Message, Messages};
    use crate::executor::{self, Output};
    use futures_util::{FutureExt, StreamExt};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn required() -> Validator {
        executor::from_fn(|control: &Control| {
            if control.value() == "" {
                Some(Message::keyed("required", "required"))
            } else {
                None
            }
        })
    }

    #[test]
    fn set_value_round_trips_and_marks_changed() {
        let field = Control::field(json!("x"));
        assert!(!field.dirty());
        assert!(!field.touched());

        field.set_value(json!({"nested": [1, 2]})).unwrap();

        assert_eq!(field.value(), json!({"nested": [1, 2]}));
        assert!(field.dirty());
        assert!(field.touched());
        assert_eq!(field.state().value, json!({"nested": [1, 2]}));
    }

    #[test]
    fn required_validator_drives_errors_and_valid() {
        let field =
            Control::field_with(json!("start"), ControlOptions::new().validator(required()))
                .unwrap();
        assert!(field.valid());

        field.set_value(json!("")).unwrap();
        assert_eq!(field.errors(), Some(Message::keyed("required", "required")));
        assert!(!field.valid());

        field.set_value(json!("ok")).unwrap();
        assert_eq!(field.errors(), None);
        assert!(field.valid());
    }

    #[test]
    fn reset_restores_initial_value() {
        let field = Control::field(json!("a"));
        field.set_value(json!("b")).unwrap();

        field.reset(None).unwrap();
        let first = (field.value(), field.dirty(), field.touched());
        field.reset(None).unwrap();
        let second = (field.value(), field.dirty(), field.touched());

        assert_eq!(first, (json!("a"), false, false));
        assert_eq!(first, second);
    }

    #[test]
    fn reset_with_value_rebinds_initial() {
        let field = Control::field(json!("a"));
        field.reset(Some(json!("z"))).unwrap();
        assert_eq!(field.value(), json!("z"));
        assert_eq!(field.initial_value(), json!("z"));

        field.set_value(json!("q")).unwrap();
        field.reset(None).unwrap();
        assert_eq!(field.value(), json!("z"));
    }

    #[test]
    fn triggers_run_on_value_change() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let field = Control::field_with(
            json!(0),
            ControlOptions::new().trigger(executor::from_fn(move |_: &Control| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        field.set_value(json!(1)).unwrap();
        field.patch_value(json!(2)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn replacing_triggers_cancels_run_in_flight() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let (waiting, done) = (gate.clone(), finished.clone());
        let slow = executor::from_future(move |_: &Control| {
            let (waiting, done) = (waiting.clone(), done.clone());
            async move {
                waiting.notified().await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let field = Control::field_with(json!(0), ControlOptions::new().trigger(slow)).unwrap();
        field.set_value(json!(1)).unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        field
            .set_triggers(vec![executor::from_fn(move |_: &Control| {
                counter.fetch_add(1, Ordering::SeqCst);
            })])
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        gate.notify_one();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        field.set_triggers(vec![]).unwrap();
        field.set_value(json!(2)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disablers_any_true_wins() {
        let field = Control::field_with(
            json!(0),
            ControlOptions::new()
                .disabler(executor::from_fn(|_: &Control| false))
                .disabler(executor::from_fn(|_: &Control| true)),
        )
        .unwrap();
        assert!(field.disabled());

        field
            .set_disablers(vec![executor::from_fn(|_: &Control| false)])
            .unwrap();
        assert!(field.enabled());
    }

    #[test]
    fn parent_disabled_forces_children() {
        let a = Control::field(json!(1));
        let b = Control::field(json!(2));
        let group = GroupControl::new([("a", a.clone()), ("b", b.clone())]);

        group.disable().unwrap();
        assert!(a.disabled());
        assert!(b.disabled());
        assert!(a.state().disabled);

        // Own flag cannot re-enable a child under a disabled parent
        a.enable().unwrap();
        assert!(a.disabled());

        group.enable().unwrap();
        assert!(a.enabled());
        assert!(b.enabled());
    }

    #[test]
    fn nested_disable_reaches_grandchildren() {
        let leaf = Control::field(json!(1));
        let inner = GroupControl::new([("leaf", leaf.clone())]);
        let outer = GroupControl::new([("inner", inner.into_control())]);

        outer.disable().unwrap();
        assert!(leaf.disabled());
        outer.enable().unwrap();
        assert!(leaf.enabled());
    }

    #[test]
    fn validation_is_deferred_while_disabled() {
        let field = Control::field_with(
            json!("x"),
            ControlOptions::new().validator(required()).disabled(true),
        )
        .unwrap();

        field.set_value(json!("")).unwrap();
        assert_eq!(field.errors(), None);
        assert!(!field.pending());

        field.enable().unwrap();
        assert_eq!(field.errors(), Some(Message::keyed("required", "required")));
    }

    #[test]
    fn item_rejects_value_operations() {
        let item = Control::item(ControlOptions::new()).unwrap();
        assert!(item.reset(None).is_err());
        assert!(item.patch_value(json!(1)).is_err());
        assert!(matches!(
            item.set_validators(vec![]),
            Err(FormError::Unsupported { op: "set_validators", kind: ControlKind::Item })
        ));
    }

    #[test]
    fn state_stream_replays_and_follows() {
        let field = Control::field(json!(1));
        let mut states = field.state_stream();
        assert_eq!(
            states.next().now_or_never().flatten().map(|s| s.value),
            Some(json!(1))
        );

        field.set_value(json!(2)).unwrap();
        let latest = states.next().now_or_never().flatten().unwrap();
        assert_eq!(latest.value, json!(2));
        assert!(latest.dirty);
    }

    #[test]
    fn pending_validator_without_runtime_faults() {
        let slow: Validator = Arc::new(|_: &Control| -> Result<Output<Option<Messages>>> {
            Ok(Output::future(futures_util::future::pending()))
        });
        let field = Control::field(json!(1));

        let result = field.set_validators(vec![slow]);
        assert_eq!(result, Err(FormError::NoRuntime("validators")));
        assert!(!field.pending());
        assert_eq!(field.last_fault(), Some(FormError::NoRuntime("validators")));
    }

    #[tokio::test]
    async fn async_validator_sets_pending_until_settled() {
        let (tx, rx) = oneshot::channel::<Option<Messages>>();
        let rx = parking_lot::Mutex::new(Some(rx));
        let remote: Validator = Arc::new(move |_: &Control| -> Result<Output<Option<Messages>>> {
            let rx = rx.lock().take();
            Ok(Output::future(async move {
                match rx {
                    Some(rx) => rx.await.map_err(FormError::executor),
                    None => Ok(None),
                }
            }))
        });

        let field = Control::field(json!("taken"));
        let group = GroupControl::new([("name", field.clone())]);
        field.set_validators(vec![remote]).unwrap();
        assert!(field.pending());
        assert!(group.pending());

        tx.send(Some(Message::keyed("unique", "already taken"))).unwrap();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert!(!field.pending());
        assert!(!group.pending());
        assert!(!field.valid());
        assert!(!group.valid());
    }

    #[tokio::test]
    async fn revalidation_discards_stale_run() {
        let (tx, rx) = oneshot::channel::<Option<Messages>>();
        let rx = parking_lot::Mutex::new(Some(rx));
        let stale: Validator = Arc::new(move |_: &Control| -> Result<Output<Option<Messages>>> {
            let rx = rx.lock().take();
            Ok(Output::future(async move {
                match rx {
                    Some(rx) => rx.await.map_err(FormError::executor),
                    None => Ok(None),
                }
            }))
        });

        let field = Control::field(json!("x"));
        field.set_validators(vec![stale]).unwrap();
        assert!(field.pending());

        field.set_validators(vec![required()]).unwrap();
        let _ = tx.send(Some(Message::keyed("stale", "stale")));
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert_eq!(field.errors(), None);
        assert!(!field.pending());
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_validators_while_disabled_releases_pending() {
        let slow = executor::from_future(|_: &Control| async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(None)
        });
        let field = Control::field_with(json!("x"), ControlOptions::new().validator(slow)).unwrap();
        let group = GroupControl::new([("name", field.clone())]);
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        field.set_value(json!("y")).unwrap();
        assert!(field.pending());
        assert!(group.pending());

        field.disable().unwrap();
        field.set_validators(vec![]).unwrap();
        assert!(!field.pending());
        assert!(!group.pending());

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(!field.pending());
        assert!(!group.pending());
    }
}
