//! Controls
//!
//! A control is one node of a reactive form tree. Every control carries a set
//! of facets (value, errors, hints, ...) held in [`Signal`]s, and a set of
//! executor pipelines that compute the derived facets from the control
//! itself.
//!
//! # Kinds
//!
//! - **Item**: hints, extras and messages only.
//! - **Field**: adds a value, validation and the dirty/touched/pending/disabled
//!   flags.
//! - **Group**: a field whose value is a map of named child controls.
//! - **Array**: a field whose value is an ordered list of child controls built
//!   by a factory.
//!
//! All four share the [`Control`] handle. [`GroupControl`] and
//! [`ArrayControl`] wrap it with their structural operations.
//!
//! # Propagation
//!
//! Values and status flow up: every mutation ends in [`Control::update`],
//! which recomputes the node and then updates its parent. Disabled state
//! flows down: when a node's effective disabled flag flips, every descendant
//! re-pulls it from its parent.
//!
//! # Readiness
//!
//! A control does not run executors until it is marked ready. Composite
//! trees are assembled children first and marked ready bottom-up, so no
//! executor observes a half-built tree.

mod array;
mod field;
mod group;
mod item;
mod path;
mod state;

pub use array::{ArrayControl, ArrayFactory};
pub use group::GroupControl;
pub use path::{parse_path, PathSegment};
pub use state::{ControlState, Extras, Hints, Message, Messages};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use futures_util::stream::BoxStream;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{FormError, Result};
use crate::executor::{
    evaluate_all, Disabler, Extraer, Hint, Hinter, Messager, SharedExecutor, Trigger, Validator,
};
use crate::reactive::{Completion, Pipeline, Signal};
use crate::search::SearchResolver;
use crate::tree::{ControlId, ControlKind, Tree};

const HINTERS: &str = "hinters";
const EXTRAERS: &str = "extraers";
const MESSAGERS: &str = "messagers";
const VALIDATORS: &str = "validators";
const TRIGGERS: &str = "triggers";
const DISABLERS: &str = "disablers";

/// Mutable bookkeeping that is not itself observable.
#[derive(Debug)]
struct Flags {
    ready: bool,
    disposed: bool,
    initial_value: Value,
    own_disabled: bool,
    own_dirty: bool,
    own_touched: bool,
    own_pending: bool,
    validation_deferred: bool,
}

impl Flags {
    fn new(initial_value: Value) -> Self {
        Self {
            ready: false,
            disposed: false,
            initial_value,
            own_disabled: false,
            own_dirty: false,
            own_touched: false,
            own_pending: false,
            validation_deferred: false,
        }
    }
}

/// The observable state of a control.
struct Facets {
    value: Signal<Value>,
    errors: Signal<Option<Messages>>,
    disabled: Signal<bool>,
    valid: Signal<bool>,
    pending: Signal<bool>,
    dirty: Signal<bool>,
    touched: Signal<bool>,
    hints: Signal<Hints>,
    extras: Signal<Extras>,
    messages: Signal<Option<Messages>>,
    state: Signal<ControlState>,
    disposed: Signal<bool>,
}

impl Facets {
    fn new(value: Value) -> Self {
        Self {
            state: Signal::new(ControlState::initial(value.clone())),
            value: Signal::new(value),
            errors: Signal::new(None),
            disabled: Signal::new(false),
            valid: Signal::new(true),
            pending: Signal::new(false),
            dirty: Signal::new(false),
            touched: Signal::new(false),
            hints: Signal::new(Hints::new()),
            extras: Signal::new(Extras::new()),
            messages: Signal::new(None),
            disposed: Signal::new(false),
        }
    }

    fn complete(&self) {
        self.value.complete();
        self.errors.complete();
        self.disabled.complete();
        self.valid.complete();
        self.pending.complete();
        self.dirty.complete();
        self.touched.complete();
        self.hints.complete();
        self.extras.complete();
        self.messages.complete();
        self.state.complete();
        self.disposed.complete();
    }
}

/// One executor family: the installed list and the pipeline running it.
struct Slot<T> {
    executors: RwLock<Vec<SharedExecutor<T>>>,
    pipeline: Pipeline,
}

impl<T> Slot<T> {
    fn new(name: &'static str) -> Self {
        Self {
            executors: RwLock::new(Vec::new()),
            pipeline: Pipeline::new(name),
        }
    }

    fn replace(&self, executors: Vec<SharedExecutor<T>>) {
        *self.executors.write() = executors;
    }

    fn is_empty(&self) -> bool {
        self.executors.read().is_empty()
    }

    fn dispose(&self) {
        self.pipeline.dispose();
        self.executors.write().clear();
    }
}

struct Behaviors {
    hinters: Slot<Hint>,
    extraers: Slot<Extras>,
    messagers: Slot<Option<Messages>>,
    validators: Slot<Option<Messages>>,
    triggers: Slot<()>,
    disablers: Slot<bool>,
}

impl Behaviors {
    fn new() -> Self {
        Self {
            hinters: Slot::new(HINTERS),
            extraers: Slot::new(EXTRAERS),
            messagers: Slot::new(MESSAGERS),
            validators: Slot::new(VALIDATORS),
            triggers: Slot::new(TRIGGERS),
            disablers: Slot::new(DISABLERS),
        }
    }

    fn dispose(&self) {
        self.hinters.dispose();
        self.extraers.dispose();
        self.messagers.dispose();
        self.validators.dispose();
        self.triggers.dispose();
        self.disablers.dispose();
    }
}

/// Child controls owned through the value.
enum Members {
    Leaf,
    Group(RwLock<IndexMap<String, Control>>),
    Array {
        factory: ArrayFactory,
        controls: RwLock<Vec<Control>>,
    },
}

/// Storage behind a [`Control`] handle.
pub(crate) struct ControlNode {
    id: ControlId,
    kind: ControlKind,
    flags: RwLock<Flags>,
    facets: Facets,
    behaviors: Behaviors,
    members: Members,

    /// Tree children kept alive by this node without contributing to its
    /// value, such as the items of a group.
    attached: RwLock<Vec<Control>>,

    resolver: RwLock<Option<Arc<dyn SearchResolver>>>,
    last_fault: RwLock<Option<FormError>>,
}

impl Drop for ControlNode {
    fn drop(&mut self) {
        Tree::unregister(self.id);
    }
}

/// Executors and flags to install on a new control.
///
/// Items ignore validators, triggers and disablers.
#[derive(Clone, Default)]
pub struct ControlOptions {
    hinters: Vec<Hinter>,
    extraers: Vec<Extraer>,
    messagers: Vec<Messager>,
    validators: Vec<Validator>,
    triggers: Vec<Trigger>,
    disablers: Vec<Disabler>,
    disabled: bool,
}

impl ControlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hinter(mut self, hinter: Hinter) -> Self {
        self.hinters.push(hinter);
        self
    }

    pub fn extraer(mut self, extraer: Extraer) -> Self {
        self.extraers.push(extraer);
        self
    }

    pub fn messager(mut self, messager: Messager) -> Self {
        self.messagers.push(messager);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn disabler(mut self, disabler: Disabler) -> Self {
        self.disablers.push(disabler);
        self
    }

    /// Start with the control's own disabled flag set.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

impl fmt::Debug for ControlOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlOptions")
            .field("hinters", &self.hinters.len())
            .field("extraers", &self.extraers.len())
            .field("messagers", &self.messagers.len())
            .field("validators", &self.validators.len())
            .field("triggers", &self.triggers.len())
            .field("disablers", &self.disablers.len())
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// A handle to a control. Cloning is cheap and yields the same control.
#[derive(Clone)]
pub struct Control {
    node: Arc<ControlNode>,
}

/// A handle that does not keep the control alive.
#[derive(Clone)]
pub(crate) struct WeakControl(Weak<ControlNode>);

impl WeakControl {
    pub(crate) fn upgrade(&self) -> Option<Control> {
        self.0.upgrade().map(Control::from_node)
    }
}

impl Control {
    pub(crate) fn from_node(node: Arc<ControlNode>) -> Self {
        Self { node }
    }

    pub(crate) fn downgrade(&self) -> WeakControl {
        WeakControl(Arc::downgrade(&self.node))
    }

    /// Create and register a control that is not ready yet.
    fn create(kind: ControlKind, value: Value, members: Members) -> Self {
        let id = ControlId::new();
        let node = Arc::new(ControlNode {
            id,
            kind,
            flags: RwLock::new(Flags::new(value.clone())),
            facets: Facets::new(value),
            behaviors: Behaviors::new(),
            members,
            attached: RwLock::new(Vec::new()),
            resolver: RwLock::new(None),
            last_fault: RwLock::new(None),
        });
        Tree::register(id, kind, Arc::downgrade(&node));
        tracing::debug!(control = %id, %kind, "created control");
        Self { node }
    }

    /// Store executor lists without starting them.
    pub(crate) fn install(&self, options: ControlOptions) {
        let behaviors = &self.node.behaviors;
        behaviors.hinters.replace(options.hinters);
        behaviors.extraers.replace(options.extraers);
        behaviors.messagers.replace(options.messagers);
        if self.kind().has_value() {
            behaviors.validators.replace(options.validators);
            behaviors.triggers.replace(options.triggers);
            behaviors.disablers.replace(options.disablers);
            self.node.flags.write().own_disabled = options.disabled;
        }
    }

    /// Install options and mark ready.
    fn finish(self, options: ControlOptions) -> Result<Self> {
        self.install(options);
        self.mark_ready()?;
        Ok(self)
    }

    /// Mark ready a control without executors. Empty executor lists settle
    /// synchronously and cannot fault.
    fn ready_empty(&self) {
        if let Err(err) = self.mark_ready() {
            tracing::error!(control = %self.id(), error = %err, "failed to settle control");
        }
    }

    /// Unlock the control's pipelines and compute its derived state.
    ///
    /// Runs the item pipelines, then disablers and validation. Every
    /// pipeline is started even if an earlier one faulted; the first fault
    /// is returned.
    pub(crate) fn mark_ready(&self) -> Result<()> {
        {
            let mut flags = self.node.flags.write();
            if flags.disposed {
                return Err(FormError::Disposed(self.id()));
            }
            if flags.ready {
                return Ok(());
            }
            flags.ready = true;
        }
        tracing::debug!(control = %self.id(), kind = %self.kind(), "control ready");

        let mut fault = None;
        keep_first(&mut fault, self.start_hinters());
        keep_first(&mut fault, self.start_extraers());
        keep_first(&mut fault, self.start_messagers());
        if self.kind().has_value() {
            keep_first(&mut fault, self.update_disablers());
            if self.refresh_disabled() {
                self.propagate_disabled();
            }
            keep_first(&mut fault, self.validate());
        }
        self.update();

        match fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Get the control's ID.
    pub fn id(&self) -> ControlId {
        self.node.id
    }

    /// Get the control's kind.
    pub fn kind(&self) -> ControlKind {
        self.node.kind
    }

    /// Check whether the control's pipelines have been unlocked.
    pub fn is_ready(&self) -> bool {
        self.node.flags.read().ready
    }

    /// Check whether the control has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.node.flags.read().disposed
    }

    /// View as a group, if it is one.
    pub fn as_group(&self) -> Option<GroupControl> {
        GroupControl::from_control(self.clone())
    }

    /// View as an array, if it is one.
    pub fn as_array(&self) -> Option<ArrayControl> {
        ArrayControl::from_control(self.clone())
    }

    // ------------------------------------------------------------------
    // Facets
    // ------------------------------------------------------------------

    /// Current value. Items always report `null`.
    pub fn value(&self) -> Value {
        self.node.facets.value.get()
    }

    pub fn value_stream(&self) -> BoxStream<'static, Value> {
        self.node.facets.value.stream()
    }

    pub fn value_signal(&self) -> Signal<Value> {
        self.node.facets.value.clone()
    }

    /// The value as of construction or the last `reset` that supplied one.
    pub fn initial_value(&self) -> Value {
        match self.kind() {
            ControlKind::Group => Value::Object(
                self.group_entries()
                    .into_iter()
                    .map(|(name, control)| (name, control.initial_value()))
                    .collect(),
            ),
            _ => self.node.flags.read().initial_value.clone(),
        }
    }

    /// The value extracted recursively from every owned control.
    ///
    /// Disabled controls keep contributing to [`value`](Self::value), so at
    /// every settled state the two are equal. This one is recomputed from
    /// the members instead of read from the value facet.
    pub fn raw_value(&self) -> Value {
        match self.kind() {
            ControlKind::Item => Value::Null,
            ControlKind::Field => self.value(),
            ControlKind::Group => Value::Object(
                self.group_entries()
                    .into_iter()
                    .map(|(name, control)| (name, control.raw_value()))
                    .collect(),
            ),
            ControlKind::Array => Value::Array(
                self.array_entries()
                    .iter()
                    .map(Control::raw_value)
                    .collect(),
            ),
        }
    }

    /// Validation errors of this control's own validators.
    pub fn errors(&self) -> Option<Messages> {
        self.node.facets.errors.get()
    }

    pub fn errors_stream(&self) -> BoxStream<'static, Option<Messages>> {
        self.node.facets.errors.stream()
    }

    pub fn disabled(&self) -> bool {
        self.node.facets.disabled.get()
    }

    pub fn enabled(&self) -> bool {
        !self.disabled()
    }

    pub fn disabled_stream(&self) -> BoxStream<'static, bool> {
        self.node.facets.disabled.stream()
    }

    pub fn valid(&self) -> bool {
        self.node.facets.valid.get()
    }

    pub fn valid_stream(&self) -> BoxStream<'static, bool> {
        self.node.facets.valid.stream()
    }

    pub fn pending(&self) -> bool {
        self.node.facets.pending.get()
    }

    pub fn pending_stream(&self) -> BoxStream<'static, bool> {
        self.node.facets.pending.stream()
    }

    pub fn dirty(&self) -> bool {
        self.node.facets.dirty.get()
    }

    pub fn dirty_stream(&self) -> BoxStream<'static, bool> {
        self.node.facets.dirty.stream()
    }

    pub fn touched(&self) -> bool {
        self.node.facets.touched.get()
    }

    pub fn touched_stream(&self) -> BoxStream<'static, bool> {
        self.node.facets.touched.stream()
    }

    pub fn hints(&self) -> Hints {
        self.node.facets.hints.get()
    }

    /// A single hint; missing hints read false.
    pub fn hint(&self, key: &str) -> bool {
        self.node
            .facets
            .hints
            .with(|hints| hints.get(key).copied().unwrap_or(false))
    }

    pub fn hints_stream(&self) -> BoxStream<'static, Hints> {
        self.node.facets.hints.stream()
    }

    pub fn extras(&self) -> Extras {
        self.node.facets.extras.get()
    }

    pub fn extra(&self, key: &str) -> Option<Value> {
        self.node.facets.extras.with(|extras| extras.get(key).cloned())
    }

    pub fn extras_stream(&self) -> BoxStream<'static, Extras> {
        self.node.facets.extras.stream()
    }

    pub fn messages(&self) -> Option<Messages> {
        self.node.facets.messages.get()
    }

    pub fn messages_stream(&self) -> BoxStream<'static, Option<Messages>> {
        self.node.facets.messages.stream()
    }

    /// Combined snapshot of every facet.
    pub fn state(&self) -> ControlState {
        self.node.facets.state.get()
    }

    pub fn state_stream(&self) -> BoxStream<'static, ControlState> {
        self.node.facets.state.stream()
    }

    pub fn state_signal(&self) -> Signal<ControlState> {
        self.node.facets.state.clone()
    }

    /// Emits `false` until the control is disposed, then `true` and ends.
    pub fn disposed_stream(&self) -> BoxStream<'static, bool> {
        self.node.facets.disposed.stream()
    }

    /// The most recent executor fault, if any.
    pub fn last_fault(&self) -> Option<FormError> {
        self.node.last_fault.read().clone()
    }

    /// Attach the resolver used for option lookups on this control.
    pub fn set_search_resolver(&self, resolver: Arc<dyn SearchResolver>) {
        *self.node.resolver.write() = Some(resolver);
    }

    pub fn search_resolver(&self) -> Option<Arc<dyn SearchResolver>> {
        self.node.resolver.read().clone()
    }

    // ------------------------------------------------------------------
    // Tree
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Control> {
        Tree::parent(self.id()).and_then(Tree::lookup)
    }

    /// Tree children in registration order.
    pub fn children(&self) -> Vec<Control> {
        Tree::children(self.id())
            .into_iter()
            .filter_map(Tree::lookup)
            .collect()
    }

    /// The topmost ancestor, or the control itself.
    pub fn root(&self) -> Control {
        Tree::ancestors(self.id())
            .last()
            .copied()
            .and_then(Tree::lookup)
            .unwrap_or_else(|| self.clone())
    }

    /// Rewire this control's tree edge.
    ///
    /// Parenting a control under itself or under one of its descendants is
    /// ignored. Both the old and the new parent are updated.
    pub fn set_parent(&self, parent: Option<&Control>) -> Result<()> {
        self.ensure_live()?;
        let previous = self.parent();
        if !Tree::set_parent(self.id(), parent.map(Control::id)) {
            return Ok(());
        }
        if let Some(previous) = previous {
            previous.update();
        }
        self.update();
        Ok(())
    }

    /// Resolve a path such as `address.lines[0]` or `address.lines.0`.
    ///
    /// Groups are addressed by key and arrays by index. Returns `None` for an
    /// empty path or any missing segment.
    pub fn get(&self, path: &str) -> Option<Control> {
        let segments = parse_path(path)?;
        segments
            .iter()
            .try_fold(self.clone(), |current, segment| current.member(segment))
    }

    fn member(&self, segment: &PathSegment) -> Option<Control> {
        match &self.node.members {
            Members::Leaf => None,
            Members::Group(controls) => controls.read().get(&*segment.as_key()).cloned(),
            Members::Array { controls, .. } => {
                segment.as_index().and_then(|i| controls.read().get(i).cloned())
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Tear the control down.
    ///
    /// Stops every pipeline, disposes owned and tree children, detaches from
    /// the parent and completes every facet stream. Idempotent.
    pub fn dispose(&self) {
        {
            let mut flags = self.node.flags.write();
            if flags.disposed {
                return;
            }
            flags.disposed = true;
        }
        tracing::debug!(control = %self.id(), kind = %self.kind(), "disposing control");

        self.node.behaviors.dispose();

        let mut doomed = self.take_members();
        doomed.append(&mut *self.node.attached.write());
        if self.kind().is_composite() {
            for child in self.children() {
                if !doomed.contains(&child) {
                    doomed.push(child);
                }
            }
        } else {
            for child in self.children() {
                Tree::set_parent(child.id(), None);
            }
        }
        for child in &doomed {
            child.dispose();
        }

        let parent = self.parent();
        Tree::set_parent(self.id(), None);
        if let Some(parent) = parent {
            parent.update();
        }

        self.node.facets.disposed.set(true);
        self.node.facets.complete();
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(FormError::Disposed(self.id()));
        }
        Ok(())
    }

    /// Adopt `child` as a tree child and let it pull inherited state.
    pub(crate) fn adopt(&self, child: &Control) {
        if Tree::set_parent(child.id(), Some(self.id())) {
            child.update();
        }
    }

    fn take_members(&self) -> Vec<Control> {
        match &self.node.members {
            Members::Leaf => Vec::new(),
            Members::Group(controls) => controls.write().drain(..).map(|(_, c)| c).collect(),
            Members::Array { controls, .. } => controls.write().drain(..).collect(),
        }
    }

    pub(crate) fn group_entries(&self) -> Vec<(String, Control)> {
        match &self.node.members {
            Members::Group(controls) => controls
                .read()
                .iter()
                .map(|(name, control)| (name.clone(), control.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn array_entries(&self) -> Vec<Control> {
        match &self.node.members {
            Members::Array { controls, .. } => controls.read().clone(),
            _ => Vec::new(),
        }
    }

    /// The value computed from owned controls, for composites.
    fn composite_value(&self) -> Option<Value> {
        match self.kind() {
            ControlKind::Group => Some(Value::Object(
                self.group_entries()
                    .into_iter()
                    .map(|(name, control)| (name, control.value()))
                    .collect(),
            )),
            ControlKind::Array => Some(Value::Array(
                self.array_entries().iter().map(Control::value).collect(),
            )),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Pipelines
    // ------------------------------------------------------------------

    /// Restart one executor family.
    ///
    /// The previous run is cancelled before the executors are evaluated.
    /// Emissions are delivered to `on_emit` for as long as the control is
    /// alive.
    fn run_slot<T, E>(&self, slot: &Slot<T>, completion: Completion, on_emit: E) -> Result<()>
    where
        T: Clone + Send + 'static,
        E: Fn(&Control, Vec<T>) + Send + Sync + 'static,
    {
        slot.pipeline.stop();
        let family = slot.pipeline.name();
        let executors = slot.executors.read().clone();
        let streams = evaluate_all(&executors, self).map_err(|err| {
            self.handle_fault(family, &err);
            err
        })?;

        let emit_target = self.downgrade();
        let fault_target = self.downgrade();
        slot.pipeline.start(
            streams,
            completion,
            move |values| {
                if let Some(control) = emit_target.upgrade() {
                    on_emit(&control, values);
                }
            },
            move |err| {
                if let Some(control) = fault_target.upgrade() {
                    control.handle_fault(family, &err);
                }
            },
        )
    }

    fn handle_fault(&self, family: &'static str, err: &FormError) {
        tracing::error!(control = %self.id(), family, error = %err, "executor fault");
        *self.node.last_fault.write() = Some(err.clone());
        if family == VALIDATORS {
            self.node.flags.write().own_pending = false;
            self.update();
        }
    }

    fn snapshot(&self) -> ControlState {
        let facets = &self.node.facets;
        ControlState {
            value: facets.value.get(),
            errors: facets.errors.get(),
            disabled: facets.disabled.get(),
            valid: facets.valid.get(),
            pending: facets.pending.get(),
            dirty: facets.dirty.get(),
            touched: facets.touched.get(),
            hints: facets.hints.get(),
            extras: facets.extras.get(),
            messages: facets.messages.get(),
        }
    }

    /// Republish the combined snapshot if any facet changed.
    fn publish_state(&self) {
        self.node.facets.state.set_if_changed(self.snapshot());
    }
}

fn keep_first(fault: &mut Option<FormError>, result: Result<()>) {
    if let Err(err) = result {
        fault.get_or_insert(err);
    }
}

impl PartialEq for Control {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Control {}

impl Hash for Control {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("value", &self.value())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
