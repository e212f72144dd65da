//! Integration Tests for Control Trees
//!
//! These tests drive whole trees through the public API: values flowing up,
//! disabled state flowing down, validation, and the search pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};

use trellis_core::builder::{ControlConfig, FormBuilder, Registry};
use trellis_core::executor::{self, Output};
use trellis_core::search::{
    Query, ResolveQuery, SearchConfig, SearchPipeline, SearchQuery, SearchRequest, SearchResolver,
};
use trellis_core::{ArrayControl, Control, ControlOptions, GroupControl, Message, Result};

fn required() -> executor::Validator {
    executor::from_fn(|control: &Control| {
        (control.value() == "").then(|| Message::keyed("required", "required"))
    })
}

/// Echoes the search text back and counts calls.
#[derive(Default)]
struct Echo {
    calls: AtomicUsize,
}

impl SearchResolver for Echo {
    fn search(&self, query: &SearchQuery) -> Result<Output<Vec<Value>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Output::value(vec![json!(query.text)]))
    }

    fn resolve(&self, query: &ResolveQuery) -> Result<Output<Vec<Value>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Output::value(query.values.clone()))
    }
}

/// A group's value is the key-wise map of its children after every change.
#[test]
fn group_value_tracks_children() {
    let a = Control::field(json!(1));
    let b = Control::field(json!("two"));
    let inner = GroupControl::new([("b", b.clone())]);
    let root = GroupControl::new([("a", a.clone()), ("inner", inner.clone().into_control())]);

    let expected = |root: &GroupControl| {
        Value::Object(
            root.controls()
                .into_iter()
                .map(|(name, control)| (name, control.value()))
                .collect(),
        )
    };

    assert_eq!(root.value(), expected(&root));

    a.set_value(json!([1, 2, 3])).unwrap();
    assert_eq!(root.value(), expected(&root));

    b.set_value(json!({"deep": true})).unwrap();
    assert_eq!(root.value(), json!({"a": [1, 2, 3], "inner": {"b": {"deep": true}}}));

    root.reset(None).unwrap();
    assert_eq!(root.value(), json!({"a": 1, "inner": {"b": "two"}}));
}

/// Disabling a parent disables every descendant, and enabling it restores
/// each descendant's own flag.
#[test]
fn disabled_flows_down() {
    let leaf = Control::field(json!(null));
    let own = Control::field_with(json!(null), ControlOptions::new().disabled(true)).unwrap();
    let inner = GroupControl::new([("leaf", leaf.clone()), ("own", own.clone())]);
    let root = GroupControl::new([("inner", inner.clone().into_control())]);

    root.disable().unwrap();
    for control in [&*inner, &leaf, &own] {
        assert!(control.disabled());
    }

    root.enable().unwrap();
    assert!(!inner.disabled());
    assert!(!leaf.disabled());
    assert!(own.disabled());
}

/// Two resets in a row leave identical state.
#[test]
fn reset_is_idempotent() {
    let name = Control::field(json!("Ann"));
    let form = GroupControl::new([("name", name.clone())]);
    name.set_value(json!("Bob")).unwrap();

    form.reset(None).unwrap();
    let first = (form.value(), form.dirty(), form.touched());
    form.reset(None).unwrap();
    let second = (form.value(), form.dirty(), form.touched());

    assert_eq!(first, second);
    assert_eq!(first, (json!({"name": "Ann"}), false, false));
}

/// Leaf values come back exactly as they were set.
#[test]
fn leaf_values_round_trip() {
    let field = Control::field(Value::Null);
    for value in [
        json!(null),
        json!(0),
        json!(1.5),
        json!(""),
        json!("text"),
        json!([1, "a", null]),
        json!({"nested": {"x": [true]}}),
    ] {
        field.set_value(value.clone()).unwrap();
        assert_eq!(field.value(), value);
    }
}

#[test]
fn group_patch_leaves_other_children_clean() {
    let a = Control::field(json!("x"));
    let b = Control::field(json!("y"));
    let group = GroupControl::new([("a", a.clone()), ("b", b.clone())]);

    group.patch_value(json!({"a": "z"})).unwrap();

    assert_eq!(group.value(), json!({"a": "z", "b": "y"}));
    assert!(a.dirty());
    assert!(!b.dirty());
}

#[test]
fn array_push_value_builds_through_factory() {
    let array = ArrayControl::new(
        |value: Option<&Value>| {
            let n = value.and_then(|v| v.get("n")).cloned().unwrap_or(Value::Null);
            GroupControl::new([("n", Control::field(n))]).into_control()
        },
        vec![json!({"n": "A"})],
    );

    array.push_value(json!({"n": "B"})).unwrap();

    assert_eq!(array.value(), json!([{"n": "A"}, {"n": "B"}]));
    assert_eq!(array.len(), 2);
}

#[test]
fn required_validator_round_trip() {
    let field =
        Control::field_with(json!("start"), ControlOptions::new().validator(required())).unwrap();

    field.set_value(json!("")).unwrap();
    assert_eq!(field.errors(), Some(Message::keyed("required", "required")));
    assert!(!field.valid());

    field.set_value(json!("ok")).unwrap();
    assert_eq!(field.errors(), None);
    assert!(field.valid());
}

/// An async validator keeps the tree pending until it answers.
#[tokio::test(start_paused = true)]
async fn async_validation_settles_later() {
    let slow = executor::from_future(|control: &Control| {
        let empty = control.value() == "";
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(empty.then(|| Message::keyed("required", "required")))
        }
    });
    let email = Control::field_with(json!("a@b.c"), ControlOptions::new().validator(slow)).unwrap();
    let form = GroupControl::new([("email", email.clone())]);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!form.pending());

    email.set_value(json!("")).unwrap();
    assert!(email.pending());
    assert!(form.pending());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!form.pending());
    assert!(!form.valid());
    assert!(email.errors().is_some());
}

/// The state stream replays the current snapshot, then follows changes.
#[tokio::test]
async fn state_stream_replays_then_follows() {
    let field = Control::field(json!(1));
    let mut states = field.state_stream();

    let first = states.next().await.unwrap();
    assert_eq!(first.value, json!(1));
    assert!(!first.dirty);

    field.set_value(json!(2)).unwrap();
    let next = states.next().await.unwrap();
    assert_eq!(next.value, json!(2));
    assert!(next.dirty);
}

/// Searches arriving at 0, 200, 600, 1101 and 1651 ms with a 500 ms
/// debounce run only the last request before each quiet gap.
#[tokio::test(start_paused = true)]
async fn search_debounce_keeps_requests_before_quiet_gaps() {
    let resolver = Arc::new(Echo::default());
    let control = Control::field(Value::Null);
    let (pipeline, mut results) = SearchPipeline::new(SearchConfig::new(
        Duration::from_millis(500),
        Duration::from_millis(100),
    ));

    let arrivals = [(0, "p1"), (200, "p2"), (600, "p3"), (1101, "p4"), (1651, "p5")];
    let mut now = 0;
    for (at, text) in arrivals {
        tokio::time::sleep(Duration::from_millis(at - now)).await;
        now = at;
        let request = SearchRequest::new(
            "city",
            Query::Search(text.to_string()),
            control.clone(),
            resolver.clone(),
        );
        pipeline.submit(request).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let mut seen = Vec::new();
    while let Some(result) = results.try_recv() {
        seen.push(result.query);
    }
    assert_eq!(
        seen,
        vec![
            Query::Search("p3".into()),
            Query::Search("p4".into()),
            Query::Search("p5".into()),
        ]
    );
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
}

/// Interleaved keys are debounced and batched without interfering.
#[tokio::test(start_paused = true)]
async fn search_keys_do_not_interfere() {
    let resolver = Arc::new(Echo::default());
    let control = Control::field(Value::Null);
    let (pipeline, mut results) = SearchPipeline::new(SearchConfig::default());

    let request = |key: &str, query: Query| {
        SearchRequest::new(key, query, control.clone(), resolver.clone())
    };

    pipeline.submit(request("a", Query::Search("a1".into()))).unwrap();
    pipeline.submit(request("b", Query::Resolve(vec![json!(1)]))).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    pipeline.submit(request("a", Query::Search("a2".into()))).unwrap();
    pipeline.submit(request("b", Query::Resolve(vec![json!(2), json!(1)]))).unwrap();
    pipeline.submit(request("c", Query::Resolve(vec![json!(9)]))).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut seen: Vec<(String, Query, Vec<Value>)> = Vec::new();
    while let Some(result) = results.try_recv() {
        seen.push((result.key, result.query, result.result.unwrap()));
    }
    seen.sort_by(|x, y| x.0.cmp(&y.0));

    assert_eq!(
        seen,
        vec![
            ("a".into(), Query::Search("a2".into()), vec![json!("a2")]),
            ("b".into(), Query::Resolve(vec![json!(1), json!(2)]), vec![json!(1), json!(2)]),
            ("c".into(), Query::Resolve(vec![json!(9)]), vec![json!(9)]),
        ]
    );
}

/// A built form hands its resolver to search requests.
#[tokio::test(start_paused = true)]
async fn built_form_searches_through_registry_resolver() {
    let resolver = Arc::new(Echo::default());
    let shared = resolver.clone();
    let registry = Registry::new().with_search("echo", move |_, _, _| {
        Some(shared.clone() as Arc<dyn SearchResolver>)
    });
    let config = ControlConfig::from_json(
        r#"{
            "type": "group",
            "fields": [{ "type": "autocomplete", "name": "city", "search": { "name": "echo" } }]
        }"#,
    )
    .unwrap();
    let form = FormBuilder::new(&registry).build(&config).unwrap();
    let city = form.get("city").unwrap();

    let (pipeline, mut results) = SearchPipeline::new(SearchConfig::default());
    let request = SearchRequest::for_control("city", Query::Search("Par".into()), &city)
        .unwrap()
        .with_params(json!({"limit": 5}));
    pipeline.submit(request).unwrap();

    let result = results.recv().await.unwrap();
    assert_eq!(result.control, city);
    assert_eq!(result.params, json!({"limit": 5}));
    assert_eq!(result.result, Ok(vec![json!("Par")]));
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}

/// Disposing a root disposes the whole tree and ends its streams.
#[tokio::test]
async fn dispose_tears_down_tree() {
    let leaf = Control::field(json!(1));
    let array = ArrayControl::new(
        |value: Option<&Value>| Control::field(value.cloned().unwrap_or_default()),
        vec![json!(1)],
    );
    let root = GroupControl::new([
        ("leaf", leaf.clone()),
        ("list", array.clone().into_control()),
    ]);

    let mut values = leaf.value_stream();
    root.dispose();

    assert!(leaf.is_disposed());
    assert!(array.is_disposed());
    assert!(array.controls().is_empty());
    assert_eq!(values.next().await, Some(json!(1)));
    assert_eq!(values.next().await, None);
    assert!(leaf.set_value(json!(2)).is_err());
}
