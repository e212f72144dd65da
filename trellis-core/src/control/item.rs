//! Hints, extras and messages: the facets every control kind carries.

use serde_json::Value;

use super::{Control, ControlOptions, Members};
use crate::error::Result;
use crate::executor::{merge_extras, merge_messages, reduce_hints, Extraer, Hinter, Messager};
use crate::reactive::Completion;
use crate::tree::ControlKind;

impl Control {
    /// Create an item control.
    ///
    /// Items have no value. They exist to carry hints, extras and messages,
    /// e.g. for a heading or a help text in a form.
    pub fn item(options: ControlOptions) -> Result<Control> {
        Self::create(ControlKind::Item, Value::Null, Members::Leaf).finish(options)
    }

    /// Replace the hint executors and restart the hints pipeline.
    pub fn set_hinters(&self, hinters: Vec<Hinter>) -> Result<()> {
        self.ensure_live()?;
        self.node.behaviors.hinters.replace(hinters);
        if self.is_ready() {
            self.start_hinters()?;
        }
        Ok(())
    }

    /// Replace the extra executors and restart the extras pipeline.
    pub fn set_extraers(&self, extraers: Vec<Extraer>) -> Result<()> {
        self.ensure_live()?;
        self.node.behaviors.extraers.replace(extraers);
        if self.is_ready() {
            self.start_extraers()?;
        }
        Ok(())
    }

    /// Replace the message executors and restart the messages pipeline.
    pub fn set_messagers(&self, messagers: Vec<Messager>) -> Result<()> {
        self.ensure_live()?;
        self.node.behaviors.messagers.replace(messagers);
        if self.is_ready() {
            self.start_messagers()?;
        }
        Ok(())
    }

    pub(super) fn start_hinters(&self) -> Result<()> {
        self.run_slot(
            &self.node.behaviors.hinters,
            Completion::Continuous,
            |control, entries| {
                control.node.facets.hints.set(reduce_hints(entries));
                control.publish_state();
            },
        )
    }

    pub(super) fn start_extraers(&self) -> Result<()> {
        self.run_slot(
            &self.node.behaviors.extraers,
            Completion::Continuous,
            |control, partials| {
                control.node.facets.extras.set(merge_extras(partials));
                control.publish_state();
            },
        )
    }

    pub(super) fn start_messagers(&self) -> Result<()> {
        self.run_slot(
            &self.node.behaviors.messagers,
            Completion::Continuous,
            |control, entries| {
                if control.node.facets.messages.set_if_changed(merge_messages(entries)) {
                    control.publish_state();
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Message;
    use crate::error::FormError;
    use crate::executor::{self, watch_value, Output};
    use futures_util::stream;
    use serde_json::json;

    #[test]
    fn item_has_no_value() {
        let item = Control::item(ControlOptions::new()).unwrap();
        assert_eq!(item.kind(), ControlKind::Item);
        assert_eq!(item.value(), Value::Null);
        assert!(matches!(
            item.set_value(json!(1)),
            Err(FormError::Unsupported { op: "set_value", .. })
        ));
    }

    #[test]
    fn hints_are_ored_by_key() {
        let item = Control::item(
            ControlOptions::new()
                .hinter(executor::from_fn(|_: &Control| ("visible".to_string(), false)))
                .hinter(executor::from_fn(|_: &Control| ("visible".to_string(), true)))
                .hinter(executor::from_fn(|_: &Control| ("readonly".to_string(), false))),
        )
        .unwrap();

        assert!(item.hint("visible"));
        assert!(!item.hint("readonly"));
        assert!(item.state().hint("visible"));
    }

    #[test]
    fn set_hinters_recomputes_from_scratch() {
        let item = Control::item(
            ControlOptions::new()
                .hinter(executor::from_fn(|_: &Control| ("visible".to_string(), true))),
        )
        .unwrap();
        assert!(item.hint("visible"));

        item.set_hinters(vec![executor::from_fn(|_: &Control| {
            ("visible".to_string(), false)
        })])
        .unwrap();
        assert!(!item.hint("visible"));

        item.set_hinters(vec![]).unwrap();
        assert!(item.hints().is_empty());
    }

    #[test]
    fn extras_overwrite_merge() {
        let item = Control::item(
            ControlOptions::new()
                .extraer(executor::from_fn(|_: &Control| {
                    let mut extras = crate::control::Extras::new();
                    extras.insert("label".into(), json!("Name"));
                    extras.insert("width".into(), json!(6));
                    extras
                }))
                .extraer(executor::from_fn(|_: &Control| {
                    let mut extras = crate::control::Extras::new();
                    extras.insert("label".into(), json!("Full name"));
                    extras
                })),
        )
        .unwrap();

        assert_eq!(item.extra("label"), Some(json!("Full name")));
        assert_eq!(item.extra("width"), Some(json!(6)));
        assert_eq!(item.extra("missing"), None);
    }

    #[test]
    fn messages_null_unless_reported() {
        let item = Control::item(
            ControlOptions::new()
                .messager(executor::from_fn(|_: &Control| None))
                .messager(executor::from_fn(|_: &Control| None)),
        )
        .unwrap();
        assert_eq!(item.messages(), None);

        item.set_messagers(vec![
            executor::from_fn(|_: &Control| None),
            executor::from_fn(|_: &Control| Some(Message::keyed("info", "saved"))),
        ])
        .unwrap();
        assert_eq!(item.messages(), Some(Message::keyed("info", "saved")));
        assert_eq!(item.state().messages, Some(Message::keyed("info", "saved")));
    }

    #[test]
    fn duplicate_messages_are_not_republished() {
        let item = Control::item(
            ControlOptions::new()
                .messager(executor::from_fn(|_: &Control| Some(Message::keyed("info", "hi")))),
        )
        .unwrap();

        let publishes = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = publishes.clone();
        item.node.facets.messages.subscribe(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        item.set_messagers(vec![executor::from_fn(|_: &Control| {
            Some(Message::keyed("info", "hi"))
        })])
        .unwrap();
        assert_eq!(publishes.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn synchronous_fault_is_returned_and_recorded() {
        let failing: crate::executor::Hinter = std::sync::Arc::new(
            |_: &Control| -> Result<Output<(String, bool)>> { Err(FormError::executor("boom")) },
        );
        let item = Control::item(ControlOptions::new()).unwrap();

        assert_eq!(item.set_hinters(vec![failing]), Err(FormError::executor("boom")));
        assert_eq!(item.last_fault(), Some(FormError::executor("boom")));
    }

    #[tokio::test]
    async fn stream_fault_is_recorded() {
        let item = Control::item(ControlOptions::new()).unwrap();
        let hinter: crate::executor::Hinter = std::sync::Arc::new(
            |_: &Control| -> Result<Output<(String, bool)>> {
                Ok(Output::stream(stream::once(async {
                    tokio::task::yield_now().await;
                    Err(FormError::executor("lost connection"))
                })))
            },
        );

        item.set_hinters(vec![hinter]).unwrap();
        assert_eq!(item.last_fault(), None);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert_eq!(item.last_fault(), Some(FormError::executor("lost connection")));
    }

    #[tokio::test]
    async fn hints_follow_the_value() {
        let field = Control::field_with(
            json!(""),
            ControlOptions::new().hinter(watch_value(|value| {
                ("filled".to_string(), value != "")
            })),
        )
        .unwrap();
        assert!(!field.hint("filled"));

        field.set_value(json!("abc")).unwrap();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(field.hint("filled"));
    }
}
