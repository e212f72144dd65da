//! Reducers that fold combined executor outputs into one facet value.

use crate::control::{Extras, Hints, Messages};

use super::Hint;

/// OR every hint into a map keyed by hint name.
///
/// A key that is already true stays true regardless of later entries.
pub fn reduce_hints(entries: Vec<Hint>) -> Hints {
    let mut hints = Hints::new();
    for (key, flag) in entries {
        let slot = hints.entry(key).or_insert(false);
        *slot = *slot || flag;
    }
    hints
}

/// Overwrite-merge partial extras maps in order.
pub fn merge_extras(partials: Vec<Extras>) -> Extras {
    let mut extras = Extras::new();
    for partial in partials {
        extras.extend(partial);
    }
    extras
}

/// Shallow-merge every non-null message map.
///
/// Returns `None` when no entry produced messages. Later entries overwrite
/// earlier ones with the same key.
pub fn merge_messages(entries: Vec<Option<Messages>>) -> Option<Messages> {
    let mut present = entries.into_iter().flatten().peekable();
    present.peek()?;

    let mut merged = Messages::new();
    for messages in present {
        merged.extend(messages);
    }
    Some(merged)
}

/// True if any entry is true.
pub fn any_true(entries: Vec<bool>) -> bool {
    entries.into_iter().any(|flag| flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Message;
    use serde_json::json;

    #[test]
    fn hints_are_ored_per_key() {
        let hints = reduce_hints(vec![
            ("visible".into(), true),
            ("visible".into(), false),
            ("readonly".into(), false),
        ]);
        assert_eq!(hints.get("visible"), Some(&true));
        assert_eq!(hints.get("readonly"), Some(&false));
        assert_eq!(hints.len(), 2);
    }

    #[test]
    fn extras_later_partials_overwrite() {
        let mut first = Extras::new();
        first.insert("label".into(), json!("Name"));
        first.insert("width".into(), json!(3));
        let mut second = Extras::new();
        second.insert("label".into(), json!("Full name"));

        let extras = merge_extras(vec![first, second]);
        assert_eq!(extras.get("label"), Some(&json!("Full name")));
        assert_eq!(extras.get("width"), Some(&json!(3)));
    }

    #[test]
    fn messages_null_when_nothing_reported() {
        assert_eq!(merge_messages(vec![]), None);
        assert_eq!(merge_messages(vec![None, None]), None);
    }

    #[test]
    fn messages_merge_non_null_entries() {
        let merged = merge_messages(vec![
            Some(Message::keyed("required", "first")),
            None,
            Some(Message::keyed("required", "second")),
            Some(Message::keyed("pattern", "bad format")),
        ])
        .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged["required"].message, "second");
        assert_eq!(merged["pattern"].message, "bad format");
    }

    #[test]
    fn empty_message_map_still_counts() {
        assert_eq!(merge_messages(vec![Some(Messages::new())]), Some(Messages::new()));
    }

    #[test]
    fn any_true_ors_disablers() {
        assert!(!any_true(vec![]));
        assert!(!any_true(vec![false, false]));
        assert!(any_true(vec![false, true]));
    }
}
