use mkt_document::Document;
use mkt_merge::{merge, KeyedArrays, Patch};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn arrays() -> KeyedArrays {
    KeyedArrays::new()
        .with("goals", "type")
        .with("goals.kpis", "metricName")
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{0,6}".prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn goal() -> impl Strategy<Value = Value> {
    (
        prop_oneof![Just("awareness"), Just("leads"), Just("retention")],
        any::<u8>(),
        prop::collection::vec((prop_oneof![Just("reach"), Just("ctr")], any::<u16>()), 0..3),
    )
        .prop_map(|(kind, priority, kpis)| {
            let kpis: Vec<Value> = kpis
                .into_iter()
                .map(|(name, target)| json!({"metricName": name, "target": target}))
                .collect();
            json!({"type": kind, "priority": priority, "kpis": kpis})
        })
}

fn object_with_prefix(prefix: &'static str) -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-d]", value(), 0..4).prop_map(move |m| {
        m.into_iter()
            .map(|(k, v)| (format!("{prefix}{k}"), v))
            .collect()
    })
}

fn document() -> impl Strategy<Value = Document> {
    (object_with_prefix(""), prop::collection::vec(goal(), 0..4)).prop_map(|(mut map, goals)| {
        map.insert("goals".into(), Value::Array(goals));
        Document::from_map(map)
    })
}

proptest! {
    #[test]
    fn prop_empty_patch_is_identity(doc in document()) {
        let merged = merge(&doc, &Patch::new(), &arrays());
        prop_assert_eq!(merged, doc);
    }

    #[test]
    fn prop_disjoint_patches_commute(
        doc in document(),
        left in object_with_prefix("l_"),
        right in object_with_prefix("r_"),
    ) {
        let left = Patch::from_map(left);
        let right = Patch::from_map(right);

        let lr = merge(&merge(&doc, &left, &arrays()), &right, &arrays());
        let rl = merge(&merge(&doc, &right, &arrays()), &left, &arrays());
        prop_assert_eq!(lr, rl);
    }

    #[test]
    fn prop_keyed_patch_is_stable_on_reapply(
        doc in document(),
        goals in prop::collection::vec(goal(), 0..4),
    ) {
        let patch = Patch::from_json(json!({"goals": goals})).unwrap();
        let once = merge(&doc, &patch, &arrays());
        let twice = merge(&once, &patch, &arrays());
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn prop_keyed_merge_keeps_existing_order(
        doc in document(),
        goals in prop::collection::vec(goal(), 0..4),
    ) {
        let before: Vec<Value> = doc
            .get("goals")
            .and_then(Value::as_array)
            .map(|a| a.iter().map(|g| g["type"].clone()).collect())
            .unwrap_or_default();

        let patch = Patch::from_json(json!({"goals": goals})).unwrap();
        let merged = merge(&doc, &patch, &arrays());
        let after: Vec<Value> = merged
            .get("goals")
            .and_then(Value::as_array)
            .map(|a| a.iter().map(|g| g["type"].clone()).collect())
            .unwrap_or_default();

        prop_assert!(after.len() >= before.len());
        prop_assert_eq!(&after[..before.len()], &before[..]);
    }
}
