mod common;

use std::collections::BTreeMap;

use common::TestWorkspace;
use proptest::prelude::*;
use table_sync::{
    config::TableTarget,
    data::{Row, Value},
    dataset::{Column, DataType, Dataset},
    engine::merge,
    store::{TableStore, memory::MemoryStore},
};

fn to_dataset(rows: &BTreeMap<i64, (Option<i64>, Option<String>)>) -> Dataset {
    let rows: Vec<Row> = rows
        .iter()
        .map(|(id, (qty, tag))| {
            vec![
                Some(Value::Integer(*id)),
                qty.map(Value::Integer),
                tag.clone().map(Value::Text),
            ]
        })
        .collect();
    Dataset::new(
        vec![
            Column::new("id", DataType::Integer),
            Column::new("qty", DataType::Integer),
            Column::new("tag", DataType::Text),
        ],
        rows,
    )
    .expect("valid dataset")
}

fn table_strategy() -> impl Strategy<Value = BTreeMap<i64, (Option<i64>, Option<String>)>> {
    proptest::collection::btree_map(
        0i64..40,
        (
            proptest::option::of(0i64..3),
            proptest::option::of("[ab]{0,1}"),
        ),
        1..25,
    )
}

proptest! {
    #[test]
    fn merge_partitions_every_key_and_lands_the_batch(
        existing in table_strategy(),
        incoming in table_strategy()
    ) {
        let ws = TestWorkspace::new();
        let target = TableTarget::new(1, "stock");
        let mut store = MemoryStore::new();
        merge(&mut store, &ws.config(), &target, &to_dataset(&existing)).expect("seed");

        let expected_inserted = incoming.keys().filter(|k| !existing.contains_key(k)).count();
        let expected_unchanged = incoming
            .iter()
            .filter(|(k, v)| existing.get(*k) == Some(*v))
            .count();

        let report = merge(&mut store, &ws.config(), &target, &to_dataset(&incoming)).expect("merge");
        prop_assert_eq!(report.total(), incoming.len());
        prop_assert_eq!(report.inserted, expected_inserted);
        prop_assert_eq!(report.unchanged, expected_unchanged);
        prop_assert_eq!(
            report.updated,
            incoming.len() - expected_inserted - expected_unchanged
        );

        let mut combined = existing.clone();
        combined.extend(incoming.clone());
        prop_assert_eq!(store.scan("stock").unwrap(), to_dataset(&combined).rows().to_vec());

        let again = merge(&mut store, &ws.config(), &target, &to_dataset(&incoming)).expect("repeat");
        prop_assert_eq!(again.counts(), (0, 0, incoming.len()));
        prop_assert!(ws.staged_files().is_empty());
    }
}
