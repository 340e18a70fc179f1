use std::collections::BTreeMap;

use bytes::Bytes;
use proptest::prelude::*;

use crate::test::check_invariants;
use crate::{DnameArt, Key, Path, make_key};

/// A generated wire-format name, kept alongside its raw labels so the model
/// comparator can work from the same source.
#[derive(Debug, Clone)]
struct Name {
    labels: Vec<Vec<u8>>,
}

impl Name {
    fn wire(&self) -> Vec<u8> {
        let mut wire = Vec::new();
        for label in &self.labels {
            wire.push(label.len() as u8);
            wire.extend_from_slice(label);
        }
        wire.push(0);
        wire
    }

    fn key(&self) -> Key {
        make_key(&self.wire()).expect("generated names are legal")
    }
}

fn label_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        // plain hostname labels, the common case
        "[a-z0-9-]{1,12}".prop_map(|s| s.into_bytes()),
        // mixed case exercises the fold
        "[a-zA-Z]{1,8}".prop_map(|s| s.into_bytes()),
        // arbitrary binary labels below the pointer range
        prop::collection::vec(1u8..0xC0, 1..6),
    ]
}

fn name_strategy() -> impl Strategy<Value = Name> {
    prop::collection::vec(label_strategy(), 0..5)
        .prop_map(|labels| Name { labels })
        .prop_filter("wire form fits 255 octets", |name| name.wire().len() <= 255)
}

/// Case-folded, label-reversed comparison straight off the wire labels:
/// canonical DNS order computed without the key transform.
fn canonical_cmp(a: &Name, b: &Name) -> std::cmp::Ordering {
    let fold = |label: &Vec<u8>| -> Vec<u8> { label.iter().map(|c| c.to_ascii_lowercase()).collect() };
    let a_rev: Vec<Vec<u8>> = a.labels.iter().rev().map(fold).collect();
    let b_rev: Vec<Vec<u8>> = b.labels.iter().rev().map(fold).collect();
    a_rev.cmp(&b_rev)
}

proptest! {
    /// The key transform preserves canonical order exactly.
    #[test]
    fn key_order_agrees_with_canonical_order(a in name_strategy(), b in name_strategy()) {
        prop_assert_eq!(canonical_cmp(&a, &b), a.key().cmp(&b.key()));
    }

    /// The tree agrees with a BTreeMap model over the same keys: membership,
    /// values, count, and enumeration order.
    #[test]
    fn tree_agrees_with_model(names in prop::collection::vec(name_strategy(), 1..40)) {
        let mut tree = DnameArt::new();
        let mut model: BTreeMap<Vec<u8>, Bytes> = BTreeMap::new();

        for (i, name) in names.iter().enumerate() {
            let key = name.key();
            let val = Bytes::from(format!("v{i}"));
            tree.insert(&key, val.clone()).expect("unbounded arena");
            model.insert(key.as_bytes().to_vec(), val);
        }

        prop_assert_eq!(tree.len(), model.len());
        for name in &names {
            let key = name.key();
            prop_assert_eq!(tree.lookup(&key), model.get(key.as_bytes()));
        }

        let mut walked: Vec<Vec<u8>> = Vec::new();
        tree.walk(|k, _| walked.push(k.as_bytes().to_vec()));
        let expected: Vec<Vec<u8>> = model.keys().cloned().collect();
        prop_assert_eq!(walked, expected);

        check_invariants(&tree);
    }

    /// Re-running every insert changes nothing structurally, and a lookup
    /// lands on the same slot the insert reported.
    #[test]
    fn make_path_is_idempotent(names in prop::collection::vec(name_strategy(), 1..25)) {
        let mut tree = DnameArt::new();
        for name in &names {
            let mut path = Path::new();
            tree.make_path(&mut path, &name.key()).expect("unbounded arena");
        }
        let before = tree.stats();

        for name in &names {
            let mut path = Path::new();
            tree.make_path(&mut path, &name.key()).expect("second pass");
            let mut found = Path::new();
            tree.find_path(&mut found, &name.key()).expect("present");
            prop_assert_eq!(path.top(), found.top());
        }
        prop_assert_eq!(tree.stats(), before);
    }

    /// Under any arena limit, a failed insert leaves the tree byte-for-byte
    /// where it was.
    #[test]
    fn failed_inserts_change_nothing(names in prop::collection::vec(name_strategy(), 1..15), limit in 1usize..24) {
        let mut tree = DnameArt::with_node_limit(limit);
        for name in &names {
            let key = name.key();
            let entries = tree.nodes.len();
            let before = tree.stats();
            let mut path = Path::new();
            if tree.make_path(&mut path, &key).is_err() {
                prop_assert_eq!(tree.nodes.len(), entries);
                prop_assert_eq!(tree.stats(), before);
            } else {
                let mut found = Path::new();
                prop_assert!(tree.find_path(&mut found, &key).is_ok());
            }
        }
        check_invariants(&tree);
    }
}
