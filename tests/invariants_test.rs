//! Quantified invariants: trie round-trip, fuzzy monotonicity, postings
//! append determinism.

use ahash::AHashMap;
use arbor::collection::Collection;
use arbor::index::trie::TermTrie;
use arbor::index::trie_io::{encode_trie, TrieReader};
use arbor::postings::store::PostingsStore;
use arbor::postings::PostingsAddress;

/// Serialize a trie built from `terms` in the given order, with synthetic
/// postings addresses.
fn serialize(dir: &tempfile::TempDir, name: &str, terms: &[&str]) -> TrieReader {
    let mut trie = TermTrie::new();
    for (i, term) in terms.iter().enumerate() {
        trie.insert(term, i as u64);
    }
    let mut addresses = AHashMap::new();
    for (i, (term, _)) in trie.postings_payload().into_iter().enumerate() {
        addresses.insert(term, PostingsAddress::new(i as i64 * 64, 32));
    }
    trie.attach_postings(&addresses);

    let path = dir.path().join(format!("{name}.tri"));
    std::fs::write(&path, encode_trie(&trie).unwrap()).unwrap();
    TrieReader::open(path)
}

#[test]
fn test_trie_round_trip_insertion_order_independent() {
    let dir = tempfile::tempdir().unwrap();
    let orders: [&[&str]; 3] = [
        &["ram", "rambo", "rocky", "raiders", "the", "a"],
        &["the", "rocky", "raiders", "rambo", "ram", "a"],
        &["rocky", "a", "the", "ram", "raiders", "rambo"],
    ];

    let mut enumerations = Vec::new();
    for (i, order) in orders.iter().enumerate() {
        let reader = serialize(&dir, &format!("order{i}"), order);

        // has(t) holds for every inserted term.
        for term in *order {
            assert!(reader.has(term).unwrap().is_some(), "missing {term}");
        }

        // starts_with("") enumerates exactly the set, lexicographically.
        let all: Vec<String> = reader
            .starts_with("")
            .unwrap()
            .into_iter()
            .map(|(term, _)| term)
            .collect();
        let mut expected: Vec<String> = order.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(all, expected);
        enumerations.push(all);
    }

    // Every insertion order produces the same enumeration.
    assert_eq!(enumerations[0], enumerations[1]);
    assert_eq!(enumerations[1], enumerations[2]);
}

#[test]
fn test_fuzzy_monotone_in_edit_budget() {
    let dir = tempfile::tempdir().unwrap();
    let reader = serialize(
        &dir,
        "fuzzy",
        &["raider", "raiders", "rain", "rider", "ride", "rambo"],
    );

    for budget in 0..3u32 {
        let smaller: Vec<String> = reader
            .near("raider", budget)
            .unwrap()
            .into_iter()
            .map(|(term, _, _)| term)
            .collect();
        let larger: Vec<String> = reader
            .near("raider", budget + 1)
            .unwrap()
            .into_iter()
            .map(|(term, _, _)| term)
            .collect();
        for term in &smaller {
            assert!(
                larger.contains(term),
                "'{term}' in budget {budget} but not {}",
                budget + 1
            );
        }
    }
}

#[test]
fn test_near_results_sorted_by_distance() {
    let dir = tempfile::tempdir().unwrap();
    let reader = serialize(&dir, "sorted", &["raiders", "raider", "rain"]);

    let hits = reader.near("raider", 2).unwrap();
    let distances: Vec<u32> = hits.iter().map(|(_, distance, _)| *distance).collect();
    let mut sorted = distances.clone();
    sorted.sort_unstable();
    assert_eq!(distances, sorted);
    assert_eq!(hits[0].0, "raider");
}

#[test]
fn test_postings_append_determinism_under_interleaving() {
    let dir = tempfile::tempdir().unwrap();
    let collection = Collection::open(dir.path(), "interleave").unwrap();
    let store = PostingsStore::open(&collection).unwrap();

    // Two lists, appends interleaved in the same file.
    let a = store.create_list(&[1]).unwrap();
    let b = store.create_list(&[100]).unwrap();
    store.append_to(a.offset, &[2, 3]).unwrap();
    store.append_to(b.offset, &[200]).unwrap();
    store.append_to(a.offset, &[4]).unwrap();
    store.append_to(b.offset, &[300, 400]).unwrap();
    store.append_to(a.offset, &[5]).unwrap();

    let list_a = store.read_list(a.offset).unwrap();
    let list_b = store.read_list(b.offset).unwrap();
    assert_eq!(*list_a, vec![1, 2, 3, 4, 5]);
    assert_eq!(*list_b, vec![100, 200, 300, 400]);
}

#[test]
fn test_postings_restart_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let collection = Collection::open(dir.path(), "restart").unwrap();

    let head = {
        let store = PostingsStore::open(&collection).unwrap();
        let address = store.create_list(&[1, 2, 3]).unwrap();
        store.append_to(address.offset, &[4, 5]).unwrap();
        store.flush().unwrap();
        address.offset
    };

    // Close and reopen; the chain survives.
    let store = PostingsStore::open(&collection).unwrap();
    assert_eq!(*store.read_list(head).unwrap(), vec![1, 2, 3, 4, 5]);
}
