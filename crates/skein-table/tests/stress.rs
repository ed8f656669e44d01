//! Stress tests for skein-table
//!
//! These exercise the name tree and FIB at a scale where the hashtable
//! resizes many times, and check that lookups stay correct throughout.

use std::time::Instant;

use skein_core::{FaceId, Name};
use skein_table::{Fib, HashtableOptions, NameTree, RemoveNextHopResult};

fn prefix(i: usize) -> Name {
    format!("/site{}/dept{}/host{}", i % 7, i % 31, i).parse().unwrap()
}

#[test]
fn test_fib_insert_lookup_erase_at_scale() {
    const PREFIX_COUNT: usize = 5_000;

    let options = HashtableOptions::with_size(16);
    let mut tree = NameTree::new(32, options);
    let mut fib = Fib::new();

    let start = Instant::now();
    for i in 0..PREFIX_COUNT {
        let (node, is_new) = fib.insert(&mut tree, &prefix(i)).unwrap();
        assert!(is_new);
        fib.add_or_update_next_hop(&mut tree, node, FaceId(256 + (i % 4) as u64), (i % 10) as u64);
    }
    println!("Inserted {} FIB entries in {:?}", PREFIX_COUNT, start.elapsed());

    assert_eq!(fib.len(), PREFIX_COUNT);
    assert!(tree.n_buckets() > 16, "table should have grown");
    // the load factor stays under the expand threshold after every insert
    assert!(tree.len() as f32 <= 0.5 * tree.n_buckets() as f32);

    let start = Instant::now();
    for i in 0..PREFIX_COUNT {
        let query = prefix(i).append("segment").append_segment(3);
        let entry = fib.find_longest_prefix_match(&tree, &query).unwrap();
        assert_eq!(entry.prefix(), &prefix(i));
    }
    println!("Ran {} longest-prefix matches in {:?}", PREFIX_COUNT, start.elapsed());

    for i in 0..PREFIX_COUNT {
        let node = tree.find_exact_match(&prefix(i)).unwrap();
        let face = FaceId(256 + (i % 4) as u64);
        assert_eq!(fib.remove_next_hop(&mut tree, node, face), RemoveNextHopResult::FibEntryRemoved);
    }

    assert!(fib.is_empty());
    assert!(tree.is_empty());
    assert_eq!(tree.n_buckets(), 16);
}

#[test]
fn test_interleaved_insert_erase_keeps_tree_connected() {
    let mut tree = NameTree::default();
    let mut fib = Fib::new();

    for round in 0..20 {
        for i in 0..200 {
            fib.insert(&mut tree, &prefix(round * 200 + i)).unwrap();
        }
        for i in (0..200).step_by(2) {
            assert!(fib.erase(&mut tree, &prefix(round * 200 + i)));
        }
    }

    assert_eq!(fib.len(), 20 * 100);
    for (id, entry) in tree.iter() {
        match entry.parent() {
            Some(parent) => {
                assert!(tree[parent].children().contains(&id));
                assert!(tree[parent].name().is_prefix_of(entry.name()));
                assert_eq!(tree[parent].name().len() + 1, entry.name().len());
            }
            None => assert!(entry.name().is_empty()),
        }
        assert!(!entry.is_empty(), "{} should have been erased", entry.name());
    }
}

#[test]
fn test_longest_prefix_match_against_brute_force() {
    let mut tree = NameTree::default();
    let mut fib = Fib::new();
    let prefixes: Vec<Name> = ["/", "/a", "/a/b/c", "/a/x", "/b/c", "/b/c/d/e"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    for p in &prefixes {
        fib.insert(&mut tree, p).unwrap();
    }

    let queries = ["/a/b", "/a/b/c/d", "/a/x/y", "/b", "/b/c/d", "/b/c/d/e/f", "/z"];
    for q in queries {
        let q: Name = q.parse().unwrap();
        let expected = prefixes
            .iter()
            .filter(|p| p.is_prefix_of(&q))
            .max_by_key(|p| p.len());
        let found = fib.find_longest_prefix_match(&tree, &q).map(|e| e.prefix());
        assert_eq!(found, expected, "query {q}");
    }
}
