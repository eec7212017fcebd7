//! End-to-end tests of the duplicate-fusing iterator over a real store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use ingot_engine::codec::{decode_key_suffix, encode_key_suffix};
use ingot_engine::{Engine, EngineOptions, EngineState, IterOptions};
use ingot_types::KvPair;
use rand::seq::SliceRandom;
use rand::RngCore;
use tempfile::TempDir;

fn rand_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn pair(key: Vec<u8>, offset: i64) -> KvPair {
    KvPair { key, val: rand_bytes(128), row_id: 1, offset, commit_ts: None }
}

/// Loads `pairs` in shuffled order and returns the engine.
fn load_shuffled(dir: &TempDir, mut pairs: Vec<KvPair>) -> Engine {
    pairs.shuffle(&mut rand::thread_rng());
    let engine = Engine::open(dir.path().join("kv"), EngineOptions::default()).unwrap();
    engine.write_pairs(&pairs, true).unwrap();
    engine
}

/// Fully traverses the duplicate iterator, returning the visible entries.
fn traverse(engine: &Engine) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut iter = engine.new_duplicate_iter(IterOptions::default()).unwrap();
    let mut visible = Vec::new();
    let mut more = iter.first().unwrap();
    while more {
        visible.push((iter.key().to_vec(), iter.value().to_vec()));
        more = iter.next().unwrap();
    }
    iter.close().unwrap();
    visible
}

#[test]
fn unique_keys_produce_no_duplicates() {
    // S1: pairwise distinct 32-byte keys pass through untouched.
    let pairs: Vec<_> = (0..20).map(|i| pair(rand_bytes(32), i * 1234)).collect();
    let mut expected: Vec<_> = pairs.iter().map(|p| (p.key.clone(), p.val.clone())).collect();
    expected.sort();

    let dir = TempDir::new().unwrap();
    let engine = load_shuffled(&dir, pairs);
    let visible = traverse(&engine);

    assert_eq!(visible, expected);
    assert!(engine.duplicate_records().unwrap().is_empty());
}

#[test]
fn doubled_keys_collapse_and_record_both() {
    // S2: 20 keys each appearing twice; the smaller offset survives and both
    // copies land in the duplicates store.
    let mut pairs = Vec::new();
    for i in 1..=20i64 {
        let key = rand_bytes(32);
        pairs.push(pair(key.clone(), i * 1234));
        pairs.push(pair(key, i * 1235));
    }
    let expected_records = pairs.len();
    let mut survivors: Vec<_> = pairs
        .chunks(2)
        .map(|group| {
            let winner = group.iter().min_by_key(|p| p.offset).unwrap();
            (winner.key.clone(), winner.val.clone())
        })
        .collect();
    let losers: Vec<_> = pairs
        .chunks(2)
        .map(|group| {
            let loser = group.iter().max_by_key(|p| p.offset).unwrap();
            (loser.key.clone(), loser.val.clone())
        })
        .collect();
    survivors.sort();

    let dir = TempDir::new().unwrap();
    let engine = load_shuffled(&dir, pairs);
    let visible = traverse(&engine);

    assert_eq!(visible.len(), 20);
    assert_eq!(visible, survivors);

    // Every pair of every collided key is recorded, as full pairs.
    let mut expected_pairs: Vec<_> = survivors
        .iter()
        .cloned()
        .chain(losers.into_iter())
        .collect();
    expected_pairs.sort();
    let mut recorded: Vec<_> = engine
        .duplicate_records()
        .unwrap()
        .into_iter()
        .map(|(encoded, value)| {
            let (key, _, _) = decode_key_suffix(&encoded)
                .expect("collision records keep their full encoded keys");
            (key, value)
        })
        .collect();
    recorded.sort();
    assert_eq!(recorded.len(), expected_records);
    assert_eq!(recorded, expected_pairs);
}

#[test]
fn tripled_keys_record_all_copies() {
    // S3: 10 keys x 3 copies.
    let mut pairs = Vec::new();
    for i in 1..=10i64 {
        let key = rand_bytes(32);
        for step in 0..3 {
            pairs.push(pair(key.clone(), i * 1234 + step));
        }
    }

    let dir = TempDir::new().unwrap();
    let engine = load_shuffled(&dir, pairs);
    let visible = traverse(&engine);

    assert_eq!(visible.len(), 10);
    assert_eq!(engine.duplicate_records().unwrap().len(), 30);
}

#[test]
fn mixed_multiplicities_match_reference_dedup() {
    // Mixed multiplicities: 20 unique, 20 doubled, 10 tripled keys.
    let mut pairs = Vec::new();
    for i in 0..20i64 {
        pairs.push(pair(rand_bytes(32), i * 1234));
    }
    for i in 20..40i64 {
        let key = rand_bytes(32);
        pairs.push(pair(key.clone(), i * 1234));
        pairs.push(pair(key, i * 1235));
    }
    for i in 40..50i64 {
        let key = rand_bytes(32);
        pairs.push(pair(key.clone(), i * 1234));
        pairs.push(pair(key.clone(), i * 1235));
        pairs.push(pair(key, i * 1236));
    }

    // Reference computation over the encoded ordering.
    let mut sorted: Vec<_> = pairs
        .iter()
        .map(|p| (encode_key_suffix(Vec::new(), &p.key, p.row_id, p.offset), p.clone()))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut unique_keys = Vec::new();
    let mut duplicate_count = 0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j].1.key == sorted[i].1.key {
            j += 1;
        }
        unique_keys.push(sorted[i].1.key.clone());
        if j - i > 1 {
            duplicate_count += j - i;
        }
        i = j;
    }

    let dir = TempDir::new().unwrap();
    let engine = load_shuffled(&dir, pairs);

    // First and last land on the smallest and greatest user keys.
    let mut iter = engine.new_duplicate_iter(IterOptions::default()).unwrap();
    assert!(iter.first().unwrap());
    assert_eq!(iter.key(), unique_keys.first().unwrap().as_slice());
    assert!(iter.last().unwrap());
    assert_eq!(iter.key(), unique_keys.last().unwrap().as_slice());
    iter.close().unwrap();

    let visible = traverse(&engine);
    let visible_keys: Vec<_> = visible.into_iter().map(|(k, _)| k).collect();
    assert_eq!(visible_keys, unique_keys);
    assert_eq!(engine.duplicate_records().unwrap().len(), duplicate_count);
}

#[test]
fn empty_engine_has_no_first_or_last() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path().join("kv"), EngineOptions::default()).unwrap();
    let mut iter = engine.new_duplicate_iter(IterOptions::default()).unwrap();
    assert!(!iter.first().unwrap());
    assert!(!iter.last().unwrap());
    iter.close().unwrap();
}

#[test]
fn lifecycle_enforces_state_machine() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path().join("kv"), EngineOptions::default()).unwrap();
    engine.write_pairs(&[pair(b"k".to_vec(), 0), pair(b"k".to_vec(), 1)], false).unwrap();

    // Populate the duplicates store, then seal.
    let visible = traverse(&engine);
    assert_eq!(visible.len(), 1);
    assert!(engine.cleanup().is_err(), "cleanup before close must fail");
    engine.close().unwrap();
    assert_eq!(engine.state(), EngineState::Closed);
    assert!(engine.close().is_err(), "transitions are monotonic, close is no exception");

    assert!(engine.new_batch().is_err(), "writes after close must fail");
    assert!(engine.new_iter(IterOptions::default()).is_err());

    engine.mark_imported().unwrap();
    assert!(engine.mark_imported().is_err(), "imported is not re-enterable");
    engine.cleanup().unwrap();
    assert_eq!(engine.state(), EngineState::Cleaned);
    assert!(!dir.path().join("kv").join("duplicates").exists());
}
