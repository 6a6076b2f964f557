use std::collections::BTreeMap;

use aif_model::MemoryChunk;
use chrono::Utc;
use uuid::Uuid;

use super::*;

fn chunk(collection_id: Id, source_file: &str, chunk_index: i64, text: &str, embedding: Vec<f32>) -> MemoryChunk {
    let now = Utc::now();
    MemoryChunk {
        id: Uuid::new_v4(),
        collection_id,
        source_file: source_file.to_string(),
        chunk_index,
        text: text.to_string(),
        embedding,
        metadata: BTreeMap::new(),
        created_at: now,
        updated_at: now,
    }
}

fn temp_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("index.db")).unwrap();
    (store, dir)
}

#[test]
fn create_collection_rejects_duplicates() {
    let (store, _dir) = temp_store();
    store.create_collection("c1", None).unwrap();
    let err = store.create_collection("c1", None).unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
}

#[test]
fn insert_and_fetch_round_trip_chunks() {
    let (mut store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    let chunk = chunk(c.id, "/a.aif-bin", 0, "hello world", vec![1.0, 0.0, 0.0]);
    store.insert_chunk(&chunk).unwrap();

    let fetched = store.get_chunk(chunk.id).unwrap().unwrap();
    assert_eq!(fetched.text, "hello world");
    assert_eq!(fetched.embedding, vec![1.0, 0.0, 0.0]);
}

#[test]
fn embedding_dimension_mismatch_is_rejected() {
    let (mut store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    store.insert_chunk(&chunk(c.id, "/a.aif-bin", 0, "hello", vec![1.0, 0.0])).unwrap();

    let err = store
        .insert_chunk(&chunk(c.id, "/a.aif-bin", 1, "world", vec![1.0, 0.0, 0.0]))
        .unwrap_err();
    assert!(matches!(err, StoreError::DimensionMismatch { expected: 2, got: 3 }));

    // store is unchanged: the mismatched chunk was never committed.
    assert_eq!(store.get_chunks_by_collection(c.id).unwrap().len(), 1);
}

#[test]
fn batch_insert_is_all_or_nothing() {
    let (mut store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    let good = chunk(c.id, "/a.aif-bin", 0, "one", vec![1.0, 0.0]);
    let bad = chunk(c.id, "/a.aif-bin", 1, "two", vec![1.0, 0.0, 0.0]);

    let err = store.insert_chunks(&[good, bad]).unwrap_err();
    assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    assert!(store.get_chunks_by_collection(c.id).unwrap().is_empty());
}

#[test]
fn reingesting_a_source_replaces_its_chunks() {
    let (mut store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    store.insert_chunk(&chunk(c.id, "/a.aif-bin", 0, "v1", vec![1.0])).unwrap();

    store.delete_chunks_by_source("/a.aif-bin").unwrap();
    store.insert_chunks(&[
        chunk(c.id, "/a.aif-bin", 0, "v2-a", vec![1.0]),
        chunk(c.id, "/a.aif-bin", 1, "v2-b", vec![1.0]),
    ]).unwrap();

    let chunks = store.get_chunks_by_source_file("/a.aif-bin").unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "v2-a");
    assert_eq!(chunks[1].text, "v2-b");
}

#[test]
fn cascade_delete_removes_chunks_and_keyword_index() {
    let (mut store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    for i in 0..10 {
        store
            .insert_chunk(&chunk(c.id, "/a.aif-bin", i, &format!("chunk number {i}"), vec![1.0]))
            .unwrap();
    }
    assert!(store.delete_collection("c1").unwrap());
    assert!(store.get_chunks_by_collection(c.id).unwrap().is_empty());
    assert!(store.keyword_search("chunk", None, 10).unwrap().is_empty());
}

#[test]
fn update_collection_stats_recomputes_counts() {
    let (mut store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    store.insert_chunk(&chunk(c.id, "/a.aif-bin", 0, "a", vec![1.0])).unwrap();
    store.insert_chunk(&chunk(c.id, "/a.aif-bin", 1, "b", vec![1.0])).unwrap();
    store.insert_chunk(&chunk(c.id, "/b.aif-bin", 0, "c", vec![1.0])).unwrap();

    store.update_collection_stats(c.id).unwrap();
    let updated = store.get_collection("c1").unwrap().unwrap();
    assert_eq!(updated.chunk_count, 3);
    assert_eq!(updated.file_count, 2);
}

#[test]
fn keyword_search_returns_bm25_ascending_with_a_top_match() {
    let (mut store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    store.insert_chunk(&chunk(c.id, "/a.aif-bin", 0, "apples and bananas", vec![1.0])).unwrap();
    store.insert_chunk(&chunk(c.id, "/a.aif-bin", 1, "oranges only", vec![1.0])).unwrap();

    let hits = store.keyword_search("apples", Some(c.id), 10).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn list_files_groups_and_orders_by_name() {
    let (mut store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    store.insert_chunk(&chunk(c.id, "/b.aif-bin", 0, "x", vec![1.0])).unwrap();
    store.insert_chunk(&chunk(c.id, "/a.aif-bin", 0, "y", vec![1.0])).unwrap();
    store.insert_chunk(&chunk(c.id, "/a.aif-bin", 1, "z", vec![1.0])).unwrap();

    let files = store.list_files(Some(c.id)).unwrap();
    assert_eq!(files, vec![("/a.aif-bin".to_string(), 2), ("/b.aif-bin".to_string(), 1)]);
}

#[test]
fn quotes_in_keyword_query_are_escaped() {
    let (mut store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    store.insert_chunk(&chunk(c.id, "/a.aif-bin", 0, "say \"hello\" now", vec![1.0])).unwrap();
    let hits = store.keyword_search("say \"hello\"", Some(c.id), 10).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn empty_limit_and_empty_query_return_nothing() {
    let (store, _dir) = temp_store();
    let c = store.create_collection("c1", None).unwrap();
    assert!(store.keyword_search("anything", Some(c.id), 0).unwrap().is_empty());
    assert!(store.keyword_search("", Some(c.id), 10).unwrap().is_empty());
}
