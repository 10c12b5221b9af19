//! Engine lifecycle: payload ingestion, locking, deletion, publication
//! atomicity and vacuum.

use arbor::{ArborError, Document, Engine, EngineConfig};

fn make_engine(dir: &tempfile::TempDir) -> Engine {
    Engine::new(EngineConfig::with_data_dir(dir.path())).unwrap()
}

#[test]
fn test_json_payload_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    let payload = br#"[
        {"_id": "0", "title": "rambo", "year": 1982},
        {"_id": "1", "title": "rocky", "year": 1976}
    ]"#;
    engine
        .write_payload("movies", "application/json", payload)
        .unwrap();

    let results = engine.search("movies", "title:'rocky'", 0, 10).unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(
        results.hits[0].document.get("year").and_then(|v| v.as_integer()),
        Some(1976)
    );
}

#[test]
fn test_unknown_media_type_is_not_supported() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    assert!(matches!(
        engine.write_payload("movies", "text/csv", b"a,b"),
        Err(ArborError::NotSupported(_))
    ));
}

#[test]
fn test_malformed_payload_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    assert!(matches!(
        engine.write_payload("movies", "application/json", b"not json"),
        Err(ArborError::Parse(_))
    ));
}

#[test]
fn test_second_writer_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    let session = engine.open_write_session("movies").unwrap();
    assert!(matches!(
        engine.open_write_session("movies"),
        Err(ArborError::ConflictingWrite(_))
    ));
    session.close().unwrap();

    // Lock released; a new session may open.
    let session = engine.open_write_session("movies").unwrap();
    session.close().unwrap();
}

#[test]
fn test_flush_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    let session = engine.open_write_session("movies").unwrap();
    session
        .put(Document::new().add_text("_id", "0").add_text("title", "rambo"))
        .unwrap();
    session.flush().unwrap();
    session.flush().unwrap();
    session.commit().unwrap();

    assert_eq!(engine.search("movies", "title:'rambo'", 0, 10).unwrap().total, 1);
}

#[test]
fn test_put_after_flush_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    let session = engine.open_write_session("movies").unwrap();
    session
        .put(Document::new().add_text("_id", "0").add_text("title", "rambo"))
        .unwrap();
    session.flush().unwrap();

    assert!(session
        .put(Document::new().add_text("_id", "1").add_text("title", "rocky"))
        .is_err());
}

#[test]
fn test_upstream_docid_preserved_as_original() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    engine
        .write(
            "movies",
            vec![Document::new()
                .add_text("_id", "0")
                .add_field("__docid", 999i64)
                .add_text("title", "rambo")],
        )
        .unwrap();

    let results = engine.search("movies", "title:'rambo'", 0, 10).unwrap();
    let doc = &results.hits[0].document;
    assert_eq!(doc.get("_original").and_then(|v| v.as_integer()), Some(999));
    // The engine's own doc id wins the __docid field.
    assert_eq!(doc.get("__docid").and_then(|v| v.as_integer()), Some(0));
}

#[test]
fn test_deleted_documents_disappear() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    engine
        .write(
            "movies",
            vec![
                Document::new().add_text("_id", "0").add_text("title", "rambo"),
                Document::new().add_text("_id", "1").add_text("title", "rambo 2"),
            ],
        )
        .unwrap();

    assert_eq!(engine.search("movies", "title:'rambo'", 0, 10).unwrap().total, 2);
    engine.delete("movies", 0).unwrap();
    let results = engine.search("movies", "title:'rambo'", 0, 10).unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.hits[0].doc_id, 1);
}

#[test]
fn test_unpublished_batch_is_invisible() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    // First batch publishes normally.
    engine
        .write(
            "movies",
            vec![Document::new().add_text("_id", "0").add_text("title", "rambo")],
        )
        .unwrap();

    // Second batch flushes but never commits: no .ix, no visibility.
    {
        let session = engine.open_write_session("movies").unwrap();
        session
            .put(Document::new().add_text("_id", "1").add_text("title", "rambo 2"))
            .unwrap();
        session.flush().unwrap();
    }

    let results = engine.search("movies", "title:'rambo'", 0, 10).unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.hits[0].doc_id, 0);

    // The orphaned index files are dead space until vacuumed.
    assert!(engine.dead_bytes("movies").unwrap() > 0);
    let reclaimed = engine.vacuum("movies").unwrap();
    assert!(reclaimed > 0);
    assert_eq!(engine.dead_bytes("movies").unwrap(), 0);

    // Still searchable after the vacuum.
    assert_eq!(engine.search("movies", "title:'rambo'", 0, 10).unwrap().total, 1);
}

#[test]
fn test_validator_accepts_consistent_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        validate_fields: Some(vec!["title".to_string()]),
        ..EngineConfig::with_data_dir(dir.path())
    };
    let engine = Engine::new(config).unwrap();

    engine
        .write(
            "movies",
            vec![
                Document::new().add_text("_id", "0").add_text("title", "rambo"),
                Document::new().add_text("_id", "1").add_text("title", "rocky"),
            ],
        )
        .unwrap();

    assert_eq!(engine.search("movies", "title:'rocky'", 0, 10).unwrap().total, 1);
}

#[test]
fn test_multiple_collections_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = make_engine(&dir);

    engine
        .write(
            "movies",
            vec![Document::new().add_text("_id", "0").add_text("title", "rambo")],
        )
        .unwrap();
    engine
        .write(
            "books",
            vec![Document::new().add_text("_id", "0").add_text("title", "dune")],
        )
        .unwrap();

    assert_eq!(engine.search("movies", "title:'dune'", 0, 10).unwrap().total, 0);
    assert_eq!(engine.search("books", "title:'dune'", 0, 10).unwrap().total, 1);
}
