use std::collections::HashSet;

use bytes::Bytes;
use serde_json::json;

use crate::{
    codec::ContentHash,
    config::SourceOptions,
    host::{
        NodeIdFactory as _,
        local::{LocalFileNodes, MemorySink, NamespacedIds},
    },
    ingest::{IngestError, Ingestor},
    source::Summary,
    store::{
        BlobItem,
        memory::{self, BlobContent},
    },
    value::{RawEntity, TaggedValue},
};

type MemoryIngestor =
    Ingestor<memory::TableClient, memory::BlobClient, MemorySink, NamespacedIds, LocalFileNodes>;

fn ingestor(
    tables: memory::TableClient,
    blobs: memory::BlobClient,
    cwd: &std::path::Path,
) -> MemoryIngestor {
    Ingestor {
        tables,
        blobs,
        sink: MemorySink::new(),
        ids: NamespacedIds::new("azure-graph-source"),
        files: LocalFileNodes::new(cwd),
        cwd: cwd.to_owned(),
    }
}

fn options(value: serde_json::Value) -> SourceOptions {
    serde_json::from_value(value).unwrap()
}

fn entity(partition: &str, row: &str, title: &str) -> RawEntity {
    RawEntity::from([
        ("PartitionKey".to_owned(), Some(TaggedValue::new(partition))),
        ("RowKey".to_owned(), Some(TaggedValue::new(row))),
        ("Title".to_owned(), Some(TaggedValue::new(title))),
        ("Archived".to_owned(), Some(TaggedValue::typed(false, "Edm.Boolean"))),
    ])
}

fn blob(name: &str, md5: &[u8]) -> BlobItem {
    BlobItem {
        content_md5: Some(ContentHash::Bytes(md5.to_vec())),
        blob_type: Some("BlockBlob".into()),
        ..BlobItem::new(name)
    }
}

#[tokio::test]
async fn every_row_lands_once_across_pages() {
    let dir = tempfile::tempdir().unwrap();
    let mut tables = memory::TableClient::new();
    tables
        .push_page("posts", vec![entity("2024", "a", "A"), entity("2024", "b", "B")])
        .push_page("posts", vec![])
        .push_page("posts", vec![entity("2025", "a", "C")])
        .push_page("posts", vec![])
        .push_page("authors", vec![entity("x", "1", "Ann")]);
    let ingestor = ingestor(tables, memory::BlobClient::default(), dir.path());

    let summary = ingestor
        .source_nodes(options(json!({
            "tables": [{"name": "posts", "type": "Post"}, {"name": "authors"}]
        })))
        .await
        .unwrap();
    assert_eq!(
        summary,
        Summary {
            tables: 2,
            rows: 4,
            ..Summary::default()
        }
    );

    let posts = ingestor.sink.of_type("Post");
    let ids = posts.iter().map(|node| node.id.as_str()).collect::<HashSet<_>>();
    assert_eq!(posts.len(), 3);
    assert_eq!(
        ids,
        ["2024/a", "2024/b", "2025/a"]
            .map(|key| ingestor.ids.create_node_id(key))
            .iter()
            .map(String::as_str)
            .collect::<HashSet<_>>()
    );
    assert_eq!(ingestor.sink.of_type("authors").len(), 1);
    assert_eq!(ingestor.sink.of_type("azureTable").len(), 2);
    // Falsy values are normalized away.
    assert_eq!(posts[0].fields["Archived"], serde_json::Value::Null);
}

#[tokio::test]
async fn repeated_passes_produce_identical_digests() {
    let dir = tempfile::tempdir().unwrap();
    let run = |title: &'static str| {
        let path = dir.path().to_owned();
        async move {
            let mut tables = memory::TableClient::new();
            tables.push_page("posts", vec![entity("p", "r", title)]);
            let ingestor = ingestor(tables, memory::BlobClient::default(), &path);
            ingestor
                .source_nodes(options(json!({"tables": [{"name": "posts"}]})))
                .await
                .unwrap();
            ingestor.sink.of_type("posts").remove(0)
        }
    };
    let first = run("hello").await;
    let second = run("hello").await;
    let changed = run("hello!").await;

    assert_eq!(first.id, second.id);
    assert_eq!(first.internal.content, second.internal.content);
    assert_eq!(first.internal.content_digest, second.internal.content_digest);
    assert_eq!(first.id, changed.id);
    assert_ne!(first.internal.content_digest, changed.internal.content_digest);
}

#[tokio::test]
async fn malformed_tables_produce_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut tables = memory::TableClient::new();
    tables.push_page("posts", vec![entity("p", "r", "t")]);
    let mut blobs = memory::BlobClient::default();
    blobs.push_blob("docs", blob("a", &[1]), BlobContent::Data(Bytes::from_static(b"a")));
    let ingestor = ingestor(tables, blobs, dir.path());

    let summary = ingestor
        .source_nodes(options(json!({
            "tables": "not-an-array",
            "containers": [{"name": "docs"}]
        })))
        .await
        .unwrap();
    assert_eq!(summary, Summary::default());
    assert!(ingestor.sink.nodes().is_empty());
}

#[tokio::test]
async fn container_without_mirror_never_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let mut blobs = memory::BlobClient::default();
    blobs
        .push_blob("docs", blob("a.txt", &[1]), BlobContent::Data(Bytes::from_static(b"a")))
        .push_blob("docs", blob("b.txt", &[2]), BlobContent::Data(Bytes::from_static(b"b")))
        .push_blob("docs", blob("c.txt", &[3]), BlobContent::Data(Bytes::from_static(b"c")));
    let ingestor = ingestor(memory::TableClient::new(), blobs, dir.path());

    let summary = ingestor
        .source_nodes(options(json!({"containers": [{"name": "docs"}]})))
        .await
        .unwrap();
    assert_eq!(summary.containers, 1);
    assert_eq!(summary.mirrored, 0);
    assert_eq!(ingestor.sink.of_type("azureBlob").len(), 3);
    assert!(ingestor.sink.of_type("File").is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn failed_download_leaves_a_gap() {
    let dir = tempfile::tempdir().unwrap();
    let mut blobs = memory::BlobClient::default();
    blobs
        .push_blob("docs", blob("a.txt", &[1]), BlobContent::Data(Bytes::from_static(b"alpha")))
        .push_blob(
            "docs",
            blob("b.txt", &[2]),
            BlobContent::Broken(Bytes::from_static(b"be"), "connection reset".into()),
        );
    let ingestor = ingestor(memory::TableClient::new(), blobs, dir.path());

    let summary = ingestor
        .source_nodes(options(json!({
            "containers": [{"name": "docs", "localFolder": "mirror"}]
        })))
        .await
        .unwrap();
    assert_eq!(summary.mirrored, 1);
    assert_eq!(summary.failed_downloads, 1);

    let files = ingestor.sink.of_type("File");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].fields["base"], "a.txt");
    assert_eq!(
        files[0].fields["url"],
        "http://127.0.0.1:10000/devstoreaccount1/docs/a.txt"
    );
    assert_eq!(
        std::fs::read(dir.path().join("mirror/a.txt")).unwrap(),
        b"alpha"
    );
    assert!(!dir.path().join("mirror/b.txt").exists());
    assert_eq!(ingestor.sink.of_type("azureBlob").len(), 2);
}

#[tokio::test]
async fn global_mirror_folder_applies_to_all_containers() {
    let dir = tempfile::tempdir().unwrap();
    let mut blobs = memory::BlobClient::default();
    blobs
        .push_blob("one", blob("x.txt", &[1]), BlobContent::Data(Bytes::from_static(b"1")))
        .push_blob("two", blob("y.txt", &[2]), BlobContent::Data(Bytes::from_static(b"2")));
    let ingestor = ingestor(memory::TableClient::new(), blobs, dir.path());

    let summary = ingestor
        .source_nodes(options(json!({
            "containers": [{"name": "one"}, {"name": "two", "localFolder": "own"}],
            "containerLocalFolder": "shared"
        })))
        .await
        .unwrap();
    assert_eq!(summary.mirrored, 2);
    assert!(dir.path().join("shared/x.txt").exists());
    assert!(dir.path().join("own/y.txt").exists());
}

#[tokio::test]
async fn failing_table_does_not_stop_its_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let mut tables = memory::TableClient::new();
    tables
        .push_failure("broken", "AuthorizationFailure")
        .push_page("healthy", vec![entity("p", "1", "one")])
        .push_page("healthy", vec![])
        .push_page("healthy", vec![entity("p", "2", "two")]);
    let mut blobs = memory::BlobClient::default();
    blobs.push_blob("docs", blob("a", &[1]), BlobContent::Data(Bytes::from_static(b"a")));
    let ingestor = ingestor(tables, blobs, dir.path());

    let error = ingestor
        .source_nodes(options(json!({
            "tables": [{"name": "broken"}, {"name": "healthy"}],
            "containers": [{"name": "docs"}]
        })))
        .await
        .unwrap_err();
    match error {
        IngestError::Query { table, error } => {
            assert_eq!(table, "broken");
            assert_eq!(error, memory::Error::Injected("AuthorizationFailure".into()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ingestor.sink.of_type("healthy").len(), 2);
    assert!(ingestor.sink.of_type("broken").is_empty());
    assert_eq!(ingestor.sink.of_type("azureBlob").len(), 1);
    // Descriptors are emitted for every configured entry.
    assert_eq!(ingestor.sink.of_type("azureTable").len(), 2);
}

#[tokio::test]
async fn failing_container_fails_the_pass() {
    let dir = tempfile::tempdir().unwrap();
    let mut tables = memory::TableClient::new();
    tables.push_page("posts", vec![entity("p", "r", "t")]);
    let ingestor = ingestor(tables, memory::BlobClient::default(), dir.path());

    let error = ingestor
        .source_nodes(options(json!({
            "tables": [{"name": "posts"}],
            "containers": [{"name": "missing"}]
        })))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        IngestError::Listing { ref container, .. } if container == "missing"
    ));
    assert_eq!(ingestor.sink.of_type("posts").len(), 1);
    assert_eq!(ingestor.sink.of_type("azureContainer").len(), 1);
}

#[tokio::test]
async fn nameless_container_entry_keeps_tables() {
    let dir = tempfile::tempdir().unwrap();
    let mut tables = memory::TableClient::new();
    tables.push_page("posts", vec![entity("p", "1", "one"), entity("p", "2", "two")]);
    let mut blobs = memory::BlobClient::default();
    blobs.push_blob("docs", blob("a", &[1]), BlobContent::Data(Bytes::from_static(b"a")));
    let ingestor = ingestor(tables, blobs, dir.path());

    let summary = ingestor
        .source_nodes(options(json!({
            "tables": [{"name": "posts"}],
            "containers": [{"localFolder": "mirror"}, {"name": "docs"}]
        })))
        .await
        .unwrap();
    assert_eq!(
        summary,
        Summary {
            tables: 1,
            rows: 2,
            containers: 1,
            ..Summary::default()
        }
    );
    assert_eq!(ingestor.sink.of_type("posts").len(), 2);
    assert_eq!(ingestor.sink.of_type("azureBlob").len(), 1);
}

#[tokio::test]
async fn rooted_blob_names_are_written_inside_the_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let mut blobs = memory::BlobClient::default();
    blobs
        .push_blob("docs", blob("/rooted.txt", &[1]), BlobContent::Data(Bytes::from_static(b"r")))
        .push_blob("docs", blob("../up.txt", &[2]), BlobContent::Data(Bytes::from_static(b"u")));
    let ingestor = ingestor(memory::TableClient::new(), blobs, dir.path());

    let summary = ingestor
        .source_nodes(options(json!({
            "containers": [{"name": "docs", "localFolder": "mirror"}]
        })))
        .await
        .unwrap();
    assert_eq!(summary.mirrored, 2);
    assert_eq!(std::fs::read(dir.path().join("mirror/rooted.txt")).unwrap(), b"r");
    assert_eq!(std::fs::read(dir.path().join("mirror/up.txt")).unwrap(), b"u");
    assert!(!dir.path().join("up.txt").exists());
}
