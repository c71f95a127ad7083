use std::fs;
use std::sync::Arc;

use harvester_engine::{
    MergeError, MergeOutcome, Merger, OutputArtifact, StagedResult, StagingStore,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

async fn stage(store: &StagingStore, url: &str, body: &[u8]) -> StagedResult {
    let mut handle = store.open(url, Some("application/json".to_string())).unwrap();
    store.write(&mut handle, body).await.unwrap();
    store.finalize(handle).await.unwrap()
}

fn setup(keep_unparsed: bool) -> (TempDir, StagingStore, Merger) {
    let temp = TempDir::new().unwrap();
    let store = StagingStore::in_dir(temp.path().join("staging")).unwrap();
    let artifact = Arc::new(OutputArtifact::create(temp.path().join("out/results.jsonl")).unwrap());
    (temp, store, Merger::new(artifact, keep_unparsed))
}

#[tokio::test]
async fn merge_appends_one_complete_line() {
    let (temp, store, merger) = setup(false);
    let staged = stage(&store, "https://a.test", br#"{"k":1}"#).await;

    let outcome = merger.merge(&staged).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged));

    let path = merger.artifact().close().await.unwrap();
    assert_eq!(path, temp.path().join("out/results.jsonl"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "{\"url\":\"https://a.test\",\"content\":{\"k\":1}}\n"
    );
}

#[tokio::test]
async fn merging_the_same_staged_result_twice_appends_twice() {
    let (_temp, store, merger) = setup(false);
    let staged = stage(&store, "https://a.test", b"[1,2]").await;

    merger.merge(&staged).await.unwrap();
    merger.merge(&staged).await.unwrap();

    let path = merger.artifact().close().await.unwrap();
    let content = fs::read_to_string(path).unwrap();
    assert_eq!(content.lines().count(), 2);
    assert!(content.lines().all(|l| l == r#"{"url":"https://a.test","content":[1,2]}"#));
}

#[tokio::test]
async fn unparseable_body_is_dropped_without_touching_the_artifact() {
    let (_temp, store, merger) = setup(false);
    let staged = stage(&store, "https://bad.test", b"<html>not json</html>").await;

    let outcome = merger.merge(&staged).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Unparsed(_)));

    let path = merger.artifact().close().await.unwrap();
    assert_eq!(fs::read_to_string(path).unwrap(), "");
}

#[tokio::test]
async fn kept_unparsed_body_omits_content() {
    let (_temp, store, merger) = setup(true);
    let staged = stage(&store, "https://bad.test", b"").await;

    let outcome = merger.merge(&staged).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Unparsed(_)));

    let path = merger.artifact().close().await.unwrap();
    assert_eq!(
        fs::read_to_string(path).unwrap(),
        "{\"url\":\"https://bad.test\"}\n"
    );
}

#[tokio::test]
async fn batch_merge_reports_each_item() {
    let (_temp, store, merger) = setup(false);
    let batch = vec![
        stage(&store, "https://a.test", br#"{"a":true}"#).await,
        stage(&store, "https://b.test", b"{broken").await,
        stage(&store, "https://c.test", br#""text""#).await,
    ];

    let outcome = merger.merge_batch(&batch).await;
    assert_eq!(outcome.merged, vec!["https://a.test", "https://c.test"]);
    assert_eq!(outcome.unparsed.len(), 1);
    assert_eq!(outcome.unparsed[0].0, "https://b.test");
    assert!(outcome.failed.is_none());

    let path = merger.artifact().close().await.unwrap();
    let content = fs::read_to_string(path).unwrap();
    assert_eq!(
        content,
        "{\"url\":\"https://a.test\",\"content\":{\"a\":true}}\n{\"url\":\"https://c.test\",\"content\":\"text\"}\n"
    );
}

#[tokio::test]
async fn append_after_close_is_reported_as_merge_failure() {
    let (_temp, store, merger) = setup(false);
    let staged = stage(&store, "https://a.test", b"1").await;
    merger.artifact().close().await.unwrap();

    let err = merger.merge(&staged).await.unwrap_err();
    assert!(matches!(err, MergeError::Closed));

    let outcome = merger.merge_batch(std::slice::from_ref(&staged)).await;
    assert!(outcome.merged.is_empty());
    let (lost, err) = outcome.failed.unwrap();
    assert_eq!(lost, vec!["https://a.test"]);
    assert!(matches!(err, MergeError::Closed));
}

#[tokio::test]
async fn close_replaces_previous_output() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("results.jsonl");
    fs::write(&target, "stale\n").unwrap();

    let artifact = OutputArtifact::create(&target).unwrap();
    artifact
        .append_lines(&["{\"url\":\"x\"}\n".to_string()])
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "stale\n");

    artifact.close().await.unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "{\"url\":\"x\"}\n");
    assert!(matches!(artifact.close().await, Err(MergeError::Closed)));
}
