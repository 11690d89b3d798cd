//! Upload batches against a recording repository.

mod common;

use std::sync::Arc;

use assetstage_protocol::{
    AssetIdentifier, BatchOutcome, ContentId, ItemResult, UploadReport, UploadStatus,
};
use assetstage_staging::{ImportedAssetTracker, MemoryTracker};
use assetstage_upload::{UploadEvent, UploadExecutor, UploadStage};
use common::{RecordingRepository, project, upload_asset};
use tokio_util::sync::CancellationToken;

fn executor(repo: &Arc<RecordingRepository>, tracker: &Arc<MemoryTracker>) -> UploadExecutor {
    UploadExecutor::new(repo.clone(), tracker.clone()).with_concurrency(1)
}

fn result_of(report: &UploadReport, id: &str) -> ItemResult {
    report
        .item(&ContentId::new(id))
        .map(|item| item.result)
        .expect("item missing from report")
}

#[tokio::test]
async fn uploads_new_assets_and_links_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![
        upload_asset(dir.path(), "a", UploadStatus::Add, &["b"]),
        upload_asset(dir.path(), "b", UploadStatus::Add, &[]),
    ];
    let repo = Arc::new(RecordingRepository::new());
    let tracker = Arc::new(MemoryTracker::new());

    let report = executor(&repo, &tracker)
        .upload(&assets, None, &CancellationToken::new())
        .await;

    assert_eq!(report.outcome, BatchOutcome::Success);
    assert_eq!(report.count(ItemResult::Uploaded), 2);

    let a = report.item(&ContentId::new("a")).unwrap();
    let b = report.item(&ContentId::new("b")).unwrap();
    let a_id = a.identifier.clone().unwrap();
    let b_id = b.identifier.clone().unwrap();
    assert_eq!(a.version_number, Some(1));

    assert_eq!(
        repo.calls_to("update_dependencies"),
        vec![
            format!("update_dependencies {} [{}]", a_id.asset_id, b_id),
            format!("update_dependencies {} []", b_id.asset_id),
        ]
    );
    assert_eq!(repo.calls_to("freeze_version").len(), 2);
    assert!(repo.calls_to("remove_item").is_empty());

    let baseline = tracker.get(&a_id).unwrap();
    assert_eq!(baseline.content_id, ContentId::new("a"));
    assert_eq!(baseline.dependencies, vec![b_id]);
    assert_eq!(baseline.dependency_content_ids, vec![ContentId::new("b")]);
    assert_eq!(baseline.files.len(), 1);
    assert!(!baseline.files[0].checksum.is_empty());
}

#[tokio::test]
async fn override_recycles_the_record_and_drops_stale_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut asset = upload_asset(dir.path(), "a", UploadStatus::Override, &[]);
    asset.existing = Some(AssetIdentifier::new(&project(), "rA", "3"));
    let repo = Arc::new(RecordingRepository::new().with_remote_files("rA", &["a.asset", "old.png"]));
    let tracker = Arc::new(MemoryTracker::new());

    let report = executor(&repo, &tracker)
        .upload(&[asset], None, &CancellationToken::new())
        .await;

    assert_eq!(report.outcome, BatchOutcome::Success);
    let item = report.item(&ContentId::new("a")).unwrap();
    assert_eq!(item.identifier, Some(AssetIdentifier::new(&project(), "rA", "4")));
    assert_eq!(item.version_number, Some(4));

    assert!(repo.calls_to("create_item").is_empty());
    assert_eq!(repo.calls_to("create_unfrozen_version"), vec!["create_unfrozen_version rA"]);
    assert_eq!(repo.calls_to("upload_file"), vec!["upload_file rA a.asset"]);
    assert_eq!(repo.calls_to("remove_file"), vec!["remove_file rA old.png"]);
}

#[tokio::test]
async fn cancellation_rolls_back_every_created_record() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![
        upload_asset(dir.path(), "a", UploadStatus::Add, &[]),
        upload_asset(dir.path(), "b", UploadStatus::Add, &[]),
        upload_asset(dir.path(), "c", UploadStatus::Add, &[]),
    ];
    let cancel = CancellationToken::new();
    let repo = Arc::new(RecordingRepository::new().cancel_on_create(2, cancel.clone()));
    let tracker = Arc::new(MemoryTracker::new());

    let report = executor(&repo, &tracker).upload(&assets, None, &cancel).await;

    assert_eq!(report.outcome, BatchOutcome::Cancelled);
    assert_eq!(result_of(&report, "a"), ItemResult::RolledBack);
    assert_eq!(result_of(&report, "b"), ItemResult::RolledBack);
    assert_eq!(result_of(&report, "c"), ItemResult::NotStarted);

    assert_eq!(repo.calls_to("create_item").len(), 2);
    assert_eq!(
        repo.calls_to("remove_item"),
        vec!["remove_item new-2", "remove_item new-1"]
    );
    assert!(repo.calls_to("upload_file").is_empty());
    assert!(repo.calls_to("freeze_version").is_empty());
    assert!(tracker.is_empty());
}

#[tokio::test]
async fn content_failure_rolls_back_created_and_recycled_records() {
    let dir = tempfile::tempdir().unwrap();
    let a = upload_asset(dir.path(), "a", UploadStatus::Add, &[]);
    let mut b = upload_asset(dir.path(), "b", UploadStatus::Override, &[]);
    b.existing = Some(AssetIdentifier::new(&project(), "rB", "1"));
    let repo = Arc::new(RecordingRepository::new().fail_on("upload_file", "b.asset"));
    let tracker = Arc::new(MemoryTracker::new());

    let report = executor(&repo, &tracker)
        .upload(&[a, b], None, &CancellationToken::new())
        .await;

    match &report.outcome {
        BatchOutcome::Error(message) => assert!(message.contains("injected failure")),
        other => panic!("expected an error outcome, got {other:?}"),
    }
    assert_eq!(result_of(&report, "a"), ItemResult::RolledBack);
    assert_eq!(result_of(&report, "b"), ItemResult::Failed);

    let calls = repo.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        ["remove_unfrozen_version rB 2", "remove_item new-1"]
    );
    assert!(repo.calls_to("freeze_version").is_empty());
    assert!(tracker.is_empty());
}

#[tokio::test]
async fn failed_rollback_keeps_the_original_error() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![
        upload_asset(dir.path(), "a", UploadStatus::Add, &["b"]),
        upload_asset(dir.path(), "b", UploadStatus::Add, &[]),
    ];
    let repo = Arc::new(
        RecordingRepository::new()
            .fail_on("update_dependencies", "new-1")
            .fail_rollback(),
    );
    let tracker = Arc::new(MemoryTracker::new());

    let report = executor(&repo, &tracker)
        .upload(&assets, None, &CancellationToken::new())
        .await;

    match &report.outcome {
        BatchOutcome::Error(message) => {
            assert!(message.contains("injected failure"));
            assert!(!message.contains("rollback refused"));
        }
        other => panic!("expected an error outcome, got {other:?}"),
    }
    assert_eq!(
        repo.calls_to("remove_item"),
        vec!["remove_item new-2", "remove_item new-1"]
    );
    assert_eq!(result_of(&report, "a"), ItemResult::Failed);
    assert_eq!(result_of(&report, "b"), ItemResult::RolledBack);
}

#[tokio::test]
async fn freeze_failure_keeps_already_frozen_versions() {
    let dir = tempfile::tempdir().unwrap();
    let mut recycled = upload_asset(dir.path(), "a", UploadStatus::Override, &[]);
    recycled.existing = Some(AssetIdentifier::new(&project(), "rA", "3"));
    let assets = vec![recycled, upload_asset(dir.path(), "b", UploadStatus::Add, &[])];
    let repo = Arc::new(RecordingRepository::new().fail_on("freeze_version", "new-1"));
    let tracker = Arc::new(MemoryTracker::new());

    let report = executor(&repo, &tracker)
        .upload(&assets, None, &CancellationToken::new())
        .await;

    assert!(matches!(report.outcome, BatchOutcome::Error(_)));
    let calls = repo.calls();
    assert_eq!(
        &calls[calls.len() - 3..],
        ["freeze_version rA", "freeze_version new-1", "remove_item new-1"]
    );
    assert!(repo.calls_to("remove_unfrozen_version").is_empty());

    let a = report.item(&ContentId::new("a")).unwrap();
    assert_eq!(a.result, ItemResult::Committed);
    assert_eq!(a.version_number, Some(4));
    assert_eq!(result_of(&report, "b"), ItemResult::Failed);
    assert!(tracker.is_empty());
}

#[tokio::test]
async fn first_freeze_failure_stops_later_freezes() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![
        upload_asset(dir.path(), "a", UploadStatus::Add, &[]),
        upload_asset(dir.path(), "b", UploadStatus::Add, &[]),
    ];
    let repo = Arc::new(RecordingRepository::new().fail_on("freeze_version", "new-1"));
    let tracker = Arc::new(MemoryTracker::new());

    let report = executor(&repo, &tracker)
        .upload(&assets, None, &CancellationToken::new())
        .await;

    assert!(matches!(report.outcome, BatchOutcome::Error(_)));
    assert_eq!(repo.calls_to("freeze_version"), vec!["freeze_version new-1"]);
    assert_eq!(
        repo.calls_to("remove_item"),
        vec!["remove_item new-2", "remove_item new-1"]
    );
    assert_eq!(result_of(&report, "a"), ItemResult::Failed);
    assert_eq!(result_of(&report, "b"), ItemResult::RolledBack);
}

#[tokio::test]
async fn dangling_dependency_rejects_the_batch_before_any_remote_call() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![upload_asset(dir.path(), "a", UploadStatus::Add, &["ghost"])];
    let repo = Arc::new(RecordingRepository::new());
    let tracker = Arc::new(MemoryTracker::new());

    let report = executor(&repo, &tracker)
        .upload(&assets, None, &CancellationToken::new())
        .await;

    match &report.outcome {
        BatchOutcome::Error(message) => assert!(message.contains("ghost")),
        other => panic!("expected an error outcome, got {other:?}"),
    }
    assert_eq!(result_of(&report, "a"), ItemResult::NotStarted);
    assert!(repo.calls().is_empty());
}

#[tokio::test]
async fn requested_subset_pulls_in_its_dependencies_only() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![
        upload_asset(dir.path(), "a", UploadStatus::Add, &["b"]),
        upload_asset(dir.path(), "b", UploadStatus::Add, &[]),
        upload_asset(dir.path(), "c", UploadStatus::Add, &[]),
    ];
    let repo = Arc::new(RecordingRepository::new());
    let tracker = Arc::new(MemoryTracker::new());

    let requested = [ContentId::new("a")];
    let report = executor(&repo, &tracker)
        .upload(&assets, Some(&requested), &CancellationToken::new())
        .await;

    assert_eq!(report.outcome, BatchOutcome::Success);
    assert_eq!(report.items.len(), 2);
    assert!(report.item(&ContentId::new("c")).is_none());
    assert_eq!(repo.calls_to("create_item"), vec!["create_item A", "create_item B"]);
}

#[tokio::test]
async fn skipped_assets_are_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![
        upload_asset(dir.path(), "a", UploadStatus::Add, &[]),
        upload_asset(dir.path(), "b", UploadStatus::Skip, &[]),
    ];
    let repo = Arc::new(RecordingRepository::new());
    let tracker = Arc::new(MemoryTracker::new());

    let report = executor(&repo, &tracker)
        .upload(&assets, None, &CancellationToken::new())
        .await;

    assert_eq!(report.outcome, BatchOutcome::Success);
    assert_eq!(report.items.len(), 1);
    assert_eq!(repo.calls_to("create_item"), vec!["create_item A"]);
}

#[tokio::test]
async fn events_follow_the_stage_order() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![upload_asset(dir.path(), "a", UploadStatus::Add, &[])];
    let repo = Arc::new(RecordingRepository::new());
    let tracker = Arc::new(MemoryTracker::new());
    let mut uploader = executor(&repo, &tracker);
    let mut events = uploader.take_events().unwrap();
    assert!(uploader.take_events().is_none());

    uploader.upload(&assets, None, &CancellationToken::new()).await;
    drop(uploader);

    let mut started = Vec::new();
    let mut staged = 0;
    let mut uploaded = 0;
    let mut finished = None;
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::StageStarted { stage } => started.push(stage),
            UploadEvent::AssetStaged { .. } => staged += 1,
            UploadEvent::AssetUploaded { .. } => uploaded += 1,
            UploadEvent::Finished { outcome } => finished = Some(outcome),
            UploadEvent::StageCompleted { .. } | UploadEvent::RollingBack { .. } => {}
        }
    }

    assert_eq!(
        started,
        vec![
            UploadStage::Expand,
            UploadStage::CreateRecords,
            UploadStage::ResolveDependencies,
            UploadStage::UploadContent,
            UploadStage::LinkDependencies,
            UploadStage::TrackImports,
        ]
    );
    assert_eq!(staged, 1);
    assert_eq!(uploaded, 1);
    assert_eq!(finished, Some(BatchOutcome::Success));
}
