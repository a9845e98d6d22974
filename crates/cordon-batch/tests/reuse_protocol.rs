//! End-to-end coverage of the license reuse protocol through a scripted
//! protection client: single issuance per label, content id convergence,
//! ordered reporting and partial-failure isolation.

use cordon_batch::{BatchHandle, BatchOrchestrator, BatchReport, BatchRequest, FailureKind};
use cordon_config::BatchManifest;
use cordon_events::EventBus;
use cordon_protect::ContentId;
use cordon_telemetry::Metrics;
use cordon_test_support::fixtures::{sample_manifest, temp_root, write_sample_tree};
use cordon_test_support::mocks::MockProtectionClient;
use std::sync::Arc;
use uuid::Uuid;

async fn run_batch(client: &MockProtectionClient, manifest: &BatchManifest) -> BatchReport {
    let orchestrator = BatchOrchestrator::new(
        Arc::new(client.clone()),
        EventBus::with_capacity(256),
        Metrics::new().expect("metrics registry"),
    );
    orchestrator
        .run_batch(
            BatchRequest {
                batch_id: Uuid::new_v4(),
                manifest,
            },
            &BatchHandle::new(),
        )
        .await
}

fn content_id(report: &BatchReport, index: usize) -> ContentId {
    report.results[index]
        .content_id()
        .unwrap_or_else(|| panic!("task {index} should succeed"))
        .clone()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_single_issuance() {
    let root = temp_root().expect("temp root");
    let files = [
        ("f00.txt", "l1"),
        ("f01.txt", "l1"),
        ("f02.txt", "l1"),
        ("f03.txt", "l1"),
        ("f04.txt", "l1"),
        ("f05.txt", "l1"),
        ("f06.txt", "l1"),
        ("f07.txt", "l1"),
        ("f08.txt", "l1"),
        ("f09.txt", "l1"),
        ("f10.txt", "l1"),
        ("f11.txt", "l1"),
    ];
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new();

    let report = run_batch(&client, &manifest).await;

    assert_eq!(report.succeeded(), 12);
    assert_eq!(
        client.issue_count(),
        1,
        "twelve files under one label still issue exactly once"
    );
    assert_eq!(client.apply_count(), 12);
}

#[tokio::test]
async fn same_label_outputs_share_template_content_id() {
    let root = temp_root().expect("temp root");
    let files = [("a.txt", "l1"), ("b.txt", "l1")];
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new();

    let report = run_batch(&client, &manifest).await;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(content_id(&report, 0), content_id(&report, 1));
}

#[tokio::test]
async fn two_labels_three_files_scenario() {
    let root = temp_root().expect("temp root");
    let files = [("a.txt", "l1"), ("b.txt", "l1"), ("c.txt", "l2")];
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new();

    let report = run_batch(&client, &manifest).await;

    assert_eq!(client.issue_count(), 2, "one issuance per distinct label");
    assert_eq!(client.issue_count_for("l1"), 1);
    assert_eq!(client.issue_count_for("l2"), 1);
    assert_eq!(client.apply_count(), 3, "one propagation per file");

    assert_eq!(report.succeeded(), 3);
    assert_eq!(content_id(&report, 0), content_id(&report, 1));
    assert_ne!(content_id(&report, 0), content_id(&report, 2));
}

#[tokio::test]
async fn failed_issuance_fails_all_label_files_without_propagation() {
    let root = temp_root().expect("temp root");
    let files = [("a.txt", "l1"), ("b.txt", "l1")];
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new().fail_issuance_for("l1");

    let report = run_batch(&client, &manifest).await;

    assert_eq!(report.failed(), 2);
    for result in &report.results {
        let error = result.error().expect("task should fail");
        assert_eq!(error.kind(), FailureKind::Issuance);
    }
    assert_eq!(client.issue_count(), 1, "issuance is not retried per file");
    assert_eq!(
        client.apply_count(),
        0,
        "no propagation is attempted for a failed label"
    );
}

#[tokio::test]
async fn partial_issuance_failure_scenario() {
    let root = temp_root().expect("temp root");
    let files = [("a.txt", "l1"), ("c.txt", "l2")];
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new().fail_issuance_for("l2");

    let report = run_batch(&client, &manifest).await;

    assert!(report.results[0].is_success(), "unrelated label proceeds");
    let error = report.results[1].error().expect("l2 task should fail");
    assert_eq!(error.kind(), FailureKind::Issuance);
    assert!(!report.is_total_failure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn report_preserves_input_order() {
    let root = temp_root().expect("temp root");
    let files = [
        ("a.txt", "l1"),
        ("b.txt", "l2"),
        ("c.txt", "l1"),
        ("d.txt", "l3"),
        ("e.txt", "l2"),
    ];
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new();

    let report = run_batch(&client, &manifest).await;

    assert_eq!(report.results.len(), files.len());
    for (result, (name, label)) in report.results.iter().zip(files.iter()) {
        assert_eq!(
            result.task.source_path,
            root.path().join("input").join(name)
        );
        assert_eq!(result.task.label_id.as_str(), *label);
        assert!(result.is_success());
    }
}

#[tokio::test]
async fn rerun_preserves_label_partition_with_new_ids() {
    let root = temp_root().expect("temp root");
    let files = [("a.txt", "l1"), ("b.txt", "l1"), ("c.txt", "l2")];
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new();

    let first = run_batch(&client, &manifest).await;
    let second = run_batch(&client, &manifest).await;

    // The label partition is stable across runs.
    assert_eq!(content_id(&second, 0), content_id(&second, 1));
    assert_ne!(content_id(&second, 0), content_id(&second, 2));

    // A fresh run re-issues, so absolute identifiers change.
    assert_ne!(content_id(&first, 0), content_id(&second, 0));
    assert_eq!(client.issue_count_for("l1"), 2);
    assert_eq!(client.issue_count_for("l2"), 2);
}

#[tokio::test]
async fn transient_commit_failures_recover_within_policy() {
    let root = temp_root().expect("temp root");
    let files = [("a.txt", "l1")];
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new().with_transient_commit_failures(2);

    let report = run_batch(&client, &manifest).await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(client.commit_count(), 3, "two transient failures, one success");
}

#[tokio::test]
async fn corrupted_read_back_surfaces_consistency_violation() {
    let root = temp_root().expect("temp root");
    let files = [("a.txt", "l1")];
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new();
    let output = manifest.output_path_for(&manifest.files[0]);
    client.corrupt_output(output, "cid-divergent");

    let report = run_batch(&client, &manifest).await;

    let error = report.results[0].error().expect("verification should fail");
    assert_eq!(error.kind(), FailureKind::ConsistencyViolation);
}

#[tokio::test]
async fn template_artifacts_are_written_as_audit_records() -> anyhow::Result<()> {
    let root = temp_root()?;
    let files = [("a.txt", "l1"), ("c.txt", "l2")];
    write_sample_tree(root.path(), &files)?;
    let manifest = sample_manifest(root.path(), &files);
    let client = MockProtectionClient::new().with_artifact_writes();

    let report = run_batch(&client, &manifest).await;

    assert_eq!(report.succeeded(), 2);
    for label in ["l1", "l2"] {
        let template = manifest.template_path_for(label);
        assert!(
            template.is_file(),
            "one template artifact per label: {}",
            template.display()
        );
    }
    for result in &report.results {
        assert!(result.task.output_path.is_file());
    }
    Ok(())
}
