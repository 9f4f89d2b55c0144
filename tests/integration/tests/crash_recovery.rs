//! Integration test: accepted registrations survive crashes and outages.
//!
//! The ledger entry is the write-ahead fact; trees, counters and records are
//! replayed from it by reconciliation without ever counting twice.

use std::sync::Arc;
use std::time::Duration;

use census_core::{AgeRange, CensusError, Continent, PipelineConfig, RegistrationStatus};
use census_integration_tests::{
    accept_without_commit, flaky_stores, in_memory_service, nullifier, open_census, service_over,
    slow_ledger_stores, SubmissionBuilder,
};
use census_proof::StructuralVerifier;
use census_registry::{CensusService, ServiceConfig};

// =========================================================================
// Crash between ledger accept and tree append
// =========================================================================

#[tokio::test]
async fn test_reconciliation_replays_accepted_entry_once() {
    let (service, stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).build())
        .await
        .unwrap();

    accept_without_commit(&stores, &c1, nullifier(2), AgeRange::Over65, Continent::Oceania).await;
    assert_eq!(service.get_census(&c1).unwrap().total_members, 1);
    assert!(service.check_nullifier(&c1, &nullifier(2)).await.unwrap());

    let report = service.reconcile().await;
    assert!(report.failures.is_empty());
    assert_eq!(report.leaves_appended, 1);
    assert_eq!(report.members_counted, 1);

    let census = service.get_census(&c1).unwrap();
    assert_eq!(census.total_members, 2);
    assert_eq!(census.age_histogram[AgeRange::Over65.index()], 1);
    assert_eq!(census.continent_histogram[Continent::Oceania.index()], 1);

    // Replaying again changes nothing.
    let second = service.reconcile().await;
    assert!(second.is_clean(), "{:?}", second);
    let audit = service.audit(&c1).await.unwrap();
    assert_eq!(audit.total_members, 2);
    assert_eq!(audit.tree_leaves, 2);
    assert_eq!(audit.verified_records, 2);
    assert!(audit.consistent, "{:?}", audit);
}

#[tokio::test]
async fn test_restart_rebuilds_trees_without_double_counting() {
    let (service, stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    for n in 0..5 {
        service
            .submit_proof(&SubmissionBuilder::new(&c1, nullifier(n)).build())
            .await
            .unwrap();
    }
    let root_before = service.audit(&c1).await.unwrap().accumulator_root;
    accept_without_commit(&stores, &c1, nullifier(99), AgeRange::Under18, Continent::Africa).await;
    drop(service);

    // A new process over the same stores starts with empty trees.
    let restarted = service_over(stores, Arc::new(StructuralVerifier::new())).await;
    let report = restarted.reconcile().await;
    // The rebuild appends every ledger entry; only the crashed one is counted.
    assert_eq!(report.leaves_appended, 6);
    assert_eq!(report.members_counted, 1);

    let audit = restarted.audit(&c1).await.unwrap();
    assert_eq!(audit.total_members, 6);
    assert_eq!(audit.tree_leaves, 6);
    assert_ne!(audit.accumulator_root, root_before);
    assert!(audit.consistent, "{:?}", audit);

    // The replayed identity is a duplicate like any other.
    let err = restarted
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(99)).build())
        .await
        .unwrap_err();
    assert!(matches!(err, census_core::CensusError::DuplicateNullifier { .. }));
}

#[tokio::test]
async fn test_next_submission_completes_outstanding_entries_first() {
    let (service, stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    accept_without_commit(&stores, &c1, nullifier(1), AgeRange::From18To24, Continent::Europe).await;

    let receipt = service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(2)).build())
        .await
        .unwrap();
    assert_eq!(receipt.index, 1);
    assert_eq!(receipt.status, RegistrationStatus::Verified);
    assert_eq!(service.get_census(&c1).unwrap().total_members, 2);
    assert!(service.audit(&c1).await.unwrap().consistent);
}

// =========================================================================
// Outage after the ledger accepted
// =========================================================================

#[tokio::test]
async fn test_record_outage_defers_completion() {
    let (stores, records) = flaky_stores();
    let service = service_over(stores, Arc::new(StructuralVerifier::new())).await;
    let c1 = open_census(&service, "C1").await;

    records.set_failing(true);
    let receipt = service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).build())
        .await
        .expect("an accepted registration is reported even if completion fails");
    assert!(receipt.accepted);
    assert_eq!(receipt.status, RegistrationStatus::Pending);
    assert!(service.check_nullifier(&c1, &nullifier(1)).await.unwrap());
    assert_eq!(service.get_census(&c1).unwrap().total_members, 0);

    // Still failing: reconciliation reports the failure and counts nothing.
    let report = service.reconcile().await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(service.get_census(&c1).unwrap().total_members, 0);

    records.set_failing(false);
    let report = service.reconcile().await;
    assert!(report.failures.is_empty());
    assert_eq!(report.members_counted, 1);

    let audit = service.audit(&c1).await.unwrap();
    assert_eq!(audit.total_members, 1);
    assert_eq!(audit.verified_records, 1);
    assert!(audit.consistent, "{:?}", audit);
}

#[tokio::test]
async fn test_background_reconciler_catches_up() {
    let (service, stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    let worker = service.reconciler().start(Duration::from_millis(20));

    accept_without_commit(&stores, &c1, nullifier(1), AgeRange::From35To44, Continent::Asia).await;

    let mut members = 0;
    for _ in 0..100 {
        members = service.get_census(&c1).unwrap().total_members;
        if members == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    worker.shutdown().await;
    assert_eq!(members, 1);
    assert!(service.audit(&c1).await.unwrap().consistent);
}

#[tokio::test]
async fn test_closed_census_still_completes_accepted_entries() {
    let (service, stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    accept_without_commit(&stores, &c1, nullifier(1), AgeRange::From55To64, Continent::Antarctica).await;
    service.close_census(&c1, None).await.unwrap();

    let report = service.reconcile().await;
    assert_eq!(report.members_counted, 1);
    assert_eq!(service.get_census(&c1).unwrap().total_members, 1);
}

// =========================================================================
// Ledger timeouts
// =========================================================================

#[tokio::test]
async fn test_slow_ledger_write_is_retryable() {
    let config = ServiceConfig {
        pipeline: PipelineConfig {
            ledger_timeout_ms: 50,
            ..PipelineConfig::default()
        },
        ..ServiceConfig::default()
    };
    let service = CensusService::new(
        slow_ledger_stores(Duration::from_millis(500)),
        Arc::new(StructuralVerifier::new()),
        config,
    )
    .await
    .unwrap();
    let c1 = open_census(&service, "C1").await;

    let started = std::time::Instant::now();
    let err = service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).build())
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(matches!(err, CensusError::TransientStorage(_)), "{}", err);
    assert!(err.is_retryable());

    assert!(!service.check_nullifier(&c1, &nullifier(1)).await.unwrap());
    let audit = service.audit(&c1).await.unwrap();
    assert_eq!(audit.total_members, 0);
    assert!(audit.consistent);
}
