//! Integration test: end-to-end registration through the service facade.
//!
//! Covers acceptance, duplicates, closed censuses and boundary rejections,
//! using census-proof, census-ledger and census-registry together.

use census_core::{AgeRange, CensusConfig, CensusError, Continent, RegistrationStatus};
use census_integration_tests::{
    in_memory_service, memory_stores, nullifier, open_census, service_over, CountingVerifier,
    SubmissionBuilder,
};

// =========================================================================
// Acceptance
// =========================================================================

#[tokio::test]
async fn test_valid_proof_is_counted_once() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;

    let submission = SubmissionBuilder::new(&c1, nullifier(1))
        .age_range(2)
        .continent(1)
        .build();
    let receipt = service.submit_proof(&submission).await.expect("accepted");

    assert!(receipt.accepted);
    assert_eq!(receipt.index, 0);
    assert_eq!(receipt.status, RegistrationStatus::Verified);

    let stats = service.get_census_stats(&c1).unwrap();
    assert_eq!(stats.total_members, 1);
    assert_eq!(stats.age_distribution[2], 1);
    assert_eq!(stats.continent_distribution[1], 1);
    assert_eq!(stats.age_distribution.iter().sum::<u64>(), 1);
    assert_eq!(stats.continent_distribution.iter().sum::<u64>(), 1);
}

#[tokio::test]
async fn test_receipt_root_matches_inclusion_proof() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;

    let mut last_root = None;
    for n in 0..4 {
        let receipt = service
            .submit_proof(&SubmissionBuilder::new(&c1, nullifier(n)).build())
            .await
            .unwrap();
        assert_eq!(receipt.index, n);
        last_root = receipt.root;
    }

    let proof = service.get_merkle_proof(&c1, &nullifier(2)).await.unwrap();
    assert!(census_crypto::verify_proof(&proof));
    assert_eq!(Some(hex::encode(proof.root)), last_root);
}

#[tokio::test]
async fn test_check_nullifier_reads_the_ledger() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    assert!(!service.check_nullifier(&c1, &nullifier(7)).await.unwrap());

    service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(7)).build())
        .await
        .unwrap();
    assert!(service.check_nullifier(&c1, &nullifier(7)).await.unwrap());

    let other = open_census(&service, "C2").await;
    assert!(!service.check_nullifier(&other, &nullifier(7)).await.unwrap());
}

// =========================================================================
// Duplicates and lifecycle
// =========================================================================

#[tokio::test]
async fn test_duplicate_nullifier_is_final() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).age_range(2).continent(1).build())
        .await
        .unwrap();

    // A different device and different attributes do not help.
    let again = SubmissionBuilder::new(&c1, nullifier(1))
        .age_range(5)
        .continent(3)
        .build();
    let err = service.submit_proof(&again).await.unwrap_err();
    assert!(matches!(err, CensusError::DuplicateNullifier { .. }));
    assert!(!err.is_retryable());

    let stats = service.get_census_stats(&c1).unwrap();
    assert_eq!(stats.total_members, 1);
    assert_eq!(stats.age_distribution[5], 0);
    assert!(service.audit(&c1).await.unwrap().consistent);
}

#[tokio::test]
async fn test_same_nullifier_in_two_censuses() {
    let (service, _stores) = in_memory_service().await;
    let a = open_census(&service, "A").await;
    let b = open_census(&service, "B").await;

    service
        .submit_proof(&SubmissionBuilder::new(&a, nullifier(1)).build())
        .await
        .unwrap();
    service
        .submit_proof(&SubmissionBuilder::new(&b, nullifier(1)).build())
        .await
        .unwrap();
    assert_eq!(service.get_global_stats().total_registrations, 2);
}

#[tokio::test]
async fn test_closed_census_fails_fast() {
    let verifier = CountingVerifier::accepting();
    let service = service_over(memory_stores(), verifier.clone()).await;
    let c1 = open_census(&service, "C1").await;
    service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).build())
        .await
        .unwrap();
    assert_eq!(verifier.calls(), 1);

    service.close_census(&c1, None).await.unwrap();
    let err = service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(2)).build())
        .await
        .unwrap_err();
    assert!(matches!(err, CensusError::CensusClosed(_)));
    assert_eq!(verifier.calls(), 1, "verifier must not run for a closed census");

    // Statistics stay readable after close.
    assert_eq!(service.get_census_stats(&c1).unwrap().total_members, 1);
    assert_eq!(service.get_global_stats().active_censuses, 0);
}

#[tokio::test]
async fn test_closing_twice_is_rejected() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    service.close_census(&c1, None).await.unwrap();
    let err = service.close_census(&c1, None).await.unwrap_err();
    assert!(matches!(err, CensusError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_unknown_census() {
    let (service, _stores) = in_memory_service().await;
    let missing = census_core::CensusId::new("does-not-exist").unwrap();
    let err = service
        .submit_proof(&SubmissionBuilder::new(&missing, nullifier(1)).build())
        .await
        .unwrap_err();
    assert!(matches!(err, CensusError::CensusNotFound(_)));
    assert!(matches!(
        service.check_nullifier(&missing, &nullifier(1)).await,
        Err(CensusError::CensusNotFound(_))
    ));
}

// =========================================================================
// Boundary validation
// =========================================================================

#[tokio::test]
async fn test_out_of_range_age_rejected_before_verification() {
    let verifier = CountingVerifier::accepting();
    let service = service_over(memory_stores(), verifier.clone()).await;
    let c1 = open_census(&service, "C1").await;

    let err = service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).age_range(99).build())
        .await
        .unwrap_err();
    assert!(matches!(err, CensusError::InvalidProof(_)));
    assert_eq!(verifier.calls(), 0);
    assert!(!service.check_nullifier(&c1, &nullifier(1)).await.unwrap());
}

#[tokio::test]
async fn test_out_of_range_continent_rejected() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    let err = service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).continent(7).build())
        .await
        .unwrap_err();
    assert!(matches!(err, CensusError::InvalidProof(_)));
}

#[tokio::test]
async fn test_stale_timestamp_rejected() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    let an_hour_ago = chrono::Utc::now().timestamp() - 3600;
    let err = service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).timestamp(an_hour_ago).build())
        .await
        .unwrap_err();
    assert!(matches!(err, CensusError::InvalidProof(_)));
}

#[tokio::test]
async fn test_tampered_signals_fail_signature_check() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    let mut submission = SubmissionBuilder::new(&c1, nullifier(1)).age_range(2).build();
    submission.public_signals.age_range = 3;

    let err = service.submit_proof(&submission).await.unwrap_err();
    assert!(matches!(err, CensusError::InvalidSignature));
    assert_eq!(service.get_census_stats(&c1).unwrap().total_members, 0);
}

#[tokio::test]
async fn test_rejected_proof_leaves_no_trace() {
    let verifier = CountingVerifier::rejecting();
    let service = service_over(memory_stores(), verifier.clone()).await;
    let c1 = open_census(&service, "C1").await;

    let err = service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).build())
        .await
        .unwrap_err();
    assert!(matches!(err, CensusError::ProofVerification(_)));
    assert_eq!(verifier.calls(), 1);
    assert!(!service.check_nullifier(&c1, &nullifier(1)).await.unwrap());

    let audit = service.audit(&c1).await.unwrap();
    assert_eq!(audit.ledger_entries, 0);
    assert!(audit.consistent);
}

#[tokio::test]
async fn test_proof_for_other_census_rejected_at_boundary() {
    let verifier = CountingVerifier::accepting();
    let service = service_over(memory_stores(), verifier.clone()).await;
    let c1 = open_census(&service, "C1").await;
    let c2 = open_census(&service, "C2").await;

    // Signals bound to C2, envelope addressed to C1.
    let mut submission = SubmissionBuilder::new(&c2, nullifier(1)).build();
    submission.census_id = c1.to_string();
    let err = service.submit_proof(&submission).await.unwrap_err();
    assert!(matches!(err, CensusError::InvalidProof(_)));
    assert_eq!(verifier.calls(), 0);
    assert!(!service.check_nullifier(&c1, &nullifier(1)).await.unwrap());
}

// =========================================================================
// Census configuration
// =========================================================================

#[tokio::test]
async fn test_minimum_age_bucket() {
    let (service, _stores) = in_memory_service().await;
    let mut config = CensusConfig::new("Seniors", "");
    config.min_age = AgeRange::From55To64 as u8;
    let census = service.create_census(config).await.unwrap();

    let err = service
        .submit_proof(
            &SubmissionBuilder::new(&census.id, nullifier(1))
                .age_range(AgeRange::From45To54 as i64)
                .build(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CensusError::AgeRequirementNotMet { .. }));

    service
        .submit_proof(
            &SubmissionBuilder::new(&census.id, nullifier(2))
                .age_range(AgeRange::Over65 as i64)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(service.get_census_stats(&census.id).unwrap().total_members, 1);
}

#[tokio::test]
async fn test_disabled_location_never_counts_continents() {
    let (service, _stores) = in_memory_service().await;
    let mut config = CensusConfig::new("Private", "");
    config.enable_location = false;
    let census = service.create_census(config).await.unwrap();

    for n in 0..3 {
        service
            .submit_proof(
                &SubmissionBuilder::new(&census.id, nullifier(n))
                    .continent(Continent::SouthAmerica as i64)
                    .build(),
            )
            .await
            .unwrap();
    }
    let stats = service.get_census_stats(&census.id).unwrap();
    assert_eq!(stats.total_members, 3);
    assert_eq!(stats.continent_distribution.iter().sum::<u64>(), 0);
    assert_eq!(stats.age_distribution.iter().sum::<u64>(), 3);
    assert!(service.audit(&census.id).await.unwrap().consistent);
}

#[tokio::test]
async fn test_census_config_limits() {
    let (service, _stores) = in_memory_service().await;
    let long_name = "n".repeat(65);
    assert!(matches!(
        service.create_census(CensusConfig::new(long_name, "")).await,
        Err(CensusError::Validation(_))
    ));
    let mut config = CensusConfig::new("ok", "");
    config.min_age = 7;
    assert!(service.create_census(config).await.is_err());
    assert_eq!(service.list_censuses().len(), 0);
}

#[tokio::test]
async fn test_verify_only_registers_nothing() {
    let verifier = CountingVerifier::accepting();
    let service = service_over(memory_stores(), verifier.clone()).await;
    let c1 = open_census(&service, "C1").await;

    let submission = SubmissionBuilder::new(&c1, nullifier(1)).build();
    assert!(service.verify_proof(&submission).await.unwrap());
    assert!(service.verify_proof(&submission).await.unwrap());
    assert_eq!(verifier.calls(), 2);
    assert!(!service.check_nullifier(&c1, &nullifier(1)).await.unwrap());

    // The verified submission can still be registered afterwards.
    let receipt = service.submit_proof(&submission).await.unwrap();
    assert!(receipt.accepted);
}
