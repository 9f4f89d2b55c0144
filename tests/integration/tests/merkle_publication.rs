//! Integration test: Merkle roots, inclusion proofs, snapshots and audits.

use std::sync::Arc;
use std::time::Duration;

use census_core::{CensusConfig, CensusError, PipelineConfig, PublicationPolicy};
use census_crypto::{close_message, compute_root, leaf_hash, root_message, verify_proof, KeyPair};
use census_integration_tests::{
    in_memory_service, memory_stores, nullifier, open_census, service_over, tampering_stores,
    SubmissionBuilder,
};
use census_proof::StructuralVerifier;
use census_registry::{CensusService, LeafSnapshot, ServiceConfig};

// =========================================================================
// Audit law and inclusion proofs
// =========================================================================

#[tokio::test]
async fn test_root_recomputes_from_ledger_order() {
    let (service, stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    for n in 0..13 {
        service
            .submit_proof(&SubmissionBuilder::new(&c1, nullifier(n)).build())
            .await
            .unwrap();
    }

    let entries = stores.ledger.entries_from(&c1, 0).await.unwrap();
    let leaves: Vec<_> = entries
        .iter()
        .map(|e| leaf_hash(e.nullifier_hash.as_bytes()))
        .collect();
    let audit = service.audit(&c1).await.unwrap();
    assert_eq!(hex::encode(compute_root(&leaves)), audit.accumulator_root);
    assert_eq!(audit.accumulator_root, audit.recomputed_root);

    for n in 0..13 {
        let proof = service.get_merkle_proof(&c1, &nullifier(n)).await.unwrap();
        assert!(verify_proof(&proof), "proof for identity {} must verify", n);
        assert_eq!(hex::encode(proof.root), audit.accumulator_root);
    }
}

#[tokio::test]
async fn test_proof_for_unknown_nullifier() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    assert!(matches!(
        service.get_merkle_proof(&c1, &nullifier(1)).await,
        Err(CensusError::Validation(_))
    ));
}

#[tokio::test]
async fn test_tampered_ledger_halts_census() {
    let (stores, ledger) = tampering_stores();
    let service = service_over(stores, Arc::new(StructuralVerifier::new())).await;
    let c1 = open_census(&service, "C1").await;
    let c2 = open_census(&service, "C2").await;
    for census in [&c1, &c2] {
        service
            .submit_proof(&SubmissionBuilder::new(census, nullifier(1)).build())
            .await
            .unwrap();
    }

    ledger.set_tampering(true);
    let report = service.reconcile().await;
    assert_eq!(report.failures.len(), 2);
    ledger.set_tampering(false);

    let err = service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(2)).build())
        .await
        .unwrap_err();
    assert!(matches!(err, CensusError::MerkleTree(_)));
    assert!(!service.check_nullifier(&c1, &nullifier(2)).await.unwrap());

    let health = service.health().await;
    assert!(!health.is_healthy());
    assert_eq!(health.halted_censuses.len(), 2);
}

// =========================================================================
// Publication
// =========================================================================

#[tokio::test]
async fn test_published_snapshot_reproduces_root() {
    let (service, stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    for n in 0..6 {
        service
            .submit_proof(&SubmissionBuilder::new(&c1, nullifier(n)).build())
            .await
            .unwrap();
    }

    let census = service.publish_root(&c1).await.unwrap();
    assert_eq!(census.published_leaf_count, 6);
    let reference = census.snapshot_ref.clone().expect("snapshot reference");

    let document = stores
        .snapshots
        .get(&reference)
        .await
        .unwrap()
        .expect("snapshot stored");
    assert_eq!(census_crypto::content_address(&document), reference);

    let snapshot: LeafSnapshot = serde_json::from_slice(&document).unwrap();
    assert_eq!(snapshot.leaf_count, 6);
    let leaves: Vec<_> = snapshot
        .nullifiers
        .iter()
        .map(|n| leaf_hash(n.as_bytes()))
        .collect();
    assert_eq!(compute_root(&leaves), census.merkle_root);
    assert_eq!(snapshot.root, hex::encode(census.merkle_root));
}

#[tokio::test]
async fn test_publisher_follows_pending_threshold() {
    let config = ServiceConfig {
        pipeline: PipelineConfig::default(),
        publication: PublicationPolicy {
            max_pending_registrations: 3,
            max_staleness_secs: 3600,
        },
    };
    let service = CensusService::new(memory_stores(), Arc::new(StructuralVerifier::new()), config)
        .await
        .unwrap();
    let c1 = open_census(&service, "C1").await;
    let publisher = service.publisher();

    for n in 0..2 {
        service
            .submit_proof(&SubmissionBuilder::new(&c1, nullifier(n)).build())
            .await
            .unwrap();
    }
    assert!(publisher.publish_due().await.is_empty());
    assert_eq!(service.get_census(&c1).unwrap().merkle_root, [0u8; 32]);

    service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(2)).build())
        .await
        .unwrap();
    let published = publisher.publish_due().await;
    assert_eq!(published.len(), 1);
    assert!(published[0].1.is_ok());

    let census = service.get_census(&c1).unwrap();
    assert_eq!(census.published_leaf_count, 3);
    assert!(publisher.publish_due().await.is_empty());
}

#[tokio::test]
async fn test_background_publisher_by_staleness() {
    let config = ServiceConfig {
        pipeline: PipelineConfig::default(),
        publication: PublicationPolicy {
            max_pending_registrations: 1000,
            max_staleness_secs: 0,
        },
    };
    let service = CensusService::new(memory_stores(), Arc::new(StructuralVerifier::new()), config)
        .await
        .unwrap();
    let c1 = open_census(&service, "C1").await;
    service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).build())
        .await
        .unwrap();

    let worker = service.publisher().start(Duration::from_millis(20));
    let mut published = 0;
    for _ in 0..100 {
        published = service.get_census(&c1).unwrap().published_leaf_count;
        if published == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    worker.shutdown().await;
    assert_eq!(published, 1);
}

#[tokio::test]
async fn test_published_root_lags_until_publication() {
    let (service, _stores) = in_memory_service().await;
    let c1 = open_census(&service, "C1").await;
    service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(1)).build())
        .await
        .unwrap();
    let first = service.publish_root(&c1).await.unwrap();

    service
        .submit_proof(&SubmissionBuilder::new(&c1, nullifier(2)).build())
        .await
        .unwrap();
    let census = service.get_census(&c1).unwrap();
    assert_eq!(census.merkle_root, first.merkle_root);
    assert_eq!(census.published_leaf_count, 1);
    assert_eq!(census.total_members, 2);
}

// =========================================================================
// Creator authorization
// =========================================================================

#[tokio::test]
async fn test_creator_signed_root_and_close() {
    let (service, _stores) = in_memory_service().await;
    let creator = KeyPair::generate();
    let mut config = CensusConfig::new("Owned", "");
    config.creator = Some(creator.public_key().to_bs58());
    let census = service.create_census(config).await.unwrap();
    service
        .submit_proof(&SubmissionBuilder::new(&census.id, nullifier(1)).build())
        .await
        .unwrap();

    // An externally computed root equal to the accumulator also records coverage.
    let root = hex::decode(service.audit(&census.id).await.unwrap().accumulator_root).unwrap();
    let root: [u8; 32] = root.try_into().unwrap();
    let message = root_message(census.id.as_str(), &hex::encode(root), "");
    assert!(matches!(
        service.update_merkle_root(&census.id, root, None, None).await,
        Err(CensusError::Unauthorized(_))
    ));
    let signature = census_crypto::sign(&message, &creator).to_hex();
    let updated = service
        .update_merkle_root(&census.id, root, None, Some(&signature))
        .await
        .unwrap();
    assert_eq!(updated.merkle_root, root);
    assert_eq!(updated.published_leaf_count, 1);
    assert_eq!(updated.total_members, 1);

    let stranger = KeyPair::generate();
    let forged = census_crypto::sign(&close_message(census.id.as_str()), &stranger).to_bs58();
    assert!(matches!(
        service.close_census(&census.id, Some(&forged)).await,
        Err(CensusError::Unauthorized(_))
    ));
    let signature = census_crypto::sign(&close_message(census.id.as_str()), &creator).to_bs58();
    service
        .close_census(&census.id, Some(&signature))
        .await
        .unwrap();
}
