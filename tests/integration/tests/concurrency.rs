//! Integration test: concurrent submissions against one service.

use futures::future::join_all;
use std::sync::Arc;

use census_core::CensusError;
use census_integration_tests::{in_memory_service, nullifier, open_census, SubmissionBuilder};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identical_nullifiers_accept_exactly_one() {
    let (service, _stores) = in_memory_service().await;
    let service = Arc::new(service);
    let c1 = open_census(&service, "C1").await;

    let tasks = (0..32).map(|_| {
        let service = service.clone();
        let submission = SubmissionBuilder::new(&c1, nullifier(42)).build();
        tokio::spawn(async move { service.submit_proof(&submission).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("task should not panic"))
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(CensusError::DuplicateNullifier { .. })))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(duplicates, 31);

    let audit = service.audit(&c1).await.unwrap();
    assert_eq!(audit.total_members, 1);
    assert!(audit.consistent, "{:?}", audit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_nullifiers_get_dense_indexes() {
    let (service, _stores) = in_memory_service().await;
    let service = Arc::new(service);
    let c1 = open_census(&service, "C1").await;

    let tasks = (0..64u64).map(|n| {
        let service = service.clone();
        let submission = SubmissionBuilder::new(&c1, nullifier(n))
            .age_range((n % 7) as i64)
            .continent(((n / 7) % 7) as i64)
            .build();
        tokio::spawn(async move { service.submit_proof(&submission).await })
    });
    let mut indexes: Vec<u64> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("task should not panic").expect("accepted").index)
        .collect();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..64).collect::<Vec<_>>());

    let stats = service.get_census_stats(&c1).unwrap();
    assert_eq!(stats.total_members, 64);
    assert_eq!(stats.age_distribution.iter().sum::<u64>(), 64);
    assert_eq!(stats.continent_distribution.iter().sum::<u64>(), 64);
    assert!(service.audit(&c1).await.unwrap().consistent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_censuses_progress_independently() {
    let (service, _stores) = in_memory_service().await;
    let service = Arc::new(service);
    let censuses = vec![
        open_census(&service, "A").await,
        open_census(&service, "B").await,
        open_census(&service, "C").await,
    ];

    let mut tasks = Vec::new();
    for census in &censuses {
        for n in 0..10 {
            let service = service.clone();
            let submission = SubmissionBuilder::new(census, nullifier(n)).build();
            tasks.push(tokio::spawn(async move { service.submit_proof(&submission).await }));
        }
    }
    for result in join_all(tasks).await {
        result.expect("task should not panic").expect("accepted");
    }

    for census in &censuses {
        let audit = service.audit(census).await.unwrap();
        assert_eq!(audit.ledger_entries, 10);
        assert!(audit.consistent);
    }
    assert_eq!(service.get_global_stats().total_registrations, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_races_with_submissions() {
    let (service, _stores) = in_memory_service().await;
    let service = Arc::new(service);
    let c1 = open_census(&service, "C1").await;

    let submitters: Vec<_> = (0..20u64)
        .map(|n| {
            let service = service.clone();
            let submission = SubmissionBuilder::new(&c1, nullifier(n)).build();
            tokio::spawn(async move { service.submit_proof(&submission).await })
        })
        .collect();
    let closer = {
        let service = service.clone();
        let c1 = c1.clone();
        tokio::spawn(async move { service.close_census(&c1, None).await })
    };

    let mut accepted = 0u64;
    for result in join_all(submitters).await {
        match result.expect("task should not panic") {
            Ok(_) => accepted += 1,
            Err(CensusError::CensusClosed(_)) => {}
            Err(other) => panic!("unexpected error {}", other),
        }
    }
    closer.await.unwrap().unwrap();

    // Every accepted registration is counted, nothing after the close is.
    let audit = service.audit(&c1).await.unwrap();
    assert_eq!(audit.total_members, accepted);
    assert_eq!(audit.ledger_entries, accepted);
    assert!(audit.consistent);
}
