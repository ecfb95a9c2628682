//! Checks shared by the container-backed adapter tests.

use ahash::AHashSet;

use cmsbench::backend::{Backend, MemoryBackend, RecordCounts};
use cmsbench::core::{LogicalQuery, Q3_STUDENT_IDS};
use cmsbench::runner::prepare_tier;
use cmsbench::testutil::{four_row_dataset, target_course_dataset};

const TIER: usize = 25;

fn sorted(mut ids: Vec<i64>) -> Vec<i64> {
    ids.sort_unstable();
    ids
}

/// Loads the same tier into `backend` and a memory backend and compares
/// every query. Q1 and Q2 carry a LIMIT without an ORDER BY, so only the
/// row count and membership are compared for them.
pub async fn assert_matches_memory(backend: &dyn Backend) {
    let dataset = target_course_dataset(TIER);
    let memory = MemoryBackend::new(3);
    for b in [backend, &memory as &dyn Backend] {
        let counts = prepare_tier(b, &dataset, TIER).await.unwrap();
        assert_eq!(counts.students, TIER, "{}", b.name());
        assert_eq!(counts.assignments, TIER, "{}", b.name());
    }

    let enrolled: AHashSet<i64> = dataset.records().iter().map(|r| r.student_id).collect();
    let submitted: AHashSet<i64> = dataset
        .records()
        .iter()
        .filter(|r| r.submission_status.is_submitted())
        .map(|r| r.student_id)
        .collect();

    for (query, eligible) in [(LogicalQuery::Q1, &enrolled), (LogicalQuery::Q2, &submitted)] {
        let got = backend.run_query(query).await.unwrap().student_ids();
        let want = memory.run_query(query).await.unwrap().student_ids();
        assert_eq!(got.len(), want.len(), "{}", query);
        assert!(got.iter().all(|id| eligible.contains(id)), "{}: {:?}", query, got);
        assert_eq!(
            got.iter().collect::<AHashSet<_>>().len(),
            got.len(),
            "{} repeats a student",
            query
        );
    }

    let before = sorted(backend.run_query(LogicalQuery::Q4).await.unwrap().student_ids());
    assert_eq!(
        before,
        sorted(memory.run_query(LogicalQuery::Q4).await.unwrap().student_ids())
    );
    assert!(!before.contains(&Q3_STUDENT_IDS[0]));

    let q3 = backend.run_query(LogicalQuery::Q3).await.unwrap();
    let want_q3 = memory.run_query(LogicalQuery::Q3).await.unwrap();
    assert_eq!(q3.student_ids(), want_q3.student_ids());
    assert!(q3.rows.iter().all(|r| r.score == Some(30)));

    // Q3's write is visible to the next read.
    let after = sorted(backend.run_query(LogicalQuery::Q4).await.unwrap().student_ids());
    assert_eq!(
        after,
        sorted(memory.run_query(LogicalQuery::Q4).await.unwrap().student_ids())
    );
    for id in Q3_STUDENT_IDS {
        assert!(after.contains(&id), "{} missing after Q3", id);
    }
}

/// Loading a smaller tier after a larger one leaves only the smaller tier.
pub async fn assert_smaller_tier_replaces_larger(backend: &dyn Backend) {
    prepare_tier(backend, &target_course_dataset(TIER), TIER)
        .await
        .unwrap();
    let counts = prepare_tier(backend, &four_row_dataset(), 4).await.unwrap();
    assert_eq!(
        counts,
        RecordCounts {
            courses: 2,
            students: 4,
            professors: 2,
            assignments: 4,
        }
    );
}
