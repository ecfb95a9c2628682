use std::time::Instant;

use log::info;

use crate::backend::{Backend, RecordCounts};
use crate::core::BenchError;
use crate::dataset::Dataset;

/// Replace whatever the backend holds with the first `tier_size` records.
///
/// Returns once loading and index construction are done, so nothing of the
/// load leaks into query timings.
pub async fn prepare_tier(
    backend: &dyn Backend,
    dataset: &Dataset,
    tier_size: usize,
) -> Result<RecordCounts, BenchError> {
    let start = Instant::now();
    backend.reset().await?;
    backend.bulk_load(dataset, tier_size).await?;
    let counts = backend.count_records().await?;
    info!(
        records = tier_size;
        "{} loaded tier in {:.1}s: {} courses, {} students, {} professors, {} assignments",
        backend.name(),
        start.elapsed().as_secs_f64(),
        counts.courses,
        counts.students,
        counts.professors,
        counts.assignments
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::testutil::target_course_dataset;

    #[tokio::test]
    async fn test_reload_after_reset_is_idempotent() {
        let dataset = target_course_dataset(12);
        let backend = MemoryBackend::new(5);

        let first = prepare_tier(&backend, &dataset, 8).await.unwrap();
        let second = prepare_tier(&backend, &dataset, 8).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.students, 8);
    }

    #[tokio::test]
    async fn test_larger_tier_is_superset() {
        let dataset = target_course_dataset(12);
        let backend = MemoryBackend::new(5);

        prepare_tier(&backend, &dataset, 4).await.unwrap();
        let small = backend.student_ids().await;
        prepare_tier(&backend, &dataset, 10).await.unwrap();
        let large = backend.student_ids().await;

        assert_eq!(small.len(), 4);
        assert_eq!(large.len(), 10);
        assert!(small.iter().all(|id| large.contains(id)));
    }

    #[tokio::test]
    async fn test_smaller_tier_replaces_larger() {
        let dataset = target_course_dataset(12);
        let backend = MemoryBackend::new(5);

        prepare_tier(&backend, &dataset, 10).await.unwrap();
        let counts = prepare_tier(&backend, &dataset, 3).await.unwrap();
        assert_eq!(counts.students, 3);
    }
}
