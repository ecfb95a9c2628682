//! Runs the redis adapter against a throwaway container.

#![cfg(feature = "redis")]

use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::Redis;

use cmsbench::backend::{Backend, MemoryBackend, RecordCounts};
use cmsbench::backend::redis_kv::RedisBackend;
use cmsbench::conf::{BackendConfig, BackendKind};
use cmsbench::core::LogicalQuery;
use cmsbench::runner::prepare_tier;
use cmsbench::testutil::{four_row_dataset, target_course_dataset};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_matches_memory_semantics() {
    let container = Redis::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(6379).await.unwrap();

    let config = BackendConfig {
        endpoint: Some(format!("redis://{}:{}/0", host, port)),
        batch_size: Some(3),
        ..BackendConfig::for_kind(BackendKind::Redis)
    };
    let redis = RedisBackend::connect(&config).await.unwrap();
    let memory = MemoryBackend::new(3);

    let dataset = target_course_dataset(25);
    for backend in [&redis as &dyn Backend, &memory] {
        let counts = prepare_tier(backend, &dataset, 25).await.unwrap();
        assert_eq!(counts.students, 25);
    }

    for query in LogicalQuery::ALL {
        let mut got = redis.run_query(query).await.unwrap().student_ids();
        let mut want = memory.run_query(query).await.unwrap().student_ids();
        if matches!(query, LogicalQuery::Q4) {
            got.sort_unstable();
            want.sort_unstable();
        }
        assert_eq!(got, want, "{}", query);
    }

    // A smaller tier replaces the larger one.
    let counts = prepare_tier(&redis, &four_row_dataset(), 4).await.unwrap();
    assert_eq!(
        counts,
        RecordCounts {
            courses: 2,
            students: 4,
            professors: 2,
            assignments: 4,
        }
    );

    redis.close().await.unwrap();
    assert!(redis.count_records().await.is_err());
}
