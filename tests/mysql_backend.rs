//! Runs the MySQL adapter against a throwaway container.

#![cfg(feature = "mysql")]

mod common;

use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mysql::Mysql;

use cmsbench::backend::Backend;
use cmsbench::backend::mysql::MysqlBackend;
use cmsbench::conf::{BackendConfig, BackendKind};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_mysql_matches_memory_semantics() {
    let container = Mysql::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(3306).await.unwrap();

    // The image starts with only the `test` schema; connect creates ours.
    let config = BackendConfig {
        endpoint: Some(format!("mysql://root@{}:{}", host, port)),
        database: "cms_bench".to_string(),
        batch_size: Some(7),
        ..BackendConfig::for_kind(BackendKind::Mysql)
    };
    let mysql = MysqlBackend::connect(&config).await.unwrap();

    common::assert_matches_memory(&mysql).await;
    common::assert_smaller_tier_replaces_larger(&mysql).await;

    mysql.close().await.unwrap();
    assert!(mysql.count_records().await.is_err());
}
