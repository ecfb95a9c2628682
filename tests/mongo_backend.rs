//! Runs the MongoDB adapter against a throwaway container.

#![cfg(feature = "mongodb")]

mod common;

use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;

use cmsbench::backend::Backend;
use cmsbench::backend::mongo::MongoBackend;
use cmsbench::conf::{BackendConfig, BackendKind};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_mongo_matches_memory_semantics() {
    let container = Mongo::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(27017).await.unwrap();

    let config = BackendConfig {
        endpoint: Some(format!("mongodb://{}:{}/", host, port)),
        batch_size: Some(7),
        ..BackendConfig::for_kind(BackendKind::Mongodb)
    };
    let mongo = MongoBackend::connect(&config).await.unwrap();

    common::assert_matches_memory(&mongo).await;
    common::assert_smaller_tier_replaces_larger(&mongo).await;

    mongo.close().await.unwrap();
}
