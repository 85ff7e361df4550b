//! Integration tests for the server-backed providers.
//!
//! Each test needs a reachable server and is ignored by default. Run with
//! `cargo test --test server_test -- --ignored` after exporting the matching
//! connection variable:
//!
//! - `POLYSTORE_TEST_MONGODB` (replica set required for transactions)
//! - `POLYSTORE_TEST_POSTGRES`
//! - `POLYSTORE_TEST_MYSQL`
//! - `POLYSTORE_TEST_SQLSERVER` (ADO.NET style)

mod helpers;
mod contract;

use polystore::prelude::*;

use helpers::{Article, from_env};

async fn connect(provider: &str, var: &str) -> Option<DataAccess> {
    let access = from_env(provider, var).await;
    if access.is_none() {
        eprintln!("{var} is not set, skipping {provider}");
    }
    access
}

#[tokio::test]
#[ignore = "requires a MongoDB server"]
async fn test_mongodb_empty_collection_and_contract() {
    let Some(access) = connect("MongoDB", "POLYSTORE_TEST_MONGODB").await else {
        return;
    };
    let repo = access.repository::<Article>().await.unwrap();
    assert!(repo.get_all().await.unwrap().is_empty());

    contract::full_contract(&access, false).await;
    access.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_postgresql_contract() {
    let Some(access) = connect("PostgreSQL", "POLYSTORE_TEST_POSTGRES").await else {
        return;
    };
    contract::full_contract(&access, true).await;
    access.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a MySQL server"]
async fn test_mysql_contract() {
    let Some(access) = connect("MySQL", "POLYSTORE_TEST_MYSQL").await else {
        return;
    };
    contract::full_contract(&access, true).await;
    access.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a SQL Server instance"]
async fn test_sql_server_contract() {
    let Some(access) = connect("SqlServer", "POLYSTORE_TEST_SQLSERVER").await else {
        return;
    };
    contract::full_contract(&access, true).await;
    access.close().await.unwrap();
}
