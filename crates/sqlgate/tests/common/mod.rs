#![allow(dead_code)]

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tempfile::TempDir;

use sqlgate::prelude::*;

const SCHEMA: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER, score REAL, \
     avatar BLOB)",
    "INSERT INTO users VALUES (1, 'alice', 30, 9.5, x'CAFE'), (2, 'bob', NULL, 7.25, NULL), \
     (3, 'carol', 41, 8.0, x'00FF')",
    "CREATE TABLE customers (customer_id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "INSERT INTO customers VALUES (10, 'acme'), (20, 'globex')",
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL, \
     amount REAL NOT NULL)",
    "INSERT INTO orders VALUES (100, 10, 25.0), (101, 10, 12.5), (102, 20, 99.0)",
    "CREATE TABLE secrets (id INTEGER PRIMARY KEY, token TEXT NOT NULL)",
    "INSERT INTO secrets VALUES (1, 'hunter2')",
];

/// A seeded SQLite database in a temporary directory.
pub struct TestDatabase {
    dir: TempDir,
    pub url: String,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("gateway.sqlite3");
        let url = format!("sqlite:{}", path.display());

        let pool = open(&path, true).await;
        for sql in SCHEMA {
            sqlx::query(sql)
                .execute(&pool)
                .await
                .unwrap_or_else(|e| panic!("Failed to seed: {sql}\nError: {e}"));
        }
        pool.close().await;

        Self { dir, url }
    }

    /// Opens an independent pool for inspecting the database.
    pub async fn inspect(&self) -> SqlitePool {
        open(&self.dir.path().join("gateway.sqlite3"), false).await
    }

    /// Row count of every seeded table.
    pub async fn counts(&self) -> Vec<(String, i64)> {
        let pool = self.inspect().await;
        let mut counts = Vec::new();
        for table in ["users", "customers", "orders", "secrets"] {
            let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .expect("Failed to count rows");
            counts.push((table.to_string(), count));
        }
        pool.close().await;
        counts
    }

    pub fn config(&self) -> GatewayConfig {
        GatewayConfig {
            policy: PolicyConfig::default(),
            pool: PoolConfig::default()
                .database_url(self.url.clone())
                .max_connections(2)
                .acquire_timeout_ms(2_000),
        }
    }

    pub async fn gateway(&self) -> QueryGateway {
        self.gateway_with(self.config()).await
    }

    pub async fn gateway_with(&self, config: GatewayConfig) -> QueryGateway {
        QueryGateway::connect(config)
            .await
            .expect("Failed to connect gateway")
    }
}

async fn open(path: &Path, create: bool) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to open SQLite database")
}
