//! Basic pool usage example
//!
//! This example demonstrates:
//! - Building a pool from configuration
//! - Creating tables and inserting rows
//! - Querying raw rows and mapping rows onto records
//! - Running pooled work from async code
//!
//! Run with: cargo run --example basic_usage

use rust_sql_pool::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct User {
    id: i64,
    username: String,
    email: String,
    age: i32,
    balance: f64,
    active: bool,
}

impl Record for User {
    fn describe(profile: &mut ProfileBuilder<Self>) {
        profile.field("id", |u: &mut User, v: i64| u.id = v);
        profile.field("username", |u: &mut User, v: String| u.username = v);
        profile.field("email", |u: &mut User, v: String| u.email = v);
        profile.field("age", |u: &mut User, v: i32| u.age = v);
        profile.field("balance", |u: &mut User, v: f64| u.balance = v);
        profile
            .setter("active", |u: &mut User, v: bool| u.active = v)
            .alias("is_active");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Rust SQL Pool - Basic Usage Example ===\n");

    let dir = std::env::temp_dir().join("rust_sql_pool_basic_usage.db");
    let _ = std::fs::remove_file(&dir);

    // Create the pool
    println!("1. Creating pool...");
    let config = PoolConfig::new(dir.to_string_lossy())
        .with_connections(2)
        .with_acquire_timeout(Duration::from_secs(1));
    let pool = Arc::new(ConnectionPool::from_config(SqliteDriver::new(), config)?);
    println!("   ✓ {:?}\n", pool.stats());

    let timeout = pool.acquire_timeout();

    // Create table
    println!("2. Creating table...");
    pool.with_connection(timeout, |conn| {
        conn.execute(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                email TEXT NOT NULL,
                age INTEGER,
                balance REAL,
                is_active INTEGER DEFAULT 1
            )",
            params![],
        )
    })?;
    println!("   ✓ Table created\n");

    // Insert data
    println!("3. Inserting data...");
    let users = vec![
        ("alice", "alice@example.com", 30, 1500.50),
        ("bob", "bob@example.com", 25, 2300.75),
        ("charlie", "charlie@example.com", 35, 980.25),
        ("diana", "diana@example.com", 28, 3200.00),
    ];
    pool.with_connection(timeout, |conn| {
        for (username, email, age, balance) in users {
            let result = conn.execute(
                "INSERT INTO users (username, email, age, balance) VALUES (?, ?, ?, ?)",
                params![username, email, age, balance],
            )?;
            println!("   ✓ Inserted {} as id {}", username, result.id());
        }
        Ok(())
    })?;
    println!();

    // Query raw rows
    println!("4. Querying raw rows...");
    let results = pool.with_connection(timeout, |conn| {
        conn.query_all("SELECT id, username, balance FROM users ORDER BY id", params![])
    })?;
    println!("   Columns: {:?}", results.column_names());
    for row in &results {
        println!(
            "   - #{} {} ({:.2})",
            row.get_i64("id"),
            row.get_string("USERNAME").unwrap_or_default(),
            row.get_f64("balance")
        );
    }
    println!();

    // Map onto records
    println!("5. Mapping rows onto records...");
    let adults: Vec<User> = pool.with_connection(timeout, |conn| {
        conn.query_all_as("SELECT * FROM users WHERE age >= ?", params![28])
    })?;
    for user in &adults {
        println!(
            "   - {} <{}> age {} balance {:.2} active {}",
            user.username, user.email, user.age, user.balance, user.active
        );
    }
    println!();

    // Single row as JSON
    println!("6. Serializing a row...");
    if let Some(row) = pool.with_connection(timeout, |conn| {
        conn.query_row("SELECT * FROM users WHERE username = ?", params!["diana"])
    })? {
        println!("   {}", serde_json::to_string(&row).unwrap_or_default());
    }
    println!();

    // Async access
    println!("7. Querying from async code...");
    let count = pool
        .with_connection_async(timeout, |conn| {
            Ok(conn
                .query_row("SELECT COUNT(*) AS n FROM users", params![])?
                .map(|row| row.get_i64("n"))
                .unwrap_or_default())
        })
        .await?;
    println!("   ✓ {} users\n", count);

    pool.close();
    let _ = std::fs::remove_file(&dir);
    println!("=== Example completed successfully ===");
    Ok(())
}
