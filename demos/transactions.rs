//! Transaction example
//!
//! This example demonstrates transaction management including:
//! - Committing a transfer
//! - Rolling back when a constraint fails
//! - Savepoints inside a transaction
//! - Rollback of a transaction that is dropped unfinished
//!
//! Run with: cargo run --example transactions

use rust_sql_pool::prelude::*;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(1);

fn transfer<C: SqlCallable>(tx: &mut C, from: i64, to: i64, amount: f64) -> Result<()> {
    tx.execute(
        "UPDATE accounts SET balance = balance - ? WHERE id = ?",
        params![amount, from],
    )?;
    tx.execute(
        "UPDATE accounts SET balance = balance + ? WHERE id = ?",
        params![amount, to],
    )?;
    Ok(())
}

fn print_balances(conn: &mut Connection<SqliteConnection>) -> Result<()> {
    println!("   Current balances:");
    for row in conn.query_all("SELECT name, balance FROM accounts ORDER BY id", params![])? {
        println!(
            "   - {}: ${:.2}",
            row.get_string("name").unwrap_or_default(),
            row.get_f64("balance")
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    println!("=== Rust SQL Pool - Transaction Example ===\n");

    let pool = ConnectionPool::from_config(
        SqliteDriver::new(),
        PoolConfig::new(":memory:").with_connections(1),
    )?;
    let mut conn = pool.get(TIMEOUT)?;

    // Create accounts table
    println!("1. Setting up accounts table...");
    conn.execute(
        "CREATE TABLE accounts (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            balance REAL NOT NULL CHECK(balance >= 0)
        )",
        params![],
    )?;
    let accounts = vec![(1, "Alice", 1000.0), (2, "Bob", 500.0), (3, "Charlie", 750.0)];
    let sets: Vec<Vec<SqlValue>> = accounts
        .into_iter()
        .map(|(id, name, balance)| vec![id.into(), name.into(), balance.into()])
        .collect();
    conn.batch_execute_default("INSERT INTO accounts (id, name, balance) VALUES (?, ?, ?)", &sets)?;
    println!("   ✓ Accounts created\n");
    print_balances(&mut conn)?;

    // Successful transaction
    println!("\n2. Successful transaction (Alice -> Bob: $100)");
    let mut tx = conn.begin_transaction(IsolationLevel::Serializable)?;
    transfer(&mut tx, 1, 2, 100.0)?;
    tx.commit()?;
    drop(tx);
    println!("   ✓ Transaction committed");
    print_balances(&mut conn)?;

    // Failed transaction
    println!("\n3. Failed transaction (Bob -> Charlie: $10000)");
    let outcome = conn.with_transaction(IsolationLevel::Serializable, |tx| {
        transfer(tx, 2, 3, 10_000.0)?;
        tx.commit()
    });
    match outcome {
        Ok(()) => println!("   ✗ Unexpected success"),
        Err(e) => println!("   ✓ Rolled back: {}", e),
    }
    print_balances(&mut conn)?;

    // Savepoints
    println!("\n4. Savepoint (Charlie -> Alice: $50, then undo a second transfer)");
    conn.with_transaction(IsolationLevel::Serializable, |tx| {
        transfer(tx, 3, 1, 50.0)?;
        let savepoint = tx.set_savepoint(Some("after_first"))?;
        transfer(tx, 3, 1, 200.0)?;
        tx.rollback_to(&savepoint)?;
        println!("   ✓ Rolled back to savepoint '{}'", savepoint.name());
        tx.commit()
    })?;
    print_balances(&mut conn)?;

    // Dropped transaction
    println!("\n5. Dropped transaction (never committed)");
    {
        let mut tx = conn.begin_transaction(IsolationLevel::ReadCommitted)?;
        transfer(&mut tx, 1, 3, 1.0)?;
        println!("   Dropping transaction without commit...");
    }
    println!(
        "   ✓ Auto-commit restored: {}",
        conn.auto_commit()?
    );
    print_balances(&mut conn)?;

    println!("\n=== Example completed successfully ===");
    Ok(())
}
