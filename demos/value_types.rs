//! Value types example
//!
//! This example demonstrates the coercion rules:
//! - Numeric narrowing and widening
//! - Lenient text parsing
//! - Null handling
//! - Enums, sequences and nested records
//!
//! Run with: cargo run --example value_types

use rust_sql_pool::prelude::*;
use rust_sql_pool::{impl_record_value, sql_enum, TypeConverter, TypeProfile};
use std::collections::BTreeMap;

sql_enum! {
    pub enum Fruit { Apple, Banana, Durian }
}

#[derive(Debug, Default)]
struct Origin {
    country: String,
}

impl Record for Origin {
    fn describe(profile: &mut ProfileBuilder<Self>) {
        profile.field("country", |o: &mut Origin, v: String| o.country = v);
    }
}

impl_record_value!(Origin);

#[derive(Debug)]
struct Crate {
    id: i32,
    fruit: Fruit,
    weights: Vec<f64>,
    label: Option<String>,
    origin: Origin,
}

impl Default for Crate {
    fn default() -> Self {
        Self {
            id: 0,
            fruit: Fruit::Apple,
            weights: Vec::new(),
            label: None,
            origin: Origin::default(),
        }
    }
}

impl Record for Crate {
    fn describe(profile: &mut ProfileBuilder<Self>) {
        profile.field("id", |c: &mut Crate, v: i32| c.id = v);
        profile.field("fruit", |c: &mut Crate, v: Fruit| c.fruit = v);
        profile.field("weights", |c: &mut Crate, v: Vec<f64>| c.weights = v);
        profile.field("label", |c: &mut Crate, v: Option<String>| c.label = v);
        profile.field("origin", |c: &mut Crate, v: Origin| c.origin = v);
    }
}

fn main() -> Result<()> {
    println!("=== Rust SQL Pool - Value Types Example ===\n");

    // Numeric conversions
    println!("1. Numeric conversions...");
    let narrowed: i32 = convert(SqlValue::Long(42))?;
    let widened: f64 = convert(SqlValue::Int(7))?;
    let truthy: bool = convert(SqlValue::Int(7))?;
    let falsy: bool = convert(SqlValue::Int(0))?;
    println!("   Long(42) -> i32: {}", narrowed);
    println!("   Int(7) -> f64: {}", widened);
    println!("   Int(7) -> bool: {}, Int(0) -> bool: {}\n", truthy, falsy);

    // Lenient text parsing
    println!("2. Lenient text parsing...");
    let parsed: i64 = convert(SqlValue::from("12345"))?;
    let garbage: i32 = convert(SqlValue::from("abc"))?;
    let yes: bool = convert(SqlValue::from("TRUE"))?;
    let no: bool = convert(SqlValue::from("yes"))?;
    println!("   \"12345\" -> i64: {}", parsed);
    println!("   \"abc\" -> i32: {} (no error)", garbage);
    println!("   \"TRUE\" -> bool: {}, \"yes\" -> bool: {}\n", yes, no);

    // Null handling
    println!("3. Null handling...");
    let zero: i32 = convert(SqlValue::Null)?;
    let none: Option<i32> = convert(SqlValue::Null)?;
    let empty: String = convert(SqlValue::Null)?;
    println!("   Null -> i32: {}", zero);
    println!("   Null -> Option<i32>: {:?}", none);
    println!("   Null -> String: {:?}\n", empty);

    // Sequences and bytes
    println!("4. Sequences...");
    let text: String = convert(SqlValue::Bytes(b"durian".to_vec()))?;
    let ints: Vec<i32> = convert(SqlValue::List(vec![
        SqlValue::Long(1),
        SqlValue::from("2"),
        SqlValue::Double(3.9),
    ]))?;
    println!("   Bytes -> String: {}", text);
    println!("   List -> Vec<i32>: {:?}\n", ints);

    // Enums
    println!("5. Enums...");
    let by_name: Fruit = convert(SqlValue::from("Banana"))?;
    let ordinal: i32 = convert(Fruit::Durian.into())?;
    println!("   \"Banana\" -> {:?}", by_name);
    println!("   Durian -> i32: {}", ordinal);
    match TypeConverter::convert::<Fruit>("fruit", SqlValue::from("Cherry")) {
        Ok(f) => println!("   \"Cherry\" -> {:?}", f),
        Err(e) => println!("   \"Cherry\" -> error: {}\n", e),
    }

    // Record mapping from named values
    println!("6. Record mapping...");
    let mut origin = BTreeMap::new();
    origin.insert("country".to_string(), SqlValue::from("Malaysia"));
    let record: Crate = TypeProfile::<Crate>::get().populate([
        ("id".to_string(), SqlValue::from("9")),
        ("fruit".to_string(), Fruit::Durian.into()),
        (
            "weights".to_string(),
            SqlValue::Array(vec![SqlValue::Int(2), SqlValue::from("2.5")]),
        ),
        ("label".to_string(), SqlValue::Null),
        ("origin".to_string(), SqlValue::Map(origin)),
        ("unknown".to_string(), SqlValue::Bool(true)),
    ])?;
    println!("   {:?}\n", record);

    // Conversion failure
    println!("7. Conversion failure...");
    match convert::<i32>(SqlValue::Map(BTreeMap::new())) {
        Ok(v) => println!("   Unexpected: {}", v),
        Err(e) => println!("   ✓ {} (recoverable: {})", e, e.is_recoverable()),
    }

    println!("\n=== Example completed successfully ===");
    Ok(())
}
