//! Open a database, write a batch, read it back.
//!
//! Run with: cargo run -p ouroboros-idb-memory --example basic_usage

use ouroboros_idb::{Database, Logger, Mode, OpenOptions, StoreConfig};
use ouroboros_idb_memory::MemoryFactory;
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let options = OpenOptions::new().with_logger(Logger::from_subscriber(subscriber));

    let factory = MemoryFactory::new()?;
    let db = Database::open_with(&factory, "shop", 1, options, |up| {
        up.new_store("inventory", None)?;
        let orders = up.new_store(
            "orders",
            Some(&StoreConfig::default().with_key_path("id").with_auto_increment()),
        )?;
        orders.new_index_on("by_customer", "customer")?;
        Ok(())
    })?;

    let tx = db.transaction(&["inventory", "orders"], Mode::ReadWrite)?;
    let inventory = tx.store("inventory")?;
    let orders = tx.store("orders")?;

    let mut batch = inventory.batch();
    batch.put("horses", 20)?;
    batch.put("apples", 10)?;
    batch.wait()?;

    let id = orders.add_value(json!({"customer": "ada", "item": "apples", "qty": 3}))?;
    println!("order stored under {:?}", id);
    tx.commit()?;

    let tx = db.transaction(&["inventory", "orders"], Mode::ReadOnly)?;
    println!("horses: {:?}", tx.store("inventory")?.get("horses")?);
    println!(
        "ada's order: {:?}",
        tx.store("orders")?.index("by_customer")?.get("ada")?
    );

    Ok(())
}
