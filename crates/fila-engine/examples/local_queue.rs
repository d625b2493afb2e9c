//! Runs the engine end-to-end on the local simulator: activates the
//! plan, funds the wallet over PIX, submits an order, and watches it
//! move through the queue.
//!
//! ```sh
//! cargo run -p fila-engine --example local_queue
//! ```

use std::sync::Arc;
use std::time::Duration;

use fila_core::{NewOrder, OrderStatus, OrderType};
use fila_engine::{EngineConfig, QueueEngine};
use fila_store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let storage = Arc::new(MemoryStore::new());
    let engine = QueueEngine::new(EngineConfig::default(), storage).await?;
    engine.start_polling();

    engine.set_plan_active(true).await?;
    let topup = engine.create_pix_topup(50_000).await?;
    println!("PIX top-up created, pay with: {}", topup.copy_paste);

    // The simulator auto-approves the payment after a few seconds.
    while engine.wallet().balance_cents == 0 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        engine.topup_status(&topup.id).await?;
    }
    println!("Wallet funded: {} cents", engine.wallet().balance_cents);

    let order = engine
        .create_order(NewOrder {
            order_type: OrderType::Content,
            title: "Instagram launch pack".to_string(),
            summary: "Twelve posts for the store opening".to_string(),
            payload: serde_json::json!({ "tone": "casual", "posts": 12 }),
        })
        .await?;
    let outcome = engine.submit_order(&order.id).await?;
    println!("Submitted: {:?}", outcome.status);

    loop {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let current = engine.order(&order.id).expect("order in snapshot");
        println!(
            "[{}] order is {} (balance {} cents)",
            engine.status().backend,
            current.status,
            engine.wallet().balance_cents
        );
        if current.status == OrderStatus::Completed {
            break;
        }
    }

    for pending in engine.pending_approvals() {
        println!(
            "Pending approval: {} -> {}",
            pending.deliverable.title, pending.deliverable.url
        );
    }

    engine.shutdown().await;
    Ok(())
}
