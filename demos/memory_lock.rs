//! Example: Serializing tasks of one process with the in-memory store
//!
//! Run with: `cargo run --example memory_lock`

use lease_lock::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let provider = Arc::new(MemoryLockProvider::new().with_ttl(Duration::from_secs(5)));

    let mut workers = Vec::new();
    for worker in 0..4 {
        let provider = provider.clone();
        workers.push(tokio::spawn(async move {
            let mut lock = provider.create_mutex("job:42")?;
            lock.scope(async {
                println!("worker {worker} holds job:42");
                tokio::time::sleep(Duration::from_millis(200)).await;
            })
            .await
        }));
    }

    for worker in workers {
        worker.await??;
    }
    println!("all workers done");

    Ok(())
}
