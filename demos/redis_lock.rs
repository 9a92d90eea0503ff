//! Example: Using Redis lease locks
//!
//! Run with: `cargo run --example redis_lock`
//!
//! Requires a Redis server. Set REDIS_URL environment variable
//! or the standard local server is used.

use lease_lock::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lease_lock_core=debug".into()),
        )
        .init();

    let mut builder = RedisLockProvider::builder()
        .ttl_secs(10)
        .retry(RetryPolicy::default().with_max_wait(Duration::from_secs(5)));
    if let Ok(url) = std::env::var("REDIS_URL") {
        builder = builder.url(url);
    }

    println!("Connecting to Redis...");
    let provider = builder.build().await?;

    // Create a lock by key
    let mut lock = provider.create_mutex("example-resource")?;
    println!("Created lock: {} (ttl {:?})", lock.key(), lock.ttl());

    // Critical section, released on every exit path
    lock.scope(async {
        println!("Lock acquired, doing work...");
        tokio::time::sleep(Duration::from_secs(1)).await;
    })
    .await?;
    println!("Lock released");

    // Reentrant use: the nested scope does not wait on its own lock
    let mut ctx = LockContext::new();
    let mut outer = provider.create_reentrant_mutex("example-resource", &ctx)?;
    outer
        .scope(&mut ctx, async |ctx| {
            let mut inner = provider.create_reentrant_mutex("example-resource", ctx)?;
            inner
                .scope(ctx, async |ctx| {
                    println!("Still held: {}", ctx.is_held("example-resource"));
                })
                .await
        })
        .await??;

    Ok(())
}
