//! Example: two producers and one consumer on a rendezvous channel.
//!
//! Expected output: A1, B1, A done, B done, A2.

use strand::channel::Channel;
use strand::task::Builder;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[strand::main]
async fn main() -> strand::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let channel = Channel::<&'static str>::rendezvous();

    let tx = channel.clone();
    Builder::new().name("producer-a").spawn(async move {
        tx.send("A1").await?;
        tx.send("A2").await?;
        info!("A done");
        Ok(())
    });

    let tx = channel.clone();
    Builder::new().name("producer-b").spawn(async move {
        tx.send("B1").await?;
        info!("B done");
        Ok(())
    });

    let rx = channel.clone();
    Builder::new().name("consumer").spawn(async move {
        for _ in 0..3 {
            let x = rx.recv().await?;
            info!("{x}");
        }
        Ok(())
    });

    Ok(())
}
