//! Example: a buffered channel lets the producer run ahead of the consumer
//! until the buffer is full.

use std::time::Duration;

use strand::channel::Channel;
use strand::task::Builder;
use strand::time::delay;
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

    let channel = Channel::buffered(4);

    let tx = channel.clone();
    Builder::new().name("producer").spawn(async move {
        for i in 0..10 {
            info!("sending {i}");
            tx.send(i).await?;
            info!("sent {i}, {} buffered", tx.len());
        }
        tx.close();
        Ok(())
    });

    // Give the producer time to fill the buffer before receiving.
    delay(Duration::from_millis(100)).await?;

    while let Ok(value) = channel.recv().await {
        info!("received {value}");
    }

    Ok(())
}
