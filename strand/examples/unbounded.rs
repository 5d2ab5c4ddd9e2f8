//! Example: an unbounded channel behaves like a queue; sends never wait and
//! the consumer only suspends once it has drained everything.

use std::time::Duration;

use strand::channel::Channel;
use strand::task::Builder;
use strand::time::delay;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[strand::main(clock = "virtual")]
async fn main() -> strand::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let channel = Channel::unbounded();

    let rx = channel.clone();
    let consumer = Builder::new().name("consumer").spawn(async move {
        let mut total = 0;
        while let Ok(value) = rx.recv().await {
            info!("received {value}");
            total += value;
        }
        Ok(total)
    });

    for burst in 0..3 {
        for i in 0..5 {
            channel.send(burst * 5 + i).await?;
        }
        info!("burst {burst} queued, {} waiting", channel.len());
        delay(Duration::from_secs(1)).await?;
    }
    channel.close();

    info!("total {}", consumer.await?);
    Ok(())
}
