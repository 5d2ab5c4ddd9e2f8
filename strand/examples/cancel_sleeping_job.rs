//! Example: cancelling a job that is suspended in `delay`.

use std::time::Duration;

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

    let job = Builder::new().name("job").spawn(async {
        for i in 0..1000 {
            info!("I'm sleeping {i} ...");
            delay(Duration::from_millis(500)).await?;
        }
        Ok(())
    });

    delay(Duration::from_millis(1300)).await?;
    info!("I'm tired of waiting!");
    job.cancel_and_join().await?;
    info!("Now I can quit. Job state: {:?}", job.state());

    Ok(())
}
