//! Example: a computation that never awaits a timer cooperates with
//! cancellation by checking `task::is_active`.

use std::time::{Duration, Instant};

use strand::task::{self, Builder};
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

    let job = Builder::new().name("computation").spawn(async {
        let mut next_print = Instant::now();
        let mut i = 0;

        while task::is_active() {
            if Instant::now() >= next_print {
                info!("I'm sleeping {i} ...");
                i += 1;
                next_print += Duration::from_millis(500);
            }

            if strand::yield_now().await.is_err() {
                break;
            }
        }

        info!("stopped after {i} prints");
        Ok(())
    });

    delay(Duration::from_millis(1300)).await?;
    info!("I'm tired of waiting!");
    job.cancel_and_join().await?;
    info!("Now I can quit.");

    Ok(())
}
