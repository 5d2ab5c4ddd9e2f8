//! Example: sequential, concurrent and lazily started composition of two
//! suspending computations.

use std::time::Duration;

use strand::task::{self, Builder};
use strand::time::{delay, instrumented};
use strand::{Error, scope};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn do_something_useful_one() -> strand::Result<u32> {
    delay(Duration::from_millis(1000)).await?;
    Ok(13)
}

async fn do_something_useful_two() -> strand::Result<u32> {
    delay(Duration::from_millis(1000)).await?;
    Ok(29)
}

#[strand::main]
async fn main() -> strand::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let (sum, elapsed) = instrumented(async {
        let one = do_something_useful_one().await?;
        let two = do_something_useful_two().await?;
        Ok::<_, Error>(one + two)
    })
    .await;
    info!("The answer is {}, completed in {elapsed:?}", sum?);

    let (sum, elapsed) = instrumented(scope(async {
        let one = task::spawn(do_something_useful_one());
        let two = task::spawn(do_something_useful_two());
        Ok(one.await? + two.await?)
    }))
    .await;
    info!("The answer is {}, concurrently completed in {elapsed:?}", sum?);

    let (sum, elapsed) = instrumented(scope(async {
        let one = Builder::new().lazy().spawn(do_something_useful_one());
        let two = Builder::new().lazy().spawn(do_something_useful_two());
        one.start();
        two.start();
        Ok(one.await? + two.await?)
    }))
    .await;
    info!("The answer is {}, lazily completed in {elapsed:?}", sum?);

    Ok(())
}
