//! Example: 100 000 tasks acquire a resource inside a timeout; none of them
//! leaks it.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use strand::task;
use strand::time::{delay, with_timeout};
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Resource {
    acquired: Rc<Cell<i64>>,
}

impl Resource {
    fn acquire(acquired: &Rc<Cell<i64>>) -> Self {
        acquired.set(acquired.get() + 1);
        Self {
            acquired: acquired.clone(),
        }
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        self.acquired.set(self.acquired.get() - 1);
    }
}

fn main() -> strand::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let acquired = Rc::new(Cell::new(0));
    let runtime = strand::RuntimeBuilder::new()
        .clock(strand::Clock::Virtual)
        .build();

    let counter = acquired.clone();
    runtime.block_on(async move {
        for _ in 0..100_000 {
            let counter = counter.clone();
            task::spawn(async move {
                let resource = with_timeout(Duration::from_millis(60), async {
                    delay(Duration::from_millis(50)).await?;
                    Ok(Resource::acquire(&counter))
                })
                .await;

                match resource {
                    Ok(resource) => drop(resource),
                    Err(err) if err.is_timeout() => {}
                    Err(err) => return Err(err),
                }
                Ok(())
            });
        }
        Ok(())
    })?;

    info!("resources still acquired: {}", acquired.get());
    Ok(())
}
