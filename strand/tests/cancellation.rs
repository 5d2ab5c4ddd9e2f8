use strand::task::{self, Builder, JoinHandle, SuspendReason, TaskState};
use strand::time::delay;
use strand::{Clock, Error, RuntimeBuilder};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Sets its flag when dropped.
struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[strand::test]
async fn cancel_sleeping_job() -> strand::Result<()> {
    let ticks = Rc::new(Cell::new(0));

    let counter = ticks.clone();
    let job = task::spawn(async move {
        for _ in 0..1000 {
            counter.set(counter.get() + 1);
            delay(Duration::from_millis(500)).await?;
        }
        Ok(())
    });

    delay(Duration::from_millis(1300)).await?;
    job.cancel_and_join().await?;

    assert_eq!(ticks.get(), 3);
    assert!(matches!(job.state(), TaskState::Cancelled));
    assert!(matches!(job.await, Err(Error::Cancelled)));

    Ok(())
}

#[strand::test]
async fn running_task_observes_is_active() -> strand::Result<()> {
    let spins = Rc::new(Cell::new(0u32));

    let counter = spins.clone();
    let job = task::spawn(async move {
        while task::is_active() {
            counter.set(counter.get() + 1);
            if strand::yield_now().await.is_err() {
                break;
            }
        }
        task::ensure_active()
    });

    for _ in 0..5 {
        strand::yield_now().await?;
    }
    job.cancel_and_join().await?;

    assert!(spins.get() >= 5);
    assert!(matches!(job.state(), TaskState::Cancelled));

    Ok(())
}

#[strand::test]
async fn task_cancelled_before_start_never_runs() -> strand::Result<()> {
    let ran = Rc::new(Cell::new(false));

    let flag = ran.clone();
    let job = task::spawn(async move {
        flag.set(true);
        Ok(())
    });
    job.cancel();
    job.join().await?;

    assert!(!ran.get());
    assert!(matches!(job.state(), TaskState::Cancelled));

    Ok(())
}

#[strand::test]
async fn cancel_reaches_every_descendant() -> strand::Result<()> {
    let children: Rc<RefCell<Vec<JoinHandle<()>>>> = Rc::default();

    let handles = children.clone();
    let parent = task::spawn(async move {
        for _ in 0..3 {
            let grandchildren = handles.clone();
            let child = task::spawn(async move {
                let leaf = task::spawn(delay(Duration::from_secs(60)));
                grandchildren.borrow_mut().push(leaf);
                delay(Duration::from_secs(60)).await
            });
            handles.borrow_mut().push(child);
        }
        delay(Duration::from_secs(60)).await
    });

    delay(Duration::from_secs(1)).await?;
    assert_eq!(children.borrow().len(), 6);

    parent.cancel_and_join().await?;

    assert!(matches!(parent.state(), TaskState::Cancelled));
    for child in children.borrow().iter() {
        assert!(matches!(child.state(), TaskState::Cancelled));
    }
    assert_eq!(strand::time::now(), Duration::from_secs(1));

    Ok(())
}

#[strand::test]
async fn parent_waits_for_children() -> strand::Result<()> {
    let child_done = Rc::new(Cell::new(false));

    let flag = child_done.clone();
    let parent = task::spawn(async move {
        task::spawn(async move {
            delay(Duration::from_millis(200)).await?;
            flag.set(true);
            Ok(())
        });
        Ok("parent body done")
    });

    strand::yield_now().await?;
    assert!(matches!(
        parent.state(),
        TaskState::Suspended(SuspendReason::Children)
    ));

    assert_eq!(parent.await?, "parent body done");
    assert!(child_done.get());
    assert_eq!(strand::time::now(), Duration::from_millis(200));

    Ok(())
}

#[strand::test]
async fn failed_child_cancels_siblings_within_scope() -> strand::Result<()> {
    let sibling_dropped = Rc::new(Cell::new(false));

    let flag = sibling_dropped.clone();
    let result = strand::scope(async move {
        let failing = task::spawn(async {
            delay(Duration::from_millis(10)).await?;
            Err::<(), _>(Error::other("boom"))
        });

        task::spawn(async move {
            let _guard = DropFlag(flag);
            delay(Duration::from_secs(60)).await
        });

        Ok(failing.id())
    })
    .await;

    match result {
        Err(Error::TaskFailed { source, .. }) => assert_eq!(source.to_string(), "boom"),
        other => panic!("scope should fail with the child's error, got {other:?}"),
    }

    assert!(sibling_dropped.get());
    assert_eq!(strand::time::now(), Duration::from_millis(10));

    Ok(())
}

#[test]
fn failed_child_fails_the_parent() {
    let runtime = RuntimeBuilder::new().clock(Clock::Virtual).build();
    let sibling_dropped = Rc::new(Cell::new(false));

    let flag = sibling_dropped.clone();
    let result = runtime.block_on(async move {
        task::spawn(async {
            delay(Duration::from_millis(10)).await?;
            Err::<(), _>(Error::other("boom"))
        });

        task::spawn(async move {
            let _guard = DropFlag(flag);
            delay(Duration::from_secs(60)).await
        });

        delay(Duration::from_secs(60)).await
    });

    let err = result.expect_err("the root should fail with its child");
    assert!(matches!(err, Error::TaskFailed { .. }));
    assert_eq!(err.root_cause().to_string(), "boom");
    assert!(sibling_dropped.get());
    assert_eq!(runtime.now(), Duration::from_millis(10));
}

#[strand::test]
async fn cancellation_is_not_a_failure() -> strand::Result<()> {
    let job = task::spawn(async { Err::<(), _>(Error::Cancelled) });

    job.join().await?;

    assert!(matches!(job.state(), TaskState::Cancelled));
    assert!(task::is_active());

    Ok(())
}

#[strand::test]
async fn lazy_task_waits_for_start() -> strand::Result<()> {
    let ran = Rc::new(Cell::new(false));

    let flag = ran.clone();
    let lazy = Builder::new().name("lazy").lazy().spawn(async move {
        flag.set(true);
        Ok(task::current_name())
    });

    strand::yield_now().await?;
    assert!(!ran.get());
    assert!(matches!(
        lazy.state(),
        TaskState::Suspended(SuspendReason::Lazy)
    ));

    assert!(lazy.start());
    assert!(!lazy.start());

    assert_eq!(lazy.await?.as_deref(), Some("lazy"));
    assert!(ran.get());

    Ok(())
}

#[test]
fn unstarted_lazy_child_stalls_block_on() {
    let runtime = RuntimeBuilder::new().clock(Clock::Virtual).build();

    let result = runtime.block_on(async {
        Builder::new().lazy().spawn(async { Ok(()) });
        Ok(())
    });

    assert!(matches!(result, Err(Error::Stalled { suspended }) if suspended >= 1));
}
