use strand::task::{self, Builder, JoinHandle, TaskState};
use strand::time::{delay, instrumented};
use strand::{Error, scope};

use std::cell::RefCell;
use std::future::{Future, poll_fn};
use std::rc::Rc;
use std::task::Poll;
use std::time::Duration;

async fn do_something_useful_one() -> strand::Result<u32> {
    delay(Duration::from_millis(1000)).await?;
    Ok(13)
}

async fn do_something_useful_two() -> strand::Result<u32> {
    delay(Duration::from_millis(1000)).await?;
    Ok(29)
}

#[strand::test]
async fn sequential_by_default() -> strand::Result<()> {
    let (sum, elapsed) = instrumented(async {
        let one = do_something_useful_one().await?;
        let two = do_something_useful_two().await?;
        Ok::<_, Error>(one + two)
    })
    .await;

    assert_eq!(sum?, 42);
    assert_eq!(elapsed, Duration::from_millis(2000));

    Ok(())
}

#[strand::test]
async fn concurrent_with_spawn() -> strand::Result<()> {
    let (sum, elapsed) = instrumented(scope(async {
        let one = task::spawn(do_something_useful_one());
        let two = task::spawn(do_something_useful_two());
        Ok(one.await? + two.await?)
    }))
    .await;

    assert_eq!(sum?, 42);
    assert_eq!(elapsed, Duration::from_millis(1000));

    Ok(())
}

#[strand::test]
async fn lazy_started_explicitly() -> strand::Result<()> {
    let (sum, elapsed) = instrumented(scope(async {
        let one = Builder::new().lazy().spawn(do_something_useful_one());
        let two = Builder::new().lazy().spawn(do_something_useful_two());

        one.start();
        two.start();

        Ok(one.await? + two.await?)
    }))
    .await;

    assert_eq!(sum?, 42);
    assert_eq!(elapsed, Duration::from_millis(1000));

    Ok(())
}

#[strand::test]
async fn lazy_started_by_await_runs_sequentially() -> strand::Result<()> {
    let (sum, elapsed) = instrumented(scope(async {
        let one = Builder::new().lazy().spawn(do_something_useful_one());
        let two = Builder::new().lazy().spawn(do_something_useful_two());

        Ok(one.await? + two.await?)
    }))
    .await;

    assert_eq!(sum?, 42);
    assert_eq!(elapsed, Duration::from_millis(2000));

    Ok(())
}

#[strand::test]
async fn waits_for_every_child() -> strand::Result<()> {
    let log = Rc::new(RefCell::new(Vec::new()));

    let out = log.clone();
    let value = scope(async move {
        for ms in [300, 100, 200] {
            let out = out.clone();
            task::spawn(async move {
                delay(Duration::from_millis(ms)).await?;
                out.borrow_mut().push(ms);
                Ok(())
            });
        }
        Ok("body")
    })
    .await?;

    assert_eq!(value, "body");
    assert_eq!(*log.borrow(), [100, 200, 300]);
    assert_eq!(strand::time::now(), Duration::from_millis(300));

    Ok(())
}

#[strand::test]
async fn children_belong_to_the_scope() -> strand::Result<()> {
    let outer = task::current().expect("tests run inside a task");

    scope(async move {
        let inner = task::current().expect("scopes are nodes");
        assert_ne!(inner, outer);

        let child = task::spawn(async { Ok(task::current()) });
        let id = child.id();
        assert_eq!(child.await?, Some(id));

        Ok(())
    })
    .await
}

#[strand::test]
async fn failing_body_cancels_children() -> strand::Result<()> {
    let log = Rc::new(RefCell::new(Vec::new()));

    let out = log.clone();
    let result: strand::Result<()> = scope(async move {
        task::spawn(async move {
            delay(Duration::from_secs(5)).await?;
            out.borrow_mut().push("child finished");
            Ok(())
        });

        delay(Duration::from_millis(10)).await?;
        Err(Error::other("body failed"))
    })
    .await;

    assert!(matches!(result, Err(Error::Other(_))));
    assert!(log.borrow().is_empty());
    assert_eq!(strand::time::now(), Duration::from_millis(10));

    Ok(())
}

#[strand::test]
async fn nested_scope_is_cancelled_with_its_parent() -> strand::Result<()> {
    let log = Rc::new(RefCell::new(Vec::new()));

    let out = log.clone();
    let result = strand::time::with_timeout_or_none(
        Duration::from_millis(50),
        scope(async move {
            task::spawn(async move {
                delay(Duration::from_secs(1)).await?;
                out.borrow_mut().push("child finished");
                Ok(())
            });
            Ok(())
        }),
    )
    .await?;

    assert_eq!(result, None);
    assert!(log.borrow().is_empty());

    Ok(())
}

#[strand::test]
async fn dropping_a_scope_cancels_its_children() -> strand::Result<()> {
    let child: Rc<RefCell<Option<JoinHandle<()>>>> = Rc::default();

    let slot = child.clone();
    let mut unfinished = Box::pin(scope(async move {
        let handle = task::spawn(delay(Duration::from_secs(1)));
        *slot.borrow_mut() = Some(handle);
        Ok(())
    }));

    let pending = poll_fn(|cx| Poll::Ready(unfinished.as_mut().poll(cx).is_pending())).await;
    assert!(pending);
    drop(unfinished);

    let child = child.borrow_mut().take().expect("child was spawned");
    child.join().await?;

    assert!(matches!(child.state(), TaskState::Cancelled));
    assert_eq!(strand::time::now(), Duration::ZERO);

    Ok(())
}
