use strand::channel::{Capacity, Channel, TryRecvError};
use strand::task::{self, SuspendReason, TaskState};
use strand::{Clock, Error, RuntimeBuilder};

use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, line: impl Into<String>) {
    log.borrow_mut().push(line.into());
}

#[strand::test]
async fn rendezvous_interleaving() -> strand::Result<()> {
    let channel = Channel::<&'static str>::rendezvous();
    let log: Log = Rc::default();

    let (tx, out) = (channel.clone(), log.clone());
    let a = task::spawn(async move {
        tx.send("A1").await?;
        tx.send("A2").await?;
        push(&out, "A done");
        Ok(())
    });

    let (tx, out) = (channel.clone(), log.clone());
    let b = task::spawn(async move {
        tx.send("B1").await?;
        push(&out, "B done");
        Ok(())
    });

    let (rx, out) = (channel.clone(), log.clone());
    let consumer = task::spawn(async move {
        for _ in 0..3 {
            let x = rx.recv().await?;
            push(&out, x);
        }
        Ok(())
    });

    a.await?;
    b.await?;
    consumer.await?;

    assert_eq!(*log.borrow(), ["A1", "B1", "A done", "B done", "A2"]);
    assert_eq!(channel.pending_senders(), 0);
    assert_eq!(channel.pending_receivers(), 0);

    Ok(())
}

#[strand::test]
async fn rendezvous_send_waits_for_receiver() -> strand::Result<()> {
    let channel = Channel::rendezvous();

    let tx = channel.clone();
    let producer = task::spawn(async move { tx.send(1).await });

    strand::yield_now().await?;

    assert!(matches!(
        producer.state(),
        TaskState::Suspended(SuspendReason::Send)
    ));
    assert_eq!(channel.pending_senders(), 1);
    assert!(channel.is_empty());

    assert_eq!(channel.recv().await?, 1);
    producer.await?;

    Ok(())
}

#[strand::test]
async fn buffered_third_send_suspends() -> strand::Result<()> {
    let channel = Channel::new(Capacity::Buffered(2));
    let log: Log = Rc::default();

    let (tx, out) = (channel.clone(), log.clone());
    let producer = task::spawn(async move {
        for value in ["a", "b", "c"] {
            tx.send(value).await?;
            assert!(tx.len() <= 2);
            push(&out, format!("sent {value}"));
        }
        Ok(())
    });

    let (rx, out) = (channel.clone(), log.clone());
    let consumer = task::spawn(async move {
        for _ in 0..3 {
            let value = rx.recv().await?;
            push(&out, format!("received {value}"));
        }
        Ok(())
    });

    producer.await?;
    consumer.await?;

    assert_eq!(
        *log.borrow(),
        [
            "sent a",
            "sent b",
            "received a",
            "received b",
            "received c",
            "sent c",
        ]
    );

    Ok(())
}

#[strand::test]
async fn unbounded_send_never_suspends() -> strand::Result<()> {
    let channel = Channel::unbounded();

    for i in 0..1_000 {
        channel.send(i).await?;
    }
    assert_eq!(channel.len(), 1_000);
    assert_eq!(channel.capacity(), Capacity::Unbounded);

    for i in 0..1_000 {
        assert_eq!(channel.recv().await?, i);
    }

    Ok(())
}

#[strand::test]
async fn receiver_waits_for_value() -> strand::Result<()> {
    let channel = Channel::unbounded();

    let rx = channel.clone();
    let consumer = task::spawn(async move { rx.recv().await });

    strand::yield_now().await?;
    assert_eq!(channel.pending_receivers(), 1);

    channel.send("late").await?;
    assert_eq!(consumer.await?, "late");

    Ok(())
}

#[strand::test]
async fn close_drains_then_fails() -> strand::Result<()> {
    let channel = Channel::buffered(4);

    for x in 1..=3 {
        channel.send(x * x).await?;
    }
    assert!(channel.close());
    assert!(channel.is_closed());

    assert!(matches!(channel.send(0).await, Err(Error::ChannelClosed)));

    let mut received = Vec::new();
    while let Ok(value) = channel.recv().await {
        received.push(value);
    }
    assert_eq!(received, [1, 4, 9]);

    assert!(matches!(channel.recv().await, Err(Error::ChannelClosed)));
    assert_eq!(channel.try_recv(), Err(TryRecvError::Closed));

    Ok(())
}

#[strand::test]
async fn close_wakes_every_waiter() -> strand::Result<()> {
    let requests = Channel::<u32>::rendezvous();
    let replies = Channel::<u32>::rendezvous();

    let rx = requests.clone();
    let receiver = task::spawn(async move { Ok(rx.recv().await) });

    let tx = replies.clone();
    let sender = task::spawn(async move { Ok(tx.send(7).await) });

    strand::yield_now().await?;
    assert_eq!(requests.pending_receivers(), 1);
    assert_eq!(replies.pending_senders(), 1);

    requests.close();
    replies.close();

    assert!(matches!(receiver.await?, Err(Error::ChannelClosed)));
    assert!(matches!(sender.await?, Err(Error::ChannelClosed)));

    Ok(())
}

#[strand::test]
async fn cancelled_receiver_leaves_the_queue() -> strand::Result<()> {
    let channel = Channel::rendezvous();

    let rx = channel.clone();
    let first = task::spawn(async move { rx.recv().await });
    let rx = channel.clone();
    let second = task::spawn(async move { rx.recv().await });

    strand::yield_now().await?;
    assert_eq!(channel.pending_receivers(), 2);

    first.cancel_and_join().await?;
    assert!(matches!(first.state(), TaskState::Cancelled));
    assert_eq!(channel.pending_receivers(), 1);

    channel.send(42).await?;
    assert_eq!(second.await?, 42);

    Ok(())
}

#[strand::test]
async fn cancelled_sender_withdraws_its_value() -> strand::Result<()> {
    let channel = Channel::rendezvous();

    let tx = channel.clone();
    let sender = task::spawn(async move { tx.send("withdrawn").await });

    strand::yield_now().await?;
    assert_eq!(channel.pending_senders(), 1);

    sender.cancel_and_join().await?;
    assert_eq!(channel.pending_senders(), 0);
    assert_eq!(channel.try_recv(), Err(TryRecvError::Empty));

    Ok(())
}

#[test]
fn receiver_without_sender_stalls() {
    let runtime = RuntimeBuilder::new().clock(Clock::Virtual).build();

    let result = runtime.block_on(async {
        let channel = Channel::<u8>::rendezvous();
        channel.recv().await
    });

    assert!(matches!(result, Err(Error::Stalled { .. })));
}
