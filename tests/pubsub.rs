//! End-to-end exercises of the local publish/subscribe path.

use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
  thread,
};

use canmw::{BindError, Middleware, Node};

#[derive(Default, Debug, PartialEq, Clone)]
struct LedCommand {
  pin: u8,
  set: bool,
  cnt: u8,
}

fn fresh_mw() -> Arc<Middleware> {
  Arc::new(Middleware::new())
}

#[test]
fn single_publisher_single_subscriber_single_message() {
  let mw = fresh_mw();
  let node = Node::with_middleware(mw, "led23-node");
  let publisher = node.advertise::<LedCommand>("led23").unwrap();
  let subscriber = node.subscribe::<LedCommand>("led23", 5).unwrap();

  let mut cmd = publisher.alloc().unwrap();
  cmd.pin = 2;
  cmd.set = true;
  cmd.cnt = 7;
  assert_eq!(publisher.broadcast(cmd), 1);

  let seen = subscriber.get().unwrap();
  assert_eq!(
    *seen,
    LedCommand {
      pin: 2,
      set: true,
      cnt: 7
    }
  );
  drop(seen);
  assert_eq!(publisher.free_buffers(), publisher.pool_capacity());
  assert!(subscriber.get().is_none());
}

#[test]
fn fan_out_with_mixed_queue_depths() {
  let mw = fresh_mw();
  let node = Node::with_middleware(mw, "fan");
  let publisher = node.advertise_with_pool::<LedCommand>("led23", 10).unwrap();
  let deep_a = node.subscribe::<LedCommand>("led23", 5).unwrap();
  let deep_b = node.subscribe::<LedCommand>("led23", 5).unwrap();
  let shallow_a = node.subscribe::<LedCommand>("led23", 2).unwrap();
  let shallow_b = node.subscribe::<LedCommand>("led23", 2).unwrap();

  let mut counts = Vec::new();
  for n in 0..10 {
    let mut cmd = publisher.alloc().expect("pool sized for this burst");
    cmd.cnt = n;
    counts.push(publisher.broadcast(cmd));
  }

  // first two messages land everywhere, the next three only in the deep
  // queues, the rest nowhere
  assert_eq!(counts, vec![4, 4, 2, 2, 2, 0, 0, 0, 0, 0]);
  assert_eq!(deep_a.queued(), 5);
  assert_eq!(deep_b.queued(), 5);
  assert_eq!(shallow_a.queued(), 2);
  assert_eq!(shallow_b.queued(), 2);

  // per-subscriber FIFO: everyone sees the oldest messages in order
  for expected in 0..5u8 {
    assert_eq!(deep_a.get().unwrap().cnt, expected);
  }
  for expected in 0..2u8 {
    assert_eq!(shallow_a.get().unwrap().cnt, expected);
  }
  while deep_b.get().is_some() {}
  while shallow_b.get().is_some() {}

  // queues drained and buffers released: the pool is whole again
  assert_eq!(publisher.free_buffers(), 10);
}

#[test]
fn subscribing_before_any_publisher_still_receives() {
  let mw = fresh_mw();
  let sub_node = Node::with_middleware(mw.clone(), "early-sub");
  let subscriber = sub_node.subscribe::<LedCommand>("boot", 2).unwrap();

  let pub_node = Node::with_middleware(mw, "late-pub");
  let publisher = pub_node.advertise::<LedCommand>("boot").unwrap();

  let mut cmd = publisher.alloc().unwrap();
  cmd.cnt = 99;
  assert_eq!(publisher.broadcast(cmd), 1);
  assert_eq!(subscriber.get().unwrap().cnt, 99);
}

#[test]
fn payload_size_conflict_leaves_endpoint_unbound() {
  #[derive(Default)]
  struct Narrow(u32);
  #[derive(Default, Debug)]
  struct WideTelemetry {
    _a: u32,
    _b: u32,
  }

  let mw = fresh_mw();
  let node = Node::with_middleware(mw, "mismatch");
  let publisher = node.advertise::<Narrow>("t").unwrap();

  let err = node.subscribe::<WideTelemetry>("t", 2).unwrap_err();
  assert!(matches!(err, BindError::SizeMismatch { requested: 8, expected: 4, .. }));

  // the publisher is unaffected and simply has nobody to deliver to
  let sample = publisher.alloc().unwrap();
  assert_eq!(publisher.broadcast(sample), 0);
}

#[test]
fn node_teardown_releases_held_buffers() {
  let mw = fresh_mw();
  let pub_node = Node::with_middleware(mw.clone(), "keeper-pub");
  let publisher = pub_node.advertise::<LedCommand>("led4").unwrap();

  let sub_node = Node::with_middleware(mw.clone(), "keeper-sub");
  let _subscriber = sub_node.subscribe::<LedCommand>("led4", 3).unwrap();
  assert_eq!(mw.node_count(), 2);

  for _ in 0..3 {
    let cmd = publisher.alloc().unwrap();
    assert_eq!(publisher.broadcast(cmd), 1);
  }
  assert_eq!(publisher.free_buffers(), 1);

  drop(sub_node);
  assert_eq!(mw.node_count(), 1);
  // all three queued buffers came back
  assert_eq!(publisher.free_buffers(), 4);
  // and the departed subscriber is no longer a delivery target
  let cmd = publisher.alloc().unwrap();
  assert_eq!(publisher.broadcast(cmd), 0);
}

#[test]
fn dropped_broadcast_frees_immediately_when_nobody_listens() {
  let mw = fresh_mw();
  let node = Node::with_middleware(mw, "lonely");
  let publisher = node.advertise::<LedCommand>("void").unwrap();
  for _ in 0..16 {
    let cmd = publisher.alloc().expect("every buffer is freed right away");
    assert_eq!(publisher.broadcast(cmd), 0);
  }
  assert_eq!(publisher.free_buffers(), publisher.pool_capacity());
}

#[test]
fn alloc_applies_backpressure_when_subscribers_lag() {
  let mw = fresh_mw();
  let node = Node::with_middleware(mw, "lagging");
  let publisher = node.advertise::<LedCommand>("burst").unwrap(); // pool of 4
  let subscriber = node.subscribe::<LedCommand>("burst", 5).unwrap();

  for _ in 0..4 {
    let cmd = publisher.alloc().unwrap();
    publisher.broadcast(cmd);
  }
  // subscriber holds all four buffers; the source is throttled
  assert!(publisher.alloc().is_none());

  drop(subscriber.get().unwrap());
  assert!(publisher.alloc().is_some());
}

#[test]
fn spin_drains_callback_subscribers() {
  let mw = fresh_mw();
  let sub_node = Node::with_middleware(mw.clone(), "cb-sub");
  let seen = Arc::new(Mutex::new(Vec::new()));
  let sink = seen.clone();
  let _subscriber = sub_node
    .subscribe_with_callback::<LedCommand, _>("led2", 5, move |cmd| {
      sink.lock().unwrap().push(cmd.cnt);
    })
    .unwrap();

  let publisher_mw = mw.clone();
  let publisher_thread = thread::spawn(move || {
    let pub_node = Node::with_middleware(publisher_mw, "cb-pub");
    let publisher = pub_node.advertise::<LedCommand>("led2").unwrap();
    for n in 0..3 {
      let mut cmd = publisher.alloc().unwrap();
      cmd.cnt = n;
      assert_eq!(publisher.broadcast(cmd), 1);
    }
  });

  while seen.lock().unwrap().len() < 3 {
    assert!(sub_node.spin());
  }
  publisher_thread.join().unwrap();
  assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn spin_leaves_get_style_subscribers_queued() {
  let mw = fresh_mw();
  let node = Node::with_middleware(mw, "poll-sub");
  let publisher = node.advertise::<LedCommand>("led3").unwrap();
  let subscriber = node.subscribe::<LedCommand>("led3", 2).unwrap();

  let cmd = publisher.alloc().unwrap();
  publisher.broadcast(cmd);

  // the wake was recorded before spin was even called
  assert!(node.spin());
  assert_eq!(subscriber.queued(), 1);
  assert!(subscriber.get().is_some());
}

#[test]
fn shutdown_handle_interrupts_spin() {
  let mw = fresh_mw();
  let node = Node::with_middleware(mw, "spinner");
  let _subscriber = node.subscribe::<LedCommand>("idle", 2).unwrap();
  let shutdown = node.shutdown_handle();

  let spins = Arc::new(AtomicUsize::new(0));
  let spun = spins.clone();
  let spinner = thread::spawn(move || {
    while node.spin() {
      spun.fetch_add(1, Ordering::SeqCst);
    }
  });

  shutdown.shutdown();
  spinner.join().unwrap();
  assert_eq!(spins.load(Ordering::SeqCst), 0);
}

#[test]
fn nodes_report_their_names_to_the_registry() {
  let mw = fresh_mw();
  let pub_node = Node::with_middleware(mw.clone(), "pub1");
  let sub_node = Node::with_middleware(mw.clone(), "sub1");
  assert_eq!(pub_node.name(), "pub1");
  assert_eq!(sub_node.name(), "sub1");
  assert_eq!(mw.node_names(), ["pub1", "sub1"]);

  drop(sub_node);
  assert_eq!(mw.node_names(), ["pub1"]);
  assert_eq!(mw.node_count(), 1);
}

#[test]
fn topic_names_are_validated_at_the_node_api() {
  let mw = fresh_mw();
  let node = Node::with_middleware(mw, "names");
  assert!(matches!(
    node.advertise::<LedCommand>("this-name-is-way-too-long"),
    Err(BindError::BadTopicName(_))
  ));
  assert!(node.advertise::<LedCommand>("led23").is_ok());
}
