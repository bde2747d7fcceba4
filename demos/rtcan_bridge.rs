//! Bridged pub/sub demo: two registries standing in for two boards on one
//! CAN bus.
//!
//! Board A publishes LED commands and forwards them through an outbound
//! bridge; board B re-publishes them from the bus and a local subscriber
//! applies them. This is the loopback version of the two-board RTCAN test
//! setup.

use std::{sync::Arc, thread, time::Duration};

use clap::Parser;
use log::info;
use speedy::{Readable, Writable};

use canmw::{
  LoopbackBus, Middleware, Node, RemotePublisher, RemoteSubscriber, RoutingKey, TrafficClass,
};

#[derive(Default, Debug, Clone, Readable, Writable)]
struct LedCommand {
  pin: u8,
  set: bool,
  cnt: u8,
}

#[derive(Parser)]
struct Args {
  /// Source node id used in the transport routing key
  #[arg(long, default_value_t = 7)]
  node_id: u8,
  /// Topic id used in the transport routing key
  #[arg(long, default_value_t = 1)]
  topic_id: u8,
  /// Messages to publish
  #[arg(long, default_value_t = 20)]
  count: u8,
}

fn main() {
  env_logger::init();
  let args = Args::parse();
  let key = RoutingKey::new(args.node_id, args.topic_id);

  let bus = Arc::new(LoopbackBus::new());

  // board A: local publisher, forwarded onto the bus
  let mw_a = Arc::new(Middleware::new());
  let node_a = Node::with_middleware(mw_a.clone(), "board-a");
  let publisher = node_a.advertise::<LedCommand>("led23").expect("advertise led23");
  let forwarder =
    RemoteSubscriber::<LedCommand>::new(key, bus.clone()).with_class(TrafficClass::Soft);
  let local = mw_a
    .find_local_publisher::<LedCommand>("led23")
    .expect("publisher just advertised");
  forwarder.attach(&local).expect("attach outbound bridge");

  // board B: fed from the bus, applied by a callback subscriber
  let mw_b = Arc::new(Middleware::new());
  let source: Arc<dyn canmw::FrameSource> = bus.clone();
  let _inbound =
    RemotePublisher::<LedCommand>::advertise(&mw_b, "led23", key, &source).expect("inbound bridge");
  let node_b = Node::with_middleware(mw_b, "board-b");
  let _sub = node_b
    .subscribe_with_callback::<LedCommand, _>("led23", 5, |cmd| {
      info!("board B: LED{} <- {} (cnt {})", cmd.pin, if cmd.set { "on" } else { "off" }, cmd.cnt);
    })
    .expect("subscribe led23");
  let shutdown = node_b.shutdown_handle();
  let spinner = thread::spawn(move || while node_b.spin() {});

  for cnt in 0..args.count {
    if let Some(mut cmd) = publisher.alloc() {
      cmd.pin = 2 + cnt % 2;
      cmd.set = cnt % 2 == 0;
      cmd.cnt = cnt;
      let deliveries = publisher.broadcast(cmd);
      info!("board A: broadcast cnt {cnt}, {deliveries} deliveries");
    }
    thread::sleep(Duration::from_millis(100));
  }

  // let the worker drain before tearing down
  thread::sleep(Duration::from_millis(100));
  shutdown.shutdown();
  spinner.join().unwrap();
}
