//! Local pub/sub demo: LED command topics shared between threads.
//!
//! One thread publishes alternating on/off commands on two topics, a
//! callback subscriber applies them, and a polling subscriber watches a
//! third, faster topic. LEDs are stand-ins printed through the logger.

use std::{sync::Arc, thread, time::Duration};

use clap::Parser;
use log::info;

use canmw::{Middleware, Node};

#[derive(Default, Debug, Clone)]
struct LedCommand {
  pin: u8,
  set: bool,
  cnt: u8,
}

#[derive(Parser)]
struct Args {
  /// Blink period in milliseconds
  #[arg(long, default_value_t = 500)]
  period_ms: u64,
  /// How many blink cycles to run before exiting
  #[arg(long, default_value_t = 10)]
  cycles: u8,
}

fn publisher_thread(mw: Arc<Middleware>, args: &Args) {
  let node = Node::with_middleware(mw, "pub1");
  let led2 = node.advertise::<LedCommand>("led2").expect("advertise led2");
  let led3 = node.advertise::<LedCommand>("led3").expect("advertise led3");
  info!("node `{}` publishing led2 and led3", node.name());

  for cycle in 0..args.cycles {
    for (publisher, pin) in [(&led2, 2u8), (&led3, 3u8)] {
      if let Some(mut cmd) = publisher.alloc() {
        cmd.pin = pin;
        cmd.set = cycle % 2 == 0;
        cmd.cnt = cycle;
        let deliveries = publisher.broadcast(cmd);
        info!("pin {pin} cycle {cycle}: {deliveries} deliveries");
      }
    }
    thread::sleep(Duration::from_millis(args.period_ms));
  }
}

fn fast_publisher_thread(mw: Arc<Middleware>, cycles: u8) {
  let node = Node::with_middleware(mw, "pub2");
  let led4 = node.advertise::<LedCommand>("led4").expect("advertise led4");
  for cycle in 0..cycles {
    if let Some(mut cmd) = led4.alloc() {
      cmd.pin = 4;
      cmd.set = cycle % 2 == 0;
      cmd.cnt = cycle;
      led4.broadcast(cmd);
    }
    thread::sleep(Duration::from_millis(10));
  }
}

fn main() {
  env_logger::init();
  let args = Args::parse();

  let mw = Arc::new(Middleware::new());

  // callback subscriber: spin applies the commands
  let sub_node = Node::with_middleware(mw.clone(), "sub1");
  let _led2_sub = sub_node
    .subscribe_with_callback::<LedCommand, _>("led2", 5, |cmd| {
      info!("LED{} <- {}", cmd.pin, if cmd.set { "on" } else { "off" });
    })
    .expect("subscribe led2");
  let _led3_sub = sub_node
    .subscribe_with_callback::<LedCommand, _>("led3", 5, |cmd| {
      info!("LED{} <- {}", cmd.pin, if cmd.set { "on" } else { "off" });
    })
    .expect("subscribe led3");
  let shutdown = sub_node.shutdown_handle();
  let spinner = thread::spawn(move || while sub_node.spin() {});

  // polling subscriber on the fast topic
  let poll_node = Node::with_middleware(mw.clone(), "sub2");
  let led4_sub = poll_node.subscribe::<LedCommand>("led4", 2).expect("subscribe led4");
  let poll_shutdown = poll_node.shutdown_handle();
  let poller = thread::spawn(move || {
    while poll_node.spin() {
      while let Some(cmd) = led4_sub.get() {
        info!("LED{} <- {} (cnt {})", cmd.pin, if cmd.set { "on" } else { "off" }, cmd.cnt);
      }
    }
  });

  let fast_mw = mw.clone();
  let fast_cycles = args.cycles;
  let fast = thread::spawn(move || fast_publisher_thread(fast_mw, fast_cycles));

  // the status line the serial shell would print for `threads`
  info!("registered nodes: {}", mw.node_names().join(", "));

  publisher_thread(mw, &args);

  fast.join().unwrap();
  shutdown.shutdown();
  poll_shutdown.shutdown();
  spinner.join().unwrap();
  poller.join().unwrap();
}
