//! Topic-based publish/subscribe middleware in the style of a small
//! real-time system, with a bridge for CAN-class buses.
//!
//! Publishers and subscribers rendezvous by topic name through a process-wide
//! registry and may appear in any order. Messages travel zero-copy: a
//! publisher fills a buffer from its own fixed pool, `broadcast` hands the
//! same buffer to every subscriber queue under a shared refcount, and the
//! last release returns it to the pool. Nothing allocates in steady state,
//! nothing in the data path blocks; saturated queues and exhausted pools
//! drop data instead of waiting, because a stale sample is worth less than
//! the next one.
//!
//! A topic can extend beyond the local process: a [`RemoteSubscriber`]
//! forwards broadcasts onto a frame transport and a [`RemotePublisher`] on
//! the receiving side re-publishes them locally. The transport itself stays
//! behind the [`FrameSink`]/[`FrameSource`] traits; [`LoopbackBus`] is the
//! in-process stand-in used by tests and demos.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use canmw::{Middleware, Node};
//!
//! #[derive(Default, Debug)]
//! struct LedCommand {
//!   pin: u8,
//!   on: bool,
//! }
//!
//! let mw = Arc::new(Middleware::new());
//! let node = Node::with_middleware(mw, "blinker");
//! let publisher = node.advertise::<LedCommand>("led23").unwrap();
//! let subscriber = node.subscribe::<LedCommand>("led23", 5).unwrap();
//!
//! let mut cmd = publisher.alloc().unwrap();
//! cmd.pin = 2;
//! cmd.on = true;
//! publisher.broadcast(cmd);
//!
//! let seen = subscriber.get().unwrap();
//! assert_eq!((seen.pin, seen.on), (2, true));
//! ```

pub mod bridge;
mod error;
mod message;
mod middleware;
mod node;
mod pool;
mod publisher;
mod queue;
mod signal;
mod subscriber;
mod topic;
pub mod transport;

pub use bridge::{RemotePublisher, RemoteSubscriber, WireMessage, DEFAULT_SEND_TIMEOUT};
pub use error::{BindError, TransportError};
pub use message::Message;
pub use middleware::{Middleware, MAX_TOPICS, MAX_TOPIC_NAME};
pub use node::{Node, ShutdownHandle};
pub use pool::{Sample, SampleMut, DEFAULT_POOL_CAPACITY};
pub use publisher::Publisher;
pub use subscriber::Subscriber;
pub use transport::{
  Frame, FrameSink, FrameSource, LoopbackBus, RoutingKey, TrafficClass, MAX_FRAME_PAYLOAD,
};
