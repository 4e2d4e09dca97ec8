#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style
)]

//! A [Socket.IO](https://socket.io/docs/v4/socket-io-protocol/) v5 client
//! over websocket, built on the [`engineioxide_client`] transport engine.
//!
//! ## Features
//! * Multiplexed namespaces over one session, with per-namespace auth
//! * Named events with one handler slot per event plus a catch-all
//! * Acknowledgements: fire-and-forget, callback (with optional timeout)
//!   and awaitable emits
//! * Binary payloads as [`Value::Binary`](crate::Value::Binary) leaves,
//!   reassembled transparently from their placeholder form
//! * Automatic reconnection driven by the engine, with outbound queueing
//!   while a namespace is disconnected
//!
//! ## Example
//! ```no_run
//! use socketioxide_client::{SocketIo, Value};
//!
//! #[tokio::main]
//! async fn main() {
//!     let io = SocketIo::new();
//!     let socket = io.socket("/");
//!     socket.on("chat", |event| {
//!         println!("{:?}", event.args());
//!     });
//!     io.connect("ws://localhost:3000").await.unwrap();
//!
//!     socket.emit("chat", [Value::from("hello")]);
//!     match socket.emit_async("sum", [Value::from(1), Value::from(2)]).await {
//!         Ok(ack) => println!("acked: {ack:?}"),
//!         Err(err) => eprintln!("no ack: {err}"),
//!     }
//! }
//! ```

pub use ack::{AckFuture, AckResult};
pub use errors::{AckError, EngineError, ParseError};
pub use io::{ClientConfig, SocketIo, SocketIoBuilder};
pub use socket::{ConnectionMetrics, Event, Socket};
pub use value::Value;

pub use engineioxide_client::{
    ConnectionError, ConnectionState, DisconnectReason, EngineConfig, ProxyAuth, ReconnectConfig,
    Str,
};

pub mod ack;
pub mod errors;
pub mod packet;
pub mod parser;
pub mod socket;
pub mod value;

mod client;
mod io;
