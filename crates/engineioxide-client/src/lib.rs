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

//! An [Engine.IO](https://socket.io/docs/v4/engine-io-protocol/) v4 client
//! over websocket.
//!
//! It provides the transport layer under a socket.io client:
//! * the frame codec ([`Packet`])
//! * the websocket transport (url composition, handshake headers, proxy auth)
//! * the connection engine ([`Engine`]): OPEN handshake, heartbeat and
//!   automatic reconnection with exponential backoff
//!
//! Inbound traffic and lifecycle transitions are delivered through the
//! [`EngineHandler`] trait implemented by the layer above.

pub use config::{EngineConfig, EngineConfigBuilder, ProxyAuth, ReconnectConfig};
pub use engine::{ConnectionState, DisconnectReason, Engine};
pub use errors::{ConnectionError, Error};
pub use handler::EngineHandler;
pub use packet::{OpenPacket, Packet, PacketParseError};
pub use str::Str;

pub mod config;
pub mod handler;
pub mod packet;

mod engine;
mod errors;
mod str;
mod transport;
