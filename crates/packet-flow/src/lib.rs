//! packet-flow: scripted packet flows for testing connections.
//!
//! This crate defines:
//! - The connection trait a flow drives ([`Conn`])
//! - The packet capability a flow matches on ([`Packet`])
//! - An in-process rendezvous connection ([`Pipe`])
//! - The flow builder and its executors ([`Flow::test`], [`Flow::test_async`])
//! - Errors reporting the first deviation from a script ([`FlowError`], [`ConnError`])
//!
//! # Usage
//!
//! ```ignore
//! let pipe = Pipe::new();
//!
//! let server = Flow::new().receive(connect()).send(connack()).end();
//! let client = Flow::new().send(connect()).receive(connack()).close().end();
//!
//! let server_done = server.test_async(pipe.clone(), Duration::from_secs(1));
//! client.test(&pipe).await?;
//! server_done.await.expect("server flow dropped")?;
//! ```

#![forbid(unsafe_code)]

mod action;
mod config;
mod conn;
mod error;
mod flow;
mod packet;
mod pipe;

#[cfg(test)]
mod testing;

pub use action::ActionKind;
pub use config::*;
pub use conn::*;
pub use error::*;
pub use flow::*;
pub use packet::*;
pub use pipe::*;

// Re-export the signal type accepted by `Flow::wait`.
pub use tokio_util::sync::CancellationToken;
