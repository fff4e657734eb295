//! The Process Gateway: supervises child processes reachable only by
//! sending [`ProcessRequest`]s on the bus returned from
//! [`ProcessGateway::spawn`]. Each tracked child gets a stdin writer, a
//! stdout reader, a stderr reader, and an exit waiter, all running on
//! their own thread; the gateway's own thread only ever touches its
//! `entries` map, reached exclusively through the request bus.

mod entry;
mod event;
mod gateway;
mod request;

pub use event::{ProcessEvent, StreamKind};
pub use gateway::{ProcessGateway, ProcessGatewayHandle};
pub use request::ProcessRequest;
