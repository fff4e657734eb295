//! Requests accepted on the Network Gateway's request bus. Every request
//! that can yield a resource carries the caller's own [`Bus`] as its reply
//! address; the gateway never calls back synchronously.

use std::net::SocketAddr;

use natkit_core::{Bus, ResourceId};

use crate::event::NetworkEvent;

pub enum NetworkRequest {
    CreateUdp {
        source: SocketAddr,
        response_bus: Bus<NetworkEvent>,
    },
    CreateTcp {
        source: SocketAddr,
        destination: SocketAddr,
        response_bus: Bus<NetworkEvent>,
    },
    /// Enqueues bytes to the socket's outgoing stream. A zero-length
    /// request is dropped silently — TCP has no message framing, so an
    /// empty write carries no observable effect.
    WriteTcp { id: ResourceId, bytes: Vec<u8> },
    /// Enqueues one datagram. Unlike `WriteTcp`, an empty payload is a
    /// meaningful zero-length UDP datagram and is not dropped.
    WriteUdp {
        id: ResourceId,
        remote: SocketAddr,
        bytes: Vec<u8>,
    },
    Close {
        id: ResourceId,
        response_bus: Bus<NetworkEvent>,
    },
    GetLocalIpAddresses {
        response_bus: Bus<NetworkEvent>,
    },
    /// Terminates the gateway loop. Every remaining socket is closed and an
    /// `IdentifiableError` is posted for each.
    Kill,
}
