//! Everything the Network Gateway ever posts back on a caller's response
//! bus: responses to requests and unsolicited notifications. Both are
//! carried on the same enum because they ride the same bus and a caller
//! handles them with one `match`.

use std::net::{IpAddr, SocketAddr};

use natkit_core::{GatewayError, IdentifiableError, ResourceId};

#[derive(Debug)]
pub enum NetworkEvent {
    CreateUdpResponse(ResourceId),
    CreateTcpResponse(ResourceId),
    /// Posted once, after `CreateTcpResponse`, when the three-way handshake
    /// completes. Never posted alongside an `IdentifiableError` for the
    /// same connect attempt — exactly one of the two always follows.
    ConnectedTcp(ResourceId),
    /// One per prefix of a `Write-TCP` request actually accepted by the
    /// kernel; sums to the full request size across possibly-partial
    /// writes.
    WriteTcpResponse(ResourceId, usize),
    /// Fired exactly once per drain cycle, when the outgoing TCP queue
    /// becomes empty.
    WriteEmptyTcp(ResourceId),
    /// One per `Write-UDP` request, carrying the number of bytes in the
    /// datagram actually sent.
    WriteUdpResponse(ResourceId, usize),
    WriteEmptyUdp(ResourceId),
    /// One per successful read of at least one byte.
    ReadTcp(ResourceId, Vec<u8>),
    /// One per datagram received: local address, remote address, payload.
    ReadUdp(ResourceId, SocketAddr, SocketAddr, Vec<u8>),
    CloseResponse(ResourceId),
    LocalAddresses(Vec<IpAddr>),
    /// The request never got a resource off the ground.
    Error(GatewayError),
    /// A previously created resource failed or was invalidated; `id` is no
    /// longer valid after this is observed.
    IdentifiableError(IdentifiableError),
}
