//! Shared substrate for the natkit gateways: the [`Bus`] primitive, the
//! resource-id allocator, and the two error kinds that are allowed to cross
//! a bus boundary.
//!
//! Nothing in this crate touches a socket, a process, or a selector — those
//! live in `natkit-net` and `natkit-process`, each built on top of what's
//! defined here.

pub mod bus;
pub mod error;
pub mod id;

pub use bus::Bus;
pub use error::{ErrorKind, GatewayError, IdentifiableError};
pub use id::{ResourceId, ResourceIdAllocator};
