//! Networking: wire codec, packet registry, sessions and the WebSocket server

pub mod codec;
pub mod dispatch;
pub mod handlers;
pub mod packets;
pub mod registry;
pub mod session;
pub mod transport;
