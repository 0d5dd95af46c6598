//! Tank Arena Server Library
//!
//! Network core of a multiplayer tank arena: a binary packet codec over
//! WebSocket, a session registry, lobbies and per-packet dispatch.
//!
//! The server runs one of two protocol variants per deployment, selected with
//! the `PROTOCOL` environment variable:
//!
//! - `arena` - user commands, map data, lobby creation and entity snapshots
//! - `drawing` - shared whiteboard demo that relays points to every client

pub mod config;
pub mod lobby;
pub mod metrics;
pub mod net;
