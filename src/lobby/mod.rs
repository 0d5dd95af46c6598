//! Lobby system
//!
//! Groups sessions into named lobbies, one lobby per session at most.

pub mod manager;
pub mod room;
