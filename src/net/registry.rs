//! Tag -> (packet kind, optional handler) table
//!
//! Built once at startup for one protocol variant, then shared read-only.

use std::sync::Arc;

use crate::net::codec::{split_frame, CodecError};
use crate::net::dispatch::HandlerContext;
use crate::net::packets::{Packet, PacketKind, ProtocolVariant};

/// Runtime handler for one packet kind
pub type PacketHandler = Arc<dyn Fn(&Packet, &HandlerContext<'_>) + Send + Sync>;

struct RegistryEntry {
    kind: PacketKind,
    handler: Option<PacketHandler>,
}

/// Errors raised while building a registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} is not part of the {variant} protocol")]
    NotInVariant {
        kind: PacketKind,
        variant: ProtocolVariant,
    },
}

/// How the registry resolved an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Known kind; the packet carries data or a decode error
    Packet(Packet),
    /// Known kind that clients are not supposed to send
    Unsupported(PacketKind),
    /// Tag not registered for this variant
    Unknown(u8),
}

pub struct PacketRegistry {
    variant: ProtocolVariant,
    entries: Vec<Option<RegistryEntry>>,
}

impl PacketRegistry {
    /// Register every kind of a protocol variant, with no handlers
    pub fn new(variant: ProtocolVariant) -> Self {
        let mut entries: Vec<Option<RegistryEntry>> = (0..=u8::MAX).map(|_| None).collect();
        for kind in variant.kinds() {
            entries[kind.tag() as usize] = Some(RegistryEntry {
                kind: *kind,
                handler: None,
            });
        }
        Self { variant, entries }
    }

    /// Attach the single handler for a kind, replacing any previous one
    pub fn with_handler<F>(mut self, kind: PacketKind, handler: F) -> Result<Self, RegistryError>
    where
        F: Fn(&Packet, &HandlerContext<'_>) + Send + Sync + 'static,
    {
        let variant = self.variant;
        let entry = self.entries[kind.tag() as usize]
            .as_mut()
            .ok_or(RegistryError::NotInVariant { kind, variant })?;
        let handler: PacketHandler = Arc::new(handler);
        entry.handler = Some(handler);
        Ok(self)
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn kind(&self, tag: u8) -> Option<PacketKind> {
        self.entries[tag as usize].as_ref().map(|entry| entry.kind)
    }

    pub fn handler(&self, tag: u8) -> Option<&PacketHandler> {
        self.entries[tag as usize]
            .as_ref()
            .and_then(|entry| entry.handler.as_ref())
    }

    /// Read the type tag and decode the rest of the frame.
    ///
    /// Only an empty frame (no tag at all) is an error here; decode failures
    /// are carried inside the returned packet.
    pub fn resolve(&self, frame: &[u8]) -> Result<Resolved, CodecError> {
        let (tag, payload) = split_frame(frame)?;

        let Some(kind) = self.kind(tag) else {
            return Ok(Resolved::Unknown(tag));
        };

        if kind == PacketKind::Unknown {
            return Ok(Resolved::Unknown(tag));
        }

        if !kind.direction().accepts_inbound() {
            return Ok(Resolved::Unsupported(kind));
        }

        let packet = match kind.decode(payload) {
            Ok(data) => Packet {
                tag,
                data,
                error: None,
            },
            Err(e) => Packet {
                tag,
                data: None,
                error: Some(e),
            },
        };
        Ok(Resolved::Packet(packet))
    }
}
