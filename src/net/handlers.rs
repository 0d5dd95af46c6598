//! Default packet handlers for both protocol variants

use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use crate::lobby::manager::LobbyManager;
use crate::net::dispatch::HandlerContext;
use crate::net::packets::{
    GenerateNewLobbyResult, Packet, PacketData, PacketKind, ProtocolVariant, UserCommands,
};
use crate::net::registry::{PacketRegistry, RegistryError};

/// Registry with the standard handlers of a variant attached
pub fn build_registry(variant: ProtocolVariant) -> Result<PacketRegistry, RegistryError> {
    let registry = PacketRegistry::new(variant);
    match variant {
        ProtocolVariant::Arena => registry
            .with_handler(PacketKind::GenerateNewLobby, handle_generate_new_lobby)?
            .with_handler(PacketKind::UserCommand, handle_user_command),
        ProtocolVariant::Drawing => {
            registry.with_handler(PacketKind::DrawNewPoint, handle_draw_new_point)
        }
    }
}

/// Create a lobby and answer with its id, or with an empty id on a bad name
pub fn handle_generate_new_lobby(packet: &Packet, ctx: &HandlerContext<'_>) {
    let Some(PacketData::GenerateNewLobby(request)) = &packet.data else {
        return;
    };
    let session_id = ctx.session.id();

    if let Err(e) = LobbyManager::validate_name(&request.name) {
        warn!("Rejected lobby request from {}: {}", session_id, e);
        ctx.reply(&GenerateNewLobbyResult::failure());
        return;
    }

    let lobbies = &ctx.server.lobbies;
    if let Some(previous) = lobbies.leave_current(session_id) {
        info!("Session {} force-left lobby {} to create a new one", session_id, previous);
    }

    match lobbies.create(&request.name) {
        Ok(lobby) => {
            let metrics = &ctx.server.metrics;
            metrics.lobbies_created.fetch_add(1, Ordering::Relaxed);
            metrics
                .lobbies_active
                .store(lobbies.lobby_count() as u64, Ordering::Relaxed);
            ctx.reply(&GenerateNewLobbyResult::success(lobby.id().to_string()));
        }
        Err(e) => {
            warn!("Lobby creation failed for {}: {}", session_id, e);
            ctx.reply(&GenerateNewLobbyResult::failure());
        }
    }
}

/// Relay a player's input to everyone in the same lobby
pub fn handle_user_command(packet: &Packet, ctx: &HandlerContext<'_>) {
    let Some(PacketData::UserCommand(command)) = &packet.data else {
        return;
    };

    let Some(lobby) = ctx.server.lobbies.find_containing(ctx.session.id()) else {
        debug!("Dropping command from {}: not in a lobby", ctx.session.id());
        return;
    };

    let batch = UserCommands {
        commands: vec![*command],
    };
    ctx.send_to_lobby(&lobby, &batch);
}

/// Echo a whiteboard point to every connected session
pub fn handle_draw_new_point(packet: &Packet, ctx: &HandlerContext<'_>) {
    let Some(PacketData::DrawNewPoint(point)) = &packet.data else {
        return;
    };
    let report = ctx.broadcast(point);
    if report.failed > 0 {
        debug!(
            "Point from {} reached {} sessions, {} failed",
            ctx.session.id(),
            report.delivered,
            report.failed
        );
    }
}
