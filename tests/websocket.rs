//! End-to-end tests over a real WebSocket handshake on in-memory streams

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use tank_arena_server::lobby::manager::LobbyManager;
use tank_arena_server::metrics::Metrics;
use tank_arena_server::net::dispatch::ServerContext;
use tank_arena_server::net::handlers::build_registry;
use tank_arena_server::net::packets::{
    CommandFlags, DrawNewPoint, GenerateNewLobby, GenerateNewLobbyResult, MapData, PacketKind,
    ProtocolVariant, UserCommand, UserCommands, WirePacket,
};
use tank_arena_server::net::transport::{accept_connection, ConnectionLimits};

type Client = WebSocketStream<DuplexStream>;

fn server(variant: ProtocolVariant, map: &str) -> Arc<ServerContext> {
    Arc::new(ServerContext::new(
        build_registry(variant).unwrap(),
        LobbyManager::new(Duration::from_millis(10_000), map.to_string()),
        Arc::new(Metrics::new()),
    ))
}

async fn connect(context: &Arc<ServerContext>, connection_id: u64) -> Client {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let ctx = context.clone();
    tokio::spawn(async move {
        let _ = accept_connection(server_io, connection_id, ctx, ConnectionLimits::default()).await;
    });
    let (client, _) = tokio_tungstenite::client_async("ws://localhost/", client_io)
        .await
        .unwrap();
    client
}

async fn wait_for_sessions(context: &ServerContext, expected: usize) {
    for _ in 0..200 {
        if context.sessions.count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {} sessions, found {}",
        expected,
        context.sessions.count()
    );
}

async fn recv_frame(client: &mut Client) -> Vec<u8> {
    let message = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("read failed");
    match message {
        Message::Binary(frame) => frame,
        other => panic!("unexpected message {:?}", other),
    }
}

async fn send_packet<P: WirePacket>(client: &mut Client, packet: &P) {
    client
        .send(Message::Binary(packet.to_frame().unwrap()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_lobby_over_websocket() {
    let ctx = server(ProtocolVariant::Arena, "");
    let mut client = connect(&ctx, 1).await;

    send_packet(
        &mut client,
        &GenerateNewLobby {
            name: "Arena1".to_string(),
        },
    )
    .await;
    let frame = recv_frame(&mut client).await;
    assert_eq!(frame[0], PacketKind::GenerateNewLobbyResult.tag());
    let result = GenerateNewLobbyResult::decode(&frame[1..]).unwrap();
    assert!(!result.is_failure());
    assert_eq!(ctx.lobbies.lobby_count(), 1);

    send_packet(&mut client, &GenerateNewLobby::default()).await;
    let frame = recv_frame(&mut client).await;
    assert_eq!(frame, vec![PacketKind::GenerateNewLobbyResult.tag()]);
    assert_eq!(ctx.lobbies.lobby_count(), 1);
}

#[tokio::test]
async fn test_malformed_and_unknown_frames_keep_connection() {
    let ctx = server(ProtocolVariant::Arena, "");
    let mut client = connect(&ctx, 1).await;

    client.send(Message::Binary(vec![1, 0])).await.unwrap();
    client.send(Message::Binary(vec![42, 1, 2, 3])).await.unwrap();
    client.send(Message::Binary(vec![])).await.unwrap();

    send_packet(
        &mut client,
        &GenerateNewLobby {
            name: "Still here".to_string(),
        },
    )
    .await;
    let frame = recv_frame(&mut client).await;
    assert_eq!(frame[0], PacketKind::GenerateNewLobbyResult.tag());
    assert_eq!(ctx.sessions.count(), 1);
}

#[tokio::test]
async fn test_broadcast_survives_disconnect() {
    let ctx = server(ProtocolVariant::Drawing, "");
    let mut clients = Vec::new();
    for id in 0..3 {
        clients.push(connect(&ctx, id).await);
    }
    let mut leaving = connect(&ctx, 99).await;
    wait_for_sessions(&ctx, 4).await;

    leaving.close(None).await.unwrap();
    drop(leaving);

    let point = DrawNewPoint {
        x: 10,
        y: 20,
        color: 3,
    };
    send_packet(&mut clients[0], &point).await;

    for client in &mut clients {
        assert_eq!(recv_frame(client).await, vec![81, 0, 10, 0, 20, 3]);
    }
    wait_for_sessions(&ctx, 3).await;
}

#[tokio::test]
async fn test_disconnect_leaves_lobby() {
    let ctx = server(ProtocolVariant::Arena, "");
    let client = connect(&ctx, 7).await;
    wait_for_sessions(&ctx, 1).await;

    let session = ctx.sessions.lookup_by_connection(7).unwrap();
    let lobby = ctx.lobbies.create("L").unwrap();
    ctx.join_lobby(&session, lobby.id()).unwrap();
    drop(session);

    drop(client);
    wait_for_sessions(&ctx, 0).await;

    let lobby = ctx.lobbies.find_by_id(lobby.id()).unwrap();
    assert!(lobby.is_empty());
    assert!(lobby.empty_since().is_some());
}

#[tokio::test]
async fn test_join_sends_map_and_relays_commands() {
    let map = r#"{"lines":[[0,0,100,0]],"spawnPoints":[]}"#;
    let ctx = server(ProtocolVariant::Arena, map);
    let mut a = connect(&ctx, 1).await;
    let mut b = connect(&ctx, 2).await;
    wait_for_sessions(&ctx, 2).await;

    let lobby = ctx.lobbies.create("Duel").unwrap();
    for connection_id in [1, 2] {
        let session = ctx.sessions.lookup_by_connection(connection_id).unwrap();
        ctx.join_lobby(&session, lobby.id()).unwrap();
    }
    for client in [&mut a, &mut b] {
        let frame = recv_frame(client).await;
        assert_eq!(frame[0], PacketKind::MapData.tag());
        assert_eq!(MapData::decode(&frame[1..]).unwrap().json, map);
    }

    let command = UserCommand {
        entity_id: 3,
        commands: CommandFlags(CommandFlags::FIRE),
        barrel_yaw: 371,
    };
    send_packet(&mut a, &command).await;

    let expected = UserCommands {
        commands: vec![command],
    }
    .to_frame()
    .unwrap();
    assert_eq!(recv_frame(&mut a).await, expected);
    assert_eq!(recv_frame(&mut b).await, expected);
}
