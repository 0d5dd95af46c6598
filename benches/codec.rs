//! Codec and dispatch benchmarks
//!
//! Run with: cargo bench --bench codec

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use tokio::sync::mpsc;

use tank_arena_server::lobby::manager::LobbyManager;
use tank_arena_server::metrics::Metrics;
use tank_arena_server::net::dispatch::ServerContext;
use tank_arena_server::net::handlers::build_registry;
use tank_arena_server::net::session::DEFAULT_OUTBOUND_QUEUE_SIZE;
use tank_arena_server::net::packets::{
    entity_flags, CommandFlags, EntityList, NetEntity, NetMine, NetProjectile, NetTank,
    ProtocolVariant, UserCommand, UserCommands, Vector, WirePacket,
};

fn random_entity(rng: &mut impl Rng, eid: u16) -> NetEntity {
    NetEntity {
        eid,
        position: Vector::new(rng.gen_range(0.0..2000.0), rng.gen_range(0.0..2000.0)),
        velocity: Vector::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0)),
        eflags: entity_flags::ALIVE,
    }
}

/// Snapshot with `count` tanks plus a few projectiles and mines
fn create_entity_list(count: usize) -> EntityList {
    let mut rng = rand::thread_rng();
    let tanks = (0..count)
        .map(|i| NetTank {
            entity: random_entity(&mut rng, i as u16),
            barrel_yaw: rng.gen_range(0..3600),
            flags: ((i % 4) as u8) << 4,
        })
        .collect();
    let projectiles = (0..count / 2)
        .map(|i| NetProjectile {
            entity: random_entity(&mut rng, (1000 + i) as u16),
            base_velocity: Vector::new(400.0, 0.0),
            bounces: rng.gen_range(0..3),
            owner_eid: (i % count.max(1)) as u16,
        })
        .collect();
    let mines = (0..count / 4)
        .map(|i| NetMine {
            entity: random_entity(&mut rng, (2000 + i) as u16),
            arm_time: 300,
            owner_eid: 0,
        })
        .collect();

    EntityList {
        tanks,
        projectiles,
        mines,
    }
}

fn bench_entity_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_list");

    for count in [4usize, 16, 64, 255] {
        let list = create_entity_list(count);
        let bytes = list.encode().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", count), &list, |b, list| {
            b.iter(|| black_box(list.encode().unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decode", count), &bytes, |b, bytes| {
            b.iter(|| black_box(EntityList::decode(bytes).unwrap()))
        });
    }

    group.finish();
}

fn bench_user_commands(c: &mut Criterion) {
    let command = UserCommand {
        entity_id: 12,
        commands: CommandFlags(CommandFlags::FORWARD | CommandFlags::FIRE),
        barrel_yaw: 371,
    };
    let batch = UserCommands {
        commands: vec![command; 32],
    };

    c.bench_function("user_command_frame", |b| {
        b.iter(|| black_box(command.to_frame().unwrap()))
    });
    c.bench_function("user_commands_encode_32", |b| {
        b.iter(|| black_box(batch.encode().unwrap()))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_relay");

    for members in [2usize, 8, 32] {
        let context = ServerContext::new(
            build_registry(ProtocolVariant::Arena).unwrap(),
            LobbyManager::default(),
            Arc::new(Metrics::new()),
        );
        let lobby = context.lobbies.create("bench").unwrap();
        let mut receivers = Vec::new();
        let mut sessions = Vec::new();
        for i in 0..members {
            let (tx, rx) = mpsc::channel(DEFAULT_OUTBOUND_QUEUE_SIZE);
            let session = context.open_session(i as u64, tx);
            context.lobbies.join(lobby.id(), session.id()).unwrap();
            sessions.push(session);
            receivers.push(rx);
        }
        let frame = UserCommand::default().to_frame().unwrap();

        group.throughput(Throughput::Elements(members as u64));
        group.bench_function(BenchmarkId::from_parameter(members), |b| {
            b.iter(|| {
                black_box(context.dispatch(&sessions[0], &frame));
                for rx in &mut receivers {
                    while rx.try_recv().is_ok() {}
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_entity_list, bench_user_commands, bench_dispatch);
criterion_main!(benches);
