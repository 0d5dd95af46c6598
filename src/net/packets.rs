//! Packet kinds of the arena protocol and the drawing-demo protocol
//!
//! Every kind implements [`WirePacket`]. Kinds are one-directional by
//! convention; the registry uses [`PacketKind::direction`] to decide whether an
//! inbound frame of that kind is decoded at all.

use std::fmt;
use std::str::FromStr;

use crate::net::codec::{encode_frame, CodecError, PayloadReader, PayloadWriter};

/// Which way a packet kind travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
    /// Received from a client and relayed verbatim to clients
    Both,
    /// Carries nothing (tag 0)
    None,
}

impl Direction {
    pub fn accepts_inbound(self) -> bool {
        matches!(self, Direction::ClientToServer | Direction::Both)
    }
}

/// Closed set of packet kinds, indexed by their wire tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Unknown = 0,
    UserCommand = 1,
    UserCommands = 2,
    MapData = 3,
    GenerateNewLobby = 4,
    GenerateNewLobbyResult = 5,
    EntityList = 6,
    DrawNewPoint = 81,
}

impl PacketKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Unknown),
            1 => Some(Self::UserCommand),
            2 => Some(Self::UserCommands),
            3 => Some(Self::MapData),
            4 => Some(Self::GenerateNewLobby),
            5 => Some(Self::GenerateNewLobbyResult),
            6 => Some(Self::EntityList),
            81 => Some(Self::DrawNewPoint),
            _ => None,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::Unknown => Direction::None,
            Self::UserCommand | Self::GenerateNewLobby => Direction::ClientToServer,
            Self::UserCommands
            | Self::MapData
            | Self::GenerateNewLobbyResult
            | Self::EntityList => Direction::ServerToClient,
            Self::DrawNewPoint => Direction::Both,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::UserCommand => "UserCommand",
            Self::UserCommands => "UserCommands",
            Self::MapData => "MapData",
            Self::GenerateNewLobby => "GenerateNewLobby",
            Self::GenerateNewLobbyResult => "GenerateNewLobbyResult",
            Self::EntityList => "EntityList",
            Self::DrawNewPoint => "DrawNewPoint",
        }
    }

    /// Decode a payload of this kind
    pub fn decode(self, payload: &[u8]) -> Result<Option<PacketData>, CodecError> {
        let data = match self {
            Self::Unknown => return Ok(None),
            Self::UserCommand => PacketData::UserCommand(UserCommand::decode(payload)?),
            Self::UserCommands => PacketData::UserCommands(UserCommands::decode(payload)?),
            Self::MapData => PacketData::MapData(MapData::decode(payload)?),
            Self::GenerateNewLobby => {
                PacketData::GenerateNewLobby(GenerateNewLobby::decode(payload)?)
            }
            Self::GenerateNewLobbyResult => {
                PacketData::GenerateNewLobbyResult(GenerateNewLobbyResult::decode(payload)?)
            }
            Self::EntityList => PacketData::EntityList(EntityList::decode(payload)?),
            Self::DrawNewPoint => PacketData::DrawNewPoint(DrawNewPoint::decode(payload)?),
        };
        Ok(Some(data))
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.tag())
    }
}

/// The two deployments of the protocol; their tag spaces are never mixed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    /// Tank arena: commands, map data, lobbies, entity snapshots
    Arena,
    /// Shared whiteboard demo
    Drawing,
}

impl ProtocolVariant {
    pub fn kinds(self) -> &'static [PacketKind] {
        match self {
            Self::Arena => &[
                PacketKind::Unknown,
                PacketKind::UserCommand,
                PacketKind::UserCommands,
                PacketKind::MapData,
                PacketKind::GenerateNewLobby,
                PacketKind::GenerateNewLobbyResult,
                PacketKind::EntityList,
            ],
            Self::Drawing => &[PacketKind::Unknown, PacketKind::DrawNewPoint],
        }
    }
}

impl FromStr for ProtocolVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arena" => Ok(Self::Arena),
            "drawing" | "draw" => Ok(Self::Drawing),
            other => Err(format!("unknown protocol variant '{}'", other)),
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arena => f.write_str("arena"),
            Self::Drawing => f.write_str("drawing"),
        }
    }
}

/// Encode/decode pair for one packet kind
pub trait WirePacket: Sized {
    const KIND: PacketKind;

    fn encode_into(&self, writer: &mut PayloadWriter) -> Result<(), CodecError>;

    fn decode_from(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError>;

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = PayloadWriter::new();
        self.encode_into(&mut writer)?;
        Ok(writer.build())
    }

    fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        Self::decode_from(&mut PayloadReader::new(payload))
    }

    /// Encode including the leading type tag
    fn to_frame(&self) -> Result<Vec<u8>, CodecError> {
        Ok(encode_frame(Self::KIND.tag(), &self.encode()?))
    }
}

/// Decoded payload of any known packet kind
#[derive(Debug, Clone, PartialEq)]
pub enum PacketData {
    UserCommand(UserCommand),
    UserCommands(UserCommands),
    MapData(MapData),
    GenerateNewLobby(GenerateNewLobby),
    GenerateNewLobbyResult(GenerateNewLobbyResult),
    EntityList(EntityList),
    DrawNewPoint(DrawNewPoint),
}

/// A received frame after decoding: type tag, decoded data, decode error
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub tag: u8,
    pub data: Option<PacketData>,
    pub error: Option<CodecError>,
}

impl Packet {
    pub fn kind(&self) -> Option<PacketKind> {
        PacketKind::from_tag(self.tag)
    }
}

/// Command bitfield of a [`UserCommand`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CommandFlags(pub u8);

impl CommandFlags {
    pub const FORWARD: u8 = 1 << 0;
    pub const BACK: u8 = 1 << 1;
    pub const LEFT: u8 = 1 << 2;
    pub const RIGHT: u8 = 1 << 3;
    pub const FIRE: u8 = 1 << 4;
    pub const ALT_FIRE: u8 = 1 << 5;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn is_forward(self) -> bool {
        self.contains(Self::FORWARD)
    }

    pub fn is_back(self) -> bool {
        self.contains(Self::BACK)
    }

    pub fn is_left(self) -> bool {
        self.contains(Self::LEFT)
    }

    pub fn is_right(self) -> bool {
        self.contains(Self::RIGHT)
    }

    pub fn is_fire(self) -> bool {
        self.contains(Self::FIRE)
    }

    pub fn is_alt_fire(self) -> bool {
        self.contains(Self::ALT_FIRE)
    }
}

/// One tick of player input (tag 1, client to server)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCommand {
    pub entity_id: u16,
    pub commands: CommandFlags,
    /// Tenths of a degree, e.g. 37.1 -> 371
    pub barrel_yaw: u16,
}

impl UserCommand {
    fn write(&self, writer: &mut PayloadWriter) {
        writer
            .write_u16(self.entity_id)
            .write_u8(self.commands.bits())
            .write_u16(self.barrel_yaw);
    }

    fn read(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            entity_id: reader.read_u16()?,
            commands: CommandFlags(reader.read_u8()?),
            barrel_yaw: reader.read_u16()?,
        })
    }
}

impl WirePacket for UserCommand {
    const KIND: PacketKind = PacketKind::UserCommand;

    fn encode_into(&self, writer: &mut PayloadWriter) -> Result<(), CodecError> {
        self.write(writer);
        Ok(())
    }

    fn decode_from(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Self::read(reader)
    }
}

/// Batch of user commands (tag 2, server to client)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserCommands {
    pub commands: Vec<UserCommand>,
}

impl WirePacket for UserCommands {
    const KIND: PacketKind = PacketKind::UserCommands;

    fn encode_into(&self, writer: &mut PayloadWriter) -> Result<(), CodecError> {
        writer.write_count("user command", self.commands.len())?;
        for command in &self.commands {
            command.write(writer);
        }
        Ok(())
    }

    fn decode_from(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        let count = reader.read_u8()? as usize;
        let mut commands = Vec::with_capacity(count);
        for _ in 0..count {
            commands.push(UserCommand::read(reader)?);
        }
        Ok(Self { commands })
    }
}

/// Raw JSON map definition (tag 3, server to client)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapData {
    pub json: String,
}

impl WirePacket for MapData {
    const KIND: PacketKind = PacketKind::MapData;

    fn encode_into(&self, writer: &mut PayloadWriter) -> Result<(), CodecError> {
        writer.write_bytes(self.json.as_bytes());
        Ok(())
    }

    fn decode_from(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            json: reader.read_remaining_string()?,
        })
    }
}

/// Lobby creation request (tag 4, client to server)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateNewLobby {
    pub name: String,
}

impl WirePacket for GenerateNewLobby {
    const KIND: PacketKind = PacketKind::GenerateNewLobby;

    fn encode_into(&self, writer: &mut PayloadWriter) -> Result<(), CodecError> {
        writer.write_bytes(self.name.as_bytes());
        Ok(())
    }

    fn decode_from(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            name: reader.read_remaining_string()?,
        })
    }
}

/// Lobby creation result (tag 5, server to client). An empty id means failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateNewLobbyResult {
    pub lobby_id: String,
}

impl GenerateNewLobbyResult {
    pub fn success(lobby_id: impl Into<String>) -> Self {
        Self {
            lobby_id: lobby_id.into(),
        }
    }

    pub fn failure() -> Self {
        Self::default()
    }

    pub fn is_failure(&self) -> bool {
        self.lobby_id.is_empty()
    }
}

impl WirePacket for GenerateNewLobbyResult {
    const KIND: PacketKind = PacketKind::GenerateNewLobbyResult;

    fn encode_into(&self, writer: &mut PayloadWriter) -> Result<(), CodecError> {
        writer.write_bytes(self.lobby_id.as_bytes());
        Ok(())
    }

    fn decode_from(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            lobby_id: reader.read_remaining_string()?,
        })
    }
}

/// 2D vector in world units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

impl Vector {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn write(&self, writer: &mut PayloadWriter) {
        writer.write_f64(self.x).write_f64(self.y);
    }

    fn read(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: reader.read_f64()?,
            y: reader.read_f64()?,
        })
    }
}

/// Entity flag bits
pub mod entity_flags {
    pub const ALIVE: u8 = 1 << 0;
    pub const INVINCIBLE: u8 = 1 << 1;
}

/// Fields shared by every replicated entity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetEntity {
    pub eid: u16,
    pub position: Vector,
    pub velocity: Vector,
    pub eflags: u8,
}

impl NetEntity {
    fn write(&self, writer: &mut PayloadWriter) {
        writer.write_u16(self.eid);
        self.position.write(writer);
        self.velocity.write(writer);
        writer.write_u8(self.eflags);
    }

    fn read(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            eid: reader.read_u16()?,
            position: Vector::read(reader)?,
            velocity: Vector::read(reader)?,
            eflags: reader.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetTank {
    pub entity: NetEntity,
    /// Tenths of a degree
    pub barrel_yaw: u16,
    /// Team in the high nibble, tank type in the low nibble
    pub flags: u8,
}

impl NetTank {
    pub fn team(&self) -> u8 {
        self.flags >> 4
    }

    pub fn tank_type(&self) -> u8 {
        self.flags & 0x0F
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetProjectile {
    pub entity: NetEntity,
    pub base_velocity: Vector,
    pub bounces: u8,
    pub owner_eid: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetMine {
    pub entity: NetEntity,
    pub arm_time: u16,
    pub owner_eid: u16,
}

/// Snapshot of all entities in a game (tag 6, server to client)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityList {
    pub tanks: Vec<NetTank>,
    pub projectiles: Vec<NetProjectile>,
    pub mines: Vec<NetMine>,
}

impl WirePacket for EntityList {
    const KIND: PacketKind = PacketKind::EntityList;

    fn encode_into(&self, writer: &mut PayloadWriter) -> Result<(), CodecError> {
        writer.write_count("tank", self.tanks.len())?;
        for tank in &self.tanks {
            tank.entity.write(writer);
            writer.write_u16(tank.barrel_yaw).write_u8(tank.flags);
        }

        writer.write_count("projectile", self.projectiles.len())?;
        for projectile in &self.projectiles {
            projectile.entity.write(writer);
            projectile.base_velocity.write(writer);
            writer
                .write_u8(projectile.bounces)
                .write_u16(projectile.owner_eid);
        }

        writer.write_count("mine", self.mines.len())?;
        for mine in &self.mines {
            mine.entity.write(writer);
            writer.write_u16(mine.arm_time).write_u16(mine.owner_eid);
        }
        Ok(())
    }

    fn decode_from(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        let tank_count = reader.read_u8()? as usize;
        let mut tanks = Vec::with_capacity(tank_count);
        for _ in 0..tank_count {
            tanks.push(NetTank {
                entity: NetEntity::read(reader)?,
                barrel_yaw: reader.read_u16()?,
                flags: reader.read_u8()?,
            });
        }

        let projectile_count = reader.read_u8()? as usize;
        let mut projectiles = Vec::with_capacity(projectile_count);
        for _ in 0..projectile_count {
            projectiles.push(NetProjectile {
                entity: NetEntity::read(reader)?,
                base_velocity: Vector::read(reader)?,
                bounces: reader.read_u8()?,
                owner_eid: reader.read_u16()?,
            });
        }

        let mine_count = reader.read_u8()? as usize;
        let mut mines = Vec::with_capacity(mine_count);
        for _ in 0..mine_count {
            mines.push(NetMine {
                entity: NetEntity::read(reader)?,
                arm_time: reader.read_u16()?,
                owner_eid: reader.read_u16()?,
            });
        }

        Ok(Self {
            tanks,
            projectiles,
            mines,
        })
    }
}

/// Whiteboard point (tag 81, drawing variant, relayed to everyone)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawNewPoint {
    pub x: u16,
    pub y: u16,
    pub color: u8,
}

impl WirePacket for DrawNewPoint {
    const KIND: PacketKind = PacketKind::DrawNewPoint;

    fn encode_into(&self, writer: &mut PayloadWriter) -> Result<(), CodecError> {
        writer.write_u16(self.x).write_u16(self.y).write_u8(self.color);
        Ok(())
    }

    fn decode_from(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: reader.read_u16()?,
            y: reader.read_u16()?,
            color: reader.read_u8()?,
        })
    }
}
