//! Protocol Messages
//!
//! Binary framing and message payloads shared by match clients and the
//! stateless leaderboard/tag services.
//!
//! Every frame is `[magic:2][type:1][len:2][payload:len]`. The magic and all
//! multi-byte integers are big-endian. Floats inside payloads are
//! little-endian IEEE-754.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::catalog::{AbilityId, MAX_ABILITIES_PER_UNIT};
use crate::game::player::{Offer, MAX_SHOP_SLOTS};
use crate::game::state::{AbilitySlot, Team, Unit, BLUE_TEAM_MAX_SIZE, MAX_UNITS};

/// Frame magic ("JM").
pub const NET_MAGIC: u16 = 0x4A4D;

/// Header bytes before the payload.
pub const HEADER_SIZE: usize = 5;

/// Largest accepted payload.
pub const MAX_PAYLOAD: usize = 4096;

/// Lobby code length.
pub const LOBBY_CODE_LEN: usize = 4;

/// Longest player name carried on the wire.
pub const MAX_NAME_LEN: usize = 15;

/// Serialized unit size.
pub const NET_UNIT_SIZE: usize = 27;

/// Serialized leaderboard record size.
pub const LEADERBOARD_ENTRY_SIZE: usize = 55;

/// Name field width inside a leaderboard record.
const LEADERBOARD_NAME_FIELD: usize = 16;

/// Tag UID length bounds in bytes.
pub const TAG_UID_MIN: usize = 4;
/// Tag UID length bounds in bytes.
pub const TAG_UID_MAX: usize = 7;

/// Message type codes.
pub mod msg {
    /// Create (code "0..." or empty) or join a lobby.
    pub const JOIN: u8 = 0x01;
    /// Lock in the army for this round.
    pub const READY: u8 = 0x02;
    /// Add a unit to the roster.
    pub const PLACE_UNIT: u8 = 0x03;
    /// Remove a roster unit.
    pub const REMOVE_UNIT: u8 = 0x04;
    /// Buy a shop offer.
    pub const BUY_ABILITY: u8 = 0x05;
    /// Paid shop reroll.
    pub const ROLL_SHOP: u8 = 0x06;
    /// Move an inventory ability onto a unit.
    pub const ASSIGN_ABILITY: u8 = 0x07;
    /// Submit a leaderboard record.
    pub const LEADERBOARD_SUBMIT: u8 = 0x10;
    /// Fetch the leaderboard.
    pub const LEADERBOARD_REQUEST: u8 = 0x11;
    /// Register or update a tag.
    pub const TAG_REGISTER: u8 = 0x12;
    /// Look up a tag.
    pub const TAG_LOOKUP: u8 = 0x13;
    /// Replace a tag's abilities.
    pub const TAG_ABILITY_UPDATE: u8 = 0x14;
    /// Clear a tag's abilities.
    pub const TAG_ABILITY_RESET: u8 = 0x15;

    /// Lobby code for the creator.
    pub const LOBBY_CODE: u8 = 0x80;
    /// Both players present.
    pub const GAME_START: u8 = 0x81;
    /// Prep phase begins.
    pub const PREP_START: u8 = 0x82;
    /// Combat begins, with the recipient's view of the field.
    pub const COMBAT_START: u8 = 0x83;
    /// Round finished.
    pub const ROUND_RESULT: u8 = 0x84;
    /// Match finished.
    pub const GAME_OVER: u8 = 0x85;
    /// Current shop offers.
    pub const SHOP_ROLL_RESULT: u8 = 0x86;
    /// Opponent locked in.
    pub const OPPONENT_READY: u8 = 0x87;
    /// Handshake error text.
    pub const ERROR: u8 = 0x88;
    /// Current gold.
    pub const GOLD_UPDATE: u8 = 0x89;
    /// Leaderboard records.
    pub const LEADERBOARD_DATA: u8 = 0x90;
    /// Tag lookup/register reply.
    pub const TAG_DATA: u8 = 0x91;
}

// =============================================================================
// ERRORS
// =============================================================================

/// Framing and payload errors. Any of these drops the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header did not start with the frame magic.
    #[error("bad frame magic 0x{0:04X}")]
    BadMagic(u16),

    /// Declared payload length above the limit.
    #[error("payload of {0} bytes exceeds limit")]
    Oversized(usize),

    /// Payload shorter than its message type requires.
    #[error("truncated payload for message 0x{0:02X}")]
    Truncated(u8),

    /// Payload has the right length but an invalid value.
    #[error("malformed payload for message 0x{msg_type:02X}: {reason}")]
    Malformed {
        /// Message type.
        msg_type: u8,
        /// What was wrong.
        reason: &'static str,
    },

    /// Type code not valid in this direction.
    #[error("unknown message type 0x{0:02X}")]
    UnknownType(u8),

    /// Peer closed the stream.
    #[error("peer disconnected")]
    Disconnected,

    /// Socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// FRAMING
// =============================================================================

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type code.
    pub msg_type: u8,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame.
    pub fn new(msg_type: u8, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// Frame with no payload.
    pub fn empty(msg_type: u8) -> Self {
        Self::new(msg_type, Vec::new())
    }

    /// Header plus payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::Oversized(self.payload.len()));
        }
        let len = self.payload.len() as u16;
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&NET_MAGIC.to_be_bytes());
        out.push(self.msg_type);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// Validate a header and return (type, payload length).
fn parse_header(header: &[u8]) -> Result<(u8, usize), ProtocolError> {
    let magic = u16::from_be_bytes([header[0], header[1]]);
    if magic != NET_MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }
    let size = u16::from_be_bytes([header[3], header[4]]) as usize;
    if size > MAX_PAYLOAD {
        return Err(ProtocolError::Oversized(size));
    }
    Ok((header[2], size))
}

/// Decode one frame from the front of `buf` without blocking.
///
/// Returns `Ok(None)` until the header and the whole payload are buffered,
/// then the frame and the number of bytes it consumed. Bad magic or an
/// oversized length is reported as soon as the header is visible.
///
/// This is the synchronous alternative to [`read_frame`] for callers that
/// poll their own buffer; the server's connection tasks use `read_frame`.
pub fn try_decode_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }
    let (msg_type, size) = parse_header(&buf[..HEADER_SIZE])?;
    let total = HEADER_SIZE + size;
    if buf.len() < total {
        return Ok(None);
    }
    let frame = Frame::new(msg_type, buf[HEADER_SIZE..total].to_vec());
    Ok(Some((frame, total)))
}

/// Read exactly one frame, waiting for all of it.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, ProtocolError> {
    let mut header = [0u8; HEADER_SIZE];
    read_full(reader, &mut header).await?;
    let (msg_type, size) = parse_header(&header)?;
    let mut payload = vec![0u8; size];
    read_full(reader, &mut payload).await?;
    Ok(Frame::new(msg_type, payload))
}

async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::Disconnected),
        Err(e) => Err(e.into()),
    }
}

/// Write one frame and flush it.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<(), ProtocolError> {
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

// =============================================================================
// PAYLOAD CURSOR
// =============================================================================

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    msg_type: u8,
}

impl<'a> Cursor<'a> {
    fn new(frame: &'a Frame) -> Self {
        Self { buf: &frame.payload, pos: 0, msg_type: frame.msg_type }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated(self.msg_type));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn f32(&mut self) -> Result<f32, ProtocolError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn pair(&mut self) -> Result<(i8, u8), ProtocolError> {
        Ok((self.i8()?, self.u8()?))
    }

    fn uid(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.u8()? as usize;
        if !(TAG_UID_MIN..=TAG_UID_MAX).contains(&len) {
            return Err(self.malformed("uid length out of range"));
        }
        Ok(self.take(len)?.to_vec())
    }

    fn malformed(&self, reason: &'static str) -> ProtocolError {
        ProtocolError::Malformed { msg_type: self.msg_type, reason }
    }
}

fn put_uid(out: &mut Vec<u8>, uid: &[u8]) {
    out.push(uid.len() as u8);
    out.extend_from_slice(uid);
}

fn put_pair(out: &mut Vec<u8>, (id, level): (i8, u8)) {
    out.push(id as u8);
    out.push(level);
}

/// Clip a name to `max` bytes on a char boundary.
pub fn clip_name(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

// =============================================================================
// NET UNIT
// =============================================================================

/// A unit as sent on the wire (27 bytes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetUnit {
    /// Archetype index.
    pub archetype: u8,
    /// 0 = Blue, 1 = Red.
    pub team: u8,
    /// Cosmetic rarity.
    pub rarity: u8,
    /// Ground position X.
    pub x: f32,
    /// Ground position Z.
    pub z: f32,
    /// Current health.
    pub health: f32,
    /// Facing in degrees.
    pub facing: f32,
    /// (ability id, level) per slot; id -1 = empty.
    pub abilities: [(i8, u8); MAX_ABILITIES_PER_UNIT],
}

impl NetUnit {
    /// Snapshot a unit.
    pub fn from_unit(unit: &Unit) -> Self {
        let mut abilities = [(-1, 0); MAX_ABILITIES_PER_UNIT];
        for (out, slot) in abilities.iter_mut().zip(&unit.abilities) {
            *out = (AbilityId::to_wire(slot.ability), slot.level);
        }
        Self {
            archetype: unit.archetype,
            team: unit.team as u8,
            rarity: unit.rarity,
            x: unit.position.x,
            z: unit.position.z,
            health: unit.health,
            facing: unit.facing,
            abilities,
        }
    }

    /// Rebuild a live unit. Cooldowns and transient state start cleared.
    pub fn to_unit(&self) -> Unit {
        let mut unit = Unit::new(self.archetype, Team::from_u8(self.team)).at(self.x, self.z);
        unit.rarity = self.rarity;
        unit.health = self.health;
        unit.facing = self.facing;
        for (slot, &(id, level)) in unit.abilities.iter_mut().zip(&self.abilities) {
            *slot = match AbilityId::from_wire(id) {
                Some(ability) => AbilitySlot::new(ability, level),
                None => AbilitySlot::default(),
            };
        }
        unit
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.archetype);
        out.push(self.team);
        out.push(self.rarity);
        for v in [self.x, self.z, self.health, self.facing] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for &pair in &self.abilities {
            put_pair(out, pair);
        }
    }

    fn read(c: &mut Cursor<'_>) -> Result<Self, ProtocolError> {
        let archetype = c.u8()?;
        let team = c.u8()?;
        let rarity = c.u8()?;
        let x = c.f32()?;
        let z = c.f32()?;
        let health = c.f32()?;
        let facing = c.f32()?;
        let mut abilities = [(-1, 0); MAX_ABILITIES_PER_UNIT];
        for pair in &mut abilities {
            *pair = c.pair()?;
        }
        Ok(Self { archetype, team, rarity, x, z, health, facing, abilities })
    }
}

/// Serialize the active units in `units`, at most `MAX_UNITS`.
pub fn net_units(units: &[Unit]) -> Vec<NetUnit> {
    units
        .iter()
        .filter(|u| u.active)
        .take(MAX_UNITS)
        .map(NetUnit::from_unit)
        .collect()
}

// =============================================================================
// LEADERBOARD RECORD
// =============================================================================

/// A unit frozen into a leaderboard record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavedUnit {
    /// Archetype index.
    pub archetype: u8,
    /// (ability, 0-based level) per slot.
    pub abilities: [Option<(AbilityId, u8)>; MAX_ABILITIES_PER_UNIT],
}

/// A leaderboard record (55 bytes on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeaderboardRecord {
    /// Player name, at most 15 bytes.
    pub name: String,
    /// Highest round reached.
    pub round: u16,
    /// Up to four units.
    pub units: Vec<SavedUnit>,
}

impl LeaderboardRecord {
    /// Append the fixed-size encoding.
    pub fn write(&self, out: &mut Vec<u8>) {
        let name = clip_name(&self.name, MAX_NAME_LEN).as_bytes();
        let mut field = [0u8; LEADERBOARD_NAME_FIELD];
        field[..name.len()].copy_from_slice(name);
        out.extend_from_slice(&field);
        out.extend_from_slice(&self.round.to_be_bytes());

        let count = self.units.len().min(BLUE_TEAM_MAX_SIZE);
        out.push(count as u8);
        for i in 0..BLUE_TEAM_MAX_SIZE {
            let unit = self.units.get(i).filter(|_| i < count).copied().unwrap_or_default();
            out.push(unit.archetype);
            for slot in unit.abilities {
                let pair = slot.map_or((-1, 0), |(id, level)| (id as i8, level));
                put_pair(out, pair);
            }
        }
    }

    /// Fixed-size encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LEADERBOARD_ENTRY_SIZE);
        self.write(&mut out);
        out
    }

    fn read(c: &mut Cursor<'_>) -> Result<Self, ProtocolError> {
        let field = c.take(LEADERBOARD_NAME_FIELD)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN).min(MAX_NAME_LEN);
        let name = String::from_utf8_lossy(&field[..end]).into_owned();
        let round = c.u16()?;
        let count = (c.u8()? as usize).min(BLUE_TEAM_MAX_SIZE);

        let mut units = Vec::with_capacity(count);
        for i in 0..BLUE_TEAM_MAX_SIZE {
            let mut unit = SavedUnit { archetype: c.u8()?, ..Default::default() };
            for slot in &mut unit.abilities {
                let (id, level) = c.pair()?;
                *slot = AbilityId::from_wire(id).map(|a| (a, level));
            }
            if i < count {
                units.push(unit);
            }
        }
        Ok(Self { name, round, units })
    }
}

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Create a lobby (`code == None`) or join one.
    Join {
        /// Lobby code to join.
        code: Option<String>,
        /// Player name.
        name: String,
    },
    /// Lock in, optionally replacing the roster.
    Ready {
        /// Army snapshot; empty keeps the server roster.
        units: Vec<NetUnit>,
    },
    /// Add a unit.
    PlaceUnit {
        /// Archetype index.
        archetype: u8,
        /// Ground X.
        x: f32,
        /// Ground Z.
        z: f32,
    },
    /// Remove roster unit.
    RemoveUnit {
        /// Roster index.
        unit: u8,
    },
    /// Buy shop slot.
    BuyAbility {
        /// Shop slot.
        slot: u8,
    },
    /// Paid reroll.
    RollShop,
    /// Swap an inventory ability onto a unit slot.
    AssignAbility {
        /// Inventory slot.
        inventory: u8,
        /// Roster index.
        unit: u8,
        /// Ability slot on the unit.
        slot: u8,
    },
    /// Submit a record.
    LeaderboardSubmit(LeaderboardRecord),
    /// Fetch the board.
    LeaderboardRequest,
    /// Register or update a tag.
    TagRegister {
        /// Raw UID.
        uid: Vec<u8>,
        /// Archetype index.
        archetype: u8,
        /// Rarity.
        rarity: u8,
    },
    /// Look up a tag.
    TagLookup {
        /// Raw UID.
        uid: Vec<u8>,
    },
    /// Replace a tag's abilities.
    TagAbilityUpdate {
        /// Raw UID.
        uid: Vec<u8>,
        /// Up to four (id, level) pairs.
        abilities: Vec<(i8, u8)>,
    },
    /// Clear a tag's abilities.
    TagAbilityReset {
        /// Raw UID.
        uid: Vec<u8>,
    },
}

impl ClientMessage {
    /// Encode to a frame.
    pub fn encode(&self) -> Frame {
        let mut p = Vec::new();
        let msg_type = match self {
            ClientMessage::Join { code, name } => {
                let mut field = [b'0'; LOBBY_CODE_LEN];
                if let Some(code) = code {
                    for (dst, src) in field.iter_mut().zip(code.bytes()) {
                        *dst = src;
                    }
                }
                p.extend_from_slice(&field);
                let name = clip_name(name, MAX_NAME_LEN);
                p.push(name.len() as u8);
                p.extend_from_slice(name.as_bytes());
                msg::JOIN
            }
            ClientMessage::Ready { units } => {
                let count = units.len().min(MAX_UNITS);
                p.push(count as u8);
                for unit in &units[..count] {
                    unit.write(&mut p);
                }
                msg::READY
            }
            ClientMessage::PlaceUnit { archetype, x, z } => {
                p.push(*archetype);
                p.extend_from_slice(&x.to_le_bytes());
                p.extend_from_slice(&z.to_le_bytes());
                msg::PLACE_UNIT
            }
            ClientMessage::RemoveUnit { unit } => {
                p.push(*unit);
                msg::REMOVE_UNIT
            }
            ClientMessage::BuyAbility { slot } => {
                p.push(*slot);
                msg::BUY_ABILITY
            }
            ClientMessage::RollShop => msg::ROLL_SHOP,
            ClientMessage::AssignAbility { inventory, unit, slot } => {
                p.extend_from_slice(&[*inventory, *unit, *slot]);
                msg::ASSIGN_ABILITY
            }
            ClientMessage::LeaderboardSubmit(record) => {
                record.write(&mut p);
                msg::LEADERBOARD_SUBMIT
            }
            ClientMessage::LeaderboardRequest => msg::LEADERBOARD_REQUEST,
            ClientMessage::TagRegister { uid, archetype, rarity } => {
                put_uid(&mut p, uid);
                p.push(*archetype);
                p.push(*rarity);
                msg::TAG_REGISTER
            }
            ClientMessage::TagLookup { uid } => {
                put_uid(&mut p, uid);
                msg::TAG_LOOKUP
            }
            ClientMessage::TagAbilityUpdate { uid, abilities } => {
                put_uid(&mut p, uid);
                let count = abilities.len().min(MAX_ABILITIES_PER_UNIT);
                p.push(count as u8);
                for &pair in &abilities[..count] {
                    put_pair(&mut p, pair);
                }
                msg::TAG_ABILITY_UPDATE
            }
            ClientMessage::TagAbilityReset { uid } => {
                put_uid(&mut p, uid);
                msg::TAG_ABILITY_RESET
            }
        };
        Frame::new(msg_type, p)
    }

    /// Decode a frame. Trailing bytes are ignored.
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(frame);
        let message = match frame.msg_type {
            msg::JOIN => {
                // Short payloads are tolerated: no code creates, no name defaults.
                let code = if c.remaining() >= LOBBY_CODE_LEN {
                    let raw = c.take(LOBBY_CODE_LEN)?;
                    if raw[0] == 0 || raw[0] == b'0' {
                        None
                    } else {
                        Some(String::from_utf8_lossy(raw).into_owned())
                    }
                } else {
                    None
                };
                let name = if c.remaining() >= 1 {
                    let len = (c.u8()? as usize).min(MAX_NAME_LEN);
                    if c.remaining() >= len {
                        String::from_utf8_lossy(c.take(len)?).into_owned()
                    } else {
                        String::new()
                    }
                } else {
                    String::new()
                };
                ClientMessage::Join { code, name }
            }
            msg::READY => {
                let count = if c.remaining() >= 1 { c.u8()? as usize } else { 0 };
                // A short unit list is dropped rather than half-read.
                let units = if count > 0 && c.remaining() >= count * NET_UNIT_SIZE {
                    (0..count).map(|_| NetUnit::read(&mut c)).collect::<Result<_, _>>()?
                } else {
                    Vec::new()
                };
                ClientMessage::Ready { units }
            }
            msg::PLACE_UNIT => ClientMessage::PlaceUnit { archetype: c.u8()?, x: c.f32()?, z: c.f32()? },
            msg::REMOVE_UNIT => ClientMessage::RemoveUnit { unit: c.u8()? },
            msg::BUY_ABILITY => ClientMessage::BuyAbility { slot: c.u8()? },
            msg::ROLL_SHOP => ClientMessage::RollShop,
            msg::ASSIGN_ABILITY => ClientMessage::AssignAbility {
                inventory: c.u8()?,
                unit: c.u8()?,
                slot: c.u8()?,
            },
            msg::LEADERBOARD_SUBMIT => ClientMessage::LeaderboardSubmit(LeaderboardRecord::read(&mut c)?),
            msg::LEADERBOARD_REQUEST => ClientMessage::LeaderboardRequest,
            msg::TAG_REGISTER => ClientMessage::TagRegister { uid: c.uid()?, archetype: c.u8()?, rarity: c.u8()? },
            msg::TAG_LOOKUP => ClientMessage::TagLookup { uid: c.uid()? },
            msg::TAG_ABILITY_UPDATE => {
                let uid = c.uid()?;
                let count = (c.u8()? as usize).min(MAX_ABILITIES_PER_UNIT);
                let mut abilities = Vec::with_capacity(count);
                while abilities.len() < count && c.remaining() >= 2 {
                    abilities.push(c.pair()?);
                }
                ClientMessage::TagAbilityUpdate { uid, abilities }
            }
            msg::TAG_ABILITY_RESET => ClientMessage::TagAbilityReset { uid: c.uid()? },
            other => return Err(ProtocolError::UnknownType(other)),
        };
        Ok(message)
    }
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Round or match result from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MatchResult {
    /// Recipient won.
    Win = 0,
    /// Recipient lost.
    Loss = 1,
    /// Nobody won.
    Draw = 2,
}

impl MatchResult {
    /// Decode a wire byte.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MatchResult::Win),
            1 => Some(MatchResult::Loss),
            2 => Some(MatchResult::Draw),
            _ => None,
        }
    }
}

/// Tag service status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TagStatus {
    /// Found or stored.
    Ok = 0,
    /// Unknown UID.
    NotFound = 1,
    /// Registry full.
    Error = 2,
}

impl TagStatus {
    /// Decode a wire byte.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TagStatus::Ok),
            1 => Some(TagStatus::NotFound),
            2 => Some(TagStatus::Error),
            _ => None,
        }
    }
}

/// Reply to a tag lookup or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReply {
    /// Raw UID echoed back.
    pub uid: Vec<u8>,
    /// Outcome.
    pub status: TagStatus,
    /// Archetype index.
    pub archetype: u8,
    /// Rarity.
    pub rarity: u8,
    /// Present on lookup replies only.
    pub abilities: Option<[(i8, u8); MAX_ABILITIES_PER_UNIT]>,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Code of the lobby just created.
    LobbyCode(String),
    /// Both players connected.
    GameStart {
        /// Recipient slot (0 or 1).
        slot: u8,
        /// Starting gold.
        gold: u8,
        /// Opponent name.
        opponent: String,
    },
    /// Prep phase begins.
    PrepStart {
        /// 0-based round.
        round: u8,
        /// Gold on hand.
        gold: u16,
    },
    /// Combat begins.
    CombatStart {
        /// 0-based round.
        round: u8,
        /// Field as seen by the recipient (own army Blue).
        units: Vec<NetUnit>,
    },
    /// A round resolved.
    RoundResult {
        /// Outcome for the recipient.
        result: MatchResult,
        /// Round wins of player 0 and 1.
        wins: [u8; 2],
        /// Rounds played so far.
        round: u8,
    },
    /// Match finished normally.
    GameOver {
        /// Outcome for the recipient.
        result: MatchResult,
        /// Round wins of player 0 and 1.
        wins: [u8; 2],
    },
    /// Match ended because a player left.
    OpponentLeft {
        /// Slot of the remaining player.
        winner: u8,
        /// Round wins of player 0 and 1.
        wins: [u16; 2],
    },
    /// Current shop offers.
    ShopRoll([Offer; MAX_SHOP_SLOTS]),
    /// Opponent locked in.
    OpponentReady,
    /// Handshake failure text.
    Error(String),
    /// Current gold.
    GoldUpdate(u16),
    /// Leaderboard contents.
    LeaderboardData(Vec<LeaderboardRecord>),
    /// Tag service reply.
    TagData(TagReply),
}

impl ServerMessage {
    /// Encode to a frame.
    pub fn encode(&self) -> Frame {
        let mut p = Vec::new();
        let msg_type = match self {
            ServerMessage::LobbyCode(code) => {
                let mut field = [0u8; LOBBY_CODE_LEN];
                for (dst, src) in field.iter_mut().zip(code.bytes()) {
                    *dst = src;
                }
                p.extend_from_slice(&field);
                msg::LOBBY_CODE
            }
            ServerMessage::GameStart { slot, gold, opponent } => {
                let name = clip_name(opponent, MAX_NAME_LEN);
                p.extend_from_slice(&[*slot, *gold, name.len() as u8]);
                p.extend_from_slice(name.as_bytes());
                msg::GAME_START
            }
            ServerMessage::PrepStart { round, gold } => {
                // Second byte is the PVE flag; multiplayer rounds are always PVP.
                p.extend_from_slice(&[*round, 0]);
                p.extend_from_slice(&gold.to_be_bytes());
                msg::PREP_START
            }
            ServerMessage::CombatStart { round, units } => {
                let count = units.len().min(MAX_UNITS);
                p.extend_from_slice(&[*round, count as u8]);
                for unit in &units[..count] {
                    unit.write(&mut p);
                }
                msg::COMBAT_START
            }
            ServerMessage::RoundResult { result, wins, round } => {
                p.extend_from_slice(&[*result as u8, 0, wins[0], wins[1], *round]);
                msg::ROUND_RESULT
            }
            ServerMessage::GameOver { result, wins } => {
                p.extend_from_slice(&[*result as u8, wins[0], wins[1]]);
                msg::GAME_OVER
            }
            ServerMessage::OpponentLeft { winner, wins } => {
                p.push(*winner);
                p.extend_from_slice(&wins[0].to_be_bytes());
                p.extend_from_slice(&wins[1].to_be_bytes());
                msg::GAME_OVER
            }
            ServerMessage::ShopRoll(offers) => {
                for offer in offers {
                    let pair = offer.map_or((-1, 0), |(id, level)| (id as i8, level));
                    put_pair(&mut p, pair);
                }
                msg::SHOP_ROLL_RESULT
            }
            ServerMessage::OpponentReady => msg::OPPONENT_READY,
            ServerMessage::Error(text) => {
                p.extend_from_slice(text.as_bytes());
                msg::ERROR
            }
            ServerMessage::GoldUpdate(gold) => {
                p.extend_from_slice(&gold.to_be_bytes());
                msg::GOLD_UPDATE
            }
            ServerMessage::LeaderboardData(records) => {
                let count = records.len().min(u8::MAX as usize);
                p.push(count as u8);
                for record in &records[..count] {
                    record.write(&mut p);
                }
                msg::LEADERBOARD_DATA
            }
            ServerMessage::TagData(reply) => {
                put_uid(&mut p, &reply.uid);
                p.extend_from_slice(&[reply.status as u8, reply.archetype, reply.rarity]);
                if let Some(abilities) = &reply.abilities {
                    for &pair in abilities {
                        put_pair(&mut p, pair);
                    }
                }
                msg::TAG_DATA
            }
        };
        Frame::new(msg_type, p)
    }

    /// Decode a frame.
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let mut c = Cursor::new(frame);
        let message = match frame.msg_type {
            msg::LOBBY_CODE => {
                let raw = c.take(LOBBY_CODE_LEN)?;
                ServerMessage::LobbyCode(String::from_utf8_lossy(raw).into_owned())
            }
            msg::GAME_START => {
                let slot = c.u8()?;
                let gold = c.u8()?;
                let len = c.u8()? as usize;
                let opponent = String::from_utf8_lossy(c.take(len)?).into_owned();
                ServerMessage::GameStart { slot, gold, opponent }
            }
            msg::PREP_START => {
                let round = c.u8()?;
                let _pve = c.u8()?;
                ServerMessage::PrepStart { round, gold: c.u16()? }
            }
            msg::COMBAT_START => {
                let round = c.u8()?;
                let count = c.u8()? as usize;
                let units = (0..count).map(|_| NetUnit::read(&mut c)).collect::<Result<_, _>>()?;
                ServerMessage::CombatStart { round, units }
            }
            msg::ROUND_RESULT => {
                let result = c.u8()?;
                let _pve = c.u8()?;
                let wins = [c.u8()?, c.u8()?];
                let round = c.u8()?;
                let result = MatchResult::from_u8(result).ok_or_else(|| c.malformed("result code"))?;
                ServerMessage::RoundResult { result, wins, round }
            }
            // The disconnect variant carries 16-bit win counts.
            msg::GAME_OVER if frame.payload.len() >= 5 => ServerMessage::OpponentLeft {
                winner: c.u8()?,
                wins: [c.u16()?, c.u16()?],
            },
            msg::GAME_OVER => {
                let result = c.u8()?;
                let wins = [c.u8()?, c.u8()?];
                let result = MatchResult::from_u8(result).ok_or_else(|| c.malformed("result code"))?;
                ServerMessage::GameOver { result, wins }
            }
            msg::SHOP_ROLL_RESULT => {
                let mut offers = [None; MAX_SHOP_SLOTS];
                for offer in &mut offers {
                    let (id, level) = c.pair()?;
                    *offer = AbilityId::from_wire(id).map(|a| (a, level));
                }
                ServerMessage::ShopRoll(offers)
            }
            msg::OPPONENT_READY => ServerMessage::OpponentReady,
            msg::ERROR => ServerMessage::Error(String::from_utf8_lossy(&frame.payload).into_owned()),
            msg::GOLD_UPDATE => ServerMessage::GoldUpdate(c.u16()?),
            msg::LEADERBOARD_DATA => {
                let count = c.u8()? as usize;
                let records = (0..count).map(|_| LeaderboardRecord::read(&mut c)).collect::<Result<_, _>>()?;
                ServerMessage::LeaderboardData(records)
            }
            msg::TAG_DATA => {
                let uid = c.uid()?;
                let status = c.u8()?;
                let status = TagStatus::from_u8(status).ok_or_else(|| c.malformed("tag status"))?;
                let archetype = c.u8()?;
                let rarity = c.u8()?;
                let abilities = if c.remaining() >= 2 * MAX_ABILITIES_PER_UNIT {
                    let mut pairs = [(-1, 0); MAX_ABILITIES_PER_UNIT];
                    for pair in &mut pairs {
                        *pair = c.pair()?;
                    }
                    Some(pairs)
                } else {
                    None
                };
                ServerMessage::TagData(TagReply { uid, status, archetype, rarity, abilities })
            }
            other => return Err(ProtocolError::UnknownType(other)),
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_unit() -> Unit {
        Unit::new(2, Team::Red)
            .at(-3.5, 12.25)
            .with_ability(0, AbilityId::ChainFrost, 2)
            .with_ability(3, AbilityId::Dig, 0)
    }

    #[test]
    fn test_frame_layout() {
        let frame = Frame::new(msg::BUY_ABILITY, vec![2]);
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes, vec![0x4A, 0x4D, 0x05, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn test_try_decode_waits_for_whole_frame() {
        let bytes = ClientMessage::PlaceUnit { archetype: 1, x: 1.0, z: 2.0 }.encode().encode().unwrap();
        assert!(try_decode_frame(&bytes[..3]).unwrap().is_none());
        assert!(try_decode_frame(&bytes[..bytes.len() - 1]).unwrap().is_none());

        let mut buf = bytes.clone();
        buf.extend_from_slice(&[0x4A]);
        let (frame, used) = try_decode_frame(&buf).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(frame.msg_type, msg::PLACE_UNIT);
        assert_eq!(frame.payload.len(), 9);
    }

    #[test]
    fn test_bad_magic_and_oversized() {
        let err = try_decode_frame(&[0x12, 0x34, 0x01, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, ProtocolError::BadMagic(0x1234)));

        let err = try_decode_frame(&[0x4A, 0x4D, 0x01, 0x10, 0x01]).unwrap_err();
        assert!(matches!(err, ProtocolError::Oversized(4097)));

        let frame = Frame::new(msg::ERROR, vec![0; MAX_PAYLOAD + 1]);
        assert!(matches!(frame.encode(), Err(ProtocolError::Oversized(_))));
    }

    #[tokio::test]
    async fn test_read_write_frame() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let sent = ServerMessage::GoldUpdate(300).encode();
        write_frame(&mut a, &sent).await.unwrap();
        let got = read_frame(&mut b).await.unwrap();
        assert_eq!(got, sent);
        assert_eq!(ServerMessage::decode(&got).unwrap(), ServerMessage::GoldUpdate(300));

        drop(a);
        assert!(matches!(read_frame(&mut b).await, Err(ProtocolError::Disconnected)));
    }

    #[test]
    fn test_net_unit_layout() {
        let net = NetUnit::from_unit(&sample_unit());
        let mut bytes = Vec::new();
        net.write(&mut bytes);
        assert_eq!(bytes.len(), NET_UNIT_SIZE);
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes[1], 1);
        assert_eq!(&bytes[3..7], &(-3.5f32).to_le_bytes());
        assert_eq!(&bytes[19..21], &[AbilityId::ChainFrost as u8, 2]);
        assert_eq!(&bytes[21..23], &[0xFF, 0]);
    }

    #[test]
    fn test_net_unit_to_unit() {
        let mut source = sample_unit();
        source.health = 7.5;
        source.abilities[0].cooldown = 3.0;
        let unit = NetUnit::from_unit(&source).to_unit();
        assert!(unit.active);
        assert_eq!(unit.team, Team::Red);
        assert_eq!(unit.health, 7.5);
        assert_eq!(unit.position.z, 12.25);
        assert_eq!(unit.abilities[0].ability, Some(AbilityId::ChainFrost));
        assert_eq!(unit.abilities[0].cooldown, 0.0);
        assert_eq!(unit.abilities[1].ability, None);
    }

    #[test]
    fn test_join_decoding() {
        let frame = ClientMessage::Join { code: None, name: "Alice".into() }.encode();
        assert_eq!(&frame.payload[..4], b"0000");
        assert_eq!(
            ClientMessage::decode(&frame).unwrap(),
            ClientMessage::Join { code: None, name: "Alice".into() }
        );

        let frame = ClientMessage::Join { code: Some("AB3Z".into()), name: "a very long player name".into() }.encode();
        let ClientMessage::Join { code, name } = ClientMessage::decode(&frame).unwrap() else {
            panic!("Wrong message type");
        };
        assert_eq!(code.as_deref(), Some("AB3Z"));
        assert_eq!(name.len(), MAX_NAME_LEN);

        // Bare frame is a create with no name
        let bare = Frame::empty(msg::JOIN);
        assert_eq!(
            ClientMessage::decode(&bare).unwrap(),
            ClientMessage::Join { code: None, name: String::new() }
        );
    }

    #[test]
    fn test_ready_with_short_unit_list_is_empty() {
        let mut frame = ClientMessage::Ready { units: vec![NetUnit::from_unit(&sample_unit())] }.encode();
        frame.payload[0] = 2;
        assert_eq!(ClientMessage::decode(&frame).unwrap(), ClientMessage::Ready { units: Vec::new() });
    }

    #[test]
    fn test_place_unit_needs_nine_bytes() {
        let frame = Frame::new(msg::PLACE_UNIT, vec![1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(ClientMessage::decode(&frame), Err(ProtocolError::Truncated(msg::PLACE_UNIT))));
    }

    #[test]
    fn test_unknown_types() {
        assert!(matches!(
            ClientMessage::decode(&Frame::empty(0x42)),
            Err(ProtocolError::UnknownType(0x42))
        ));
        assert!(matches!(
            ServerMessage::decode(&Frame::empty(msg::JOIN)),
            Err(ProtocolError::UnknownType(msg::JOIN))
        ));
    }

    #[test]
    fn test_game_over_variants() {
        let normal = ServerMessage::GameOver { result: MatchResult::Loss, wins: [3, 1] };
        assert_eq!(normal.encode().payload, vec![1, 3, 1]);
        assert_eq!(ServerMessage::decode(&normal.encode()).unwrap(), normal);

        let left = ServerMessage::OpponentLeft { winner: 1, wins: [2, 0] };
        assert_eq!(left.encode().payload, vec![1, 0, 2, 0, 0]);
        assert_eq!(ServerMessage::decode(&left.encode()).unwrap(), left);
    }

    #[test]
    fn test_round_result_layout() {
        let msg = ServerMessage::RoundResult { result: MatchResult::Draw, wins: [1, 2], round: 4 };
        assert_eq!(msg.encode().payload, vec![2, 0, 1, 2, 4]);
    }

    #[test]
    fn test_tag_reply_shapes() {
        let lookup = TagReply {
            uid: vec![0x04, 0xA1, 0xB2, 0xC3],
            status: TagStatus::Ok,
            archetype: 3,
            rarity: 1,
            abilities: Some([(5, 1), (-1, 0), (-1, 0), (-1, 0)]),
        };
        let frame = ServerMessage::TagData(lookup.clone()).encode();
        assert_eq!(frame.payload.len(), 1 + 4 + 3 + 8);
        assert_eq!(ServerMessage::decode(&frame).unwrap(), ServerMessage::TagData(lookup));

        let register = TagReply {
            uid: vec![1, 2, 3, 4, 5, 6, 7],
            status: TagStatus::Error,
            archetype: 0,
            rarity: 0,
            abilities: None,
        };
        let frame = ServerMessage::TagData(register.clone()).encode();
        assert_eq!(frame.payload.len(), 1 + 7 + 3);
        assert_eq!(ServerMessage::decode(&frame).unwrap(), ServerMessage::TagData(register));
    }

    #[test]
    fn test_uid_length_checked() {
        let frame = Frame::new(msg::TAG_LOOKUP, vec![3, 1, 2, 3]);
        assert!(matches!(ClientMessage::decode(&frame), Err(ProtocolError::Malformed { .. })));
        let frame = Frame::new(msg::TAG_LOOKUP, vec![8, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(matches!(ClientMessage::decode(&frame), Err(ProtocolError::Malformed { .. })));
    }

    #[test]
    fn test_tag_ability_update_clamps_count() {
        let frame = Frame::new(msg::TAG_ABILITY_UPDATE, vec![4, 9, 9, 9, 9, 6, 1, 0, 2, 1]);
        let ClientMessage::TagAbilityUpdate { uid, abilities } = ClientMessage::decode(&frame).unwrap() else {
            panic!("Wrong message type");
        };
        assert_eq!(uid, vec![9, 9, 9, 9]);
        assert_eq!(abilities, vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn test_leaderboard_record_name_boundary() {
        let record = LeaderboardRecord {
            name: "FifteenCharName".into(),
            round: 513,
            units: vec![SavedUnit {
                archetype: 1,
                abilities: [Some((AbilityId::MagicMissile, 1)), Some((AbilityId::Vacuum, 0)), None, None],
            }],
        };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), LEADERBOARD_ENTRY_SIZE);
        assert_eq!(&bytes[..15], b"FifteenCharName");
        assert_eq!(bytes[15], 0);
        assert_eq!(&bytes[16..18], &[2, 1]);

        let frame = ClientMessage::LeaderboardSubmit(record.clone()).encode();
        assert_eq!(ClientMessage::decode(&frame).unwrap(), ClientMessage::LeaderboardSubmit(record));
    }

    fn arb_net_unit() -> impl Strategy<Value = NetUnit> {
        (
            0u8..6,
            0u8..2,
            any::<u8>(),
            -50.0f32..50.0,
            -50.0f32..50.0,
            0.0f32..200.0,
            -360.0f32..360.0,
            prop::array::uniform4((-1i8..17, 0u8..3)),
        )
            .prop_map(|(archetype, team, rarity, x, z, health, facing, abilities)| NetUnit {
                archetype,
                team,
                rarity,
                x,
                z,
                health,
                facing,
                abilities,
            })
    }

    fn arb_saved_unit() -> impl Strategy<Value = SavedUnit> {
        (0u8..6, prop::array::uniform4(prop::option::of((0u8..17, 0u8..3)))).prop_map(|(archetype, slots)| {
            let mut unit = SavedUnit { archetype, ..Default::default() };
            for (dst, src) in unit.abilities.iter_mut().zip(slots) {
                *dst = src.and_then(|(id, lvl)| AbilityId::from_u8(id).map(|a| (a, lvl)));
            }
            unit
        })
    }

    proptest! {
        #[test]
        fn prop_combat_start_bytes_roundtrip(round in any::<u8>(), units in prop::collection::vec(arb_net_unit(), 0..8)) {
            let frame = ServerMessage::CombatStart { round, units }.encode();
            let decoded = ServerMessage::decode(&frame).unwrap();
            prop_assert_eq!(decoded.encode(), frame);
        }

        #[test]
        fn prop_leaderboard_record_bytes_roundtrip(
            name in "[A-Za-z0-9 ]{0,15}",
            round in any::<u16>(),
            units in prop::collection::vec(arb_saved_unit(), 0..=4),
        ) {
            let frame = ServerMessage::LeaderboardData(vec![LeaderboardRecord { name, round, units }]).encode();
            let decoded = ServerMessage::decode(&frame).unwrap();
            prop_assert_eq!(decoded.encode(), frame);
        }

        #[test]
        fn prop_decoder_never_panics(msg_type in any::<u8>(), payload in prop::collection::vec(any::<u8>(), 0..64)) {
            let frame = Frame::new(msg_type, payload);
            let _ = ClientMessage::decode(&frame);
            let _ = ServerMessage::decode(&frame);
        }
    }
}
