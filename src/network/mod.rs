//! Network Layer
//!
//! Framed binary TCP protocol, match sessions and the server that ties
//! them to sockets. This layer is **non-deterministic** (wall-clock prep
//! timers, entropy-seeded lobby codes); combat itself runs in `game/`.

pub mod protocol;
pub mod server;
pub mod session;

pub use protocol::{ClientMessage, Frame, ProtocolError, ServerMessage};
pub use server::{serve_request, GameServer, GameServerError, ServerConfig};
pub use session::{GameSession, SessionConfig, SessionError, SessionManager, SessionState};
