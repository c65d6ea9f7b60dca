//! Match Session Management
//!
//! One session is a 1v1 match: a lobby waiting for its second player, then
//! alternating prep and combat phases until someone reaches the win target.
//! Sessions are owned by the server tick loop and advanced with `tick(dt)`;
//! players talk to them through a pair of channels.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, info, warn};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::is_valid_archetype;
use crate::game::compose::compose_pvp;
use crate::game::events::CombatEvent;
use crate::game::player::{PlayerState, MAX_SHOP_SLOTS};
use crate::game::state::{CombatState, Team, Unit};
use crate::game::tick::{combat_tick, Outcome};
use crate::network::protocol::{net_units, ClientMessage, MatchResult, ServerMessage, LOBBY_CODE_LEN};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Characters used in lobby codes (no 0/O or 1/I).
pub const LOBBY_CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Fixed combat step.
pub const COMBAT_DT: f32 = 1.0 / 60.0;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the second player.
    Waiting,
    /// Shopping and placement.
    Prep,
    /// Combat resolving.
    Combat,
    /// Finished; the slot can be reused.
    Dead,
}

/// Configuration for a match session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gold each player starts with.
    pub starting_gold: u32,
    /// Seconds before unready players are readied automatically.
    pub prep_time: f32,
    /// Cost of a paid shop reroll.
    pub reroll_cost: u32,
    /// Gold given to both players after each round.
    pub round_bonus: u32,
    /// Round wins that end the match.
    pub wins_to_finish: u32,
    /// Absolute round cap.
    pub max_rounds: u32,
    /// Combat steps before a round is called a draw (120 seconds at 60Hz).
    pub max_combat_ticks: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            starting_gold: 10,
            prep_time: 45.0,
            reroll_cost: 2,
            round_bonus: 5,
            wins_to_finish: 3,
            max_rounds: 10,
            max_combat_ticks: 7200,
        }
    }
}

/// Something a connection delivers to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerInput {
    /// A decoded client message.
    Message(ClientMessage),
    /// The connection closed or sent garbage.
    Disconnected,
}

/// Channels connecting a session to one player's socket tasks.
#[derive(Debug)]
pub struct PlayerLink {
    /// Messages to the player.
    pub outbox: mpsc::Sender<ServerMessage>,
    /// Messages from the player.
    pub inbox: mpsc::Receiver<PlayerInput>,
}

impl PlayerLink {
    /// Bundle both directions.
    pub fn new(outbox: mpsc::Sender<ServerMessage>, inbox: mpsc::Receiver<PlayerInput>) -> Self {
        Self { outbox, inbox }
    }

    /// Queue a message without waiting.
    ///
    /// A full queue drops the message; the peer is too far behind to matter.
    pub fn send(&self, msg: ServerMessage) {
        match self.outbox.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => warn!("Outbox full, dropping {:?}", msg),
            Err(TrySendError::Closed(_)) => debug!("Outbox closed"),
        }
    }
}

/// A player seated in a session.
#[derive(Debug)]
pub struct SessionPlayer {
    /// Economy and roster.
    pub state: PlayerState,
    /// Connection channels.
    link: PlayerLink,
    /// Still connected.
    pub connected: bool,
}

impl SessionPlayer {
    fn new(name: String, gold: u32, link: PlayerLink) -> Self {
        Self { state: PlayerState::new(name, gold), link, connected: true }
    }

    fn send(&self, msg: ServerMessage) {
        if self.connected {
            self.link.send(msg);
        }
    }

    fn send_shop(&self) {
        self.send(ServerMessage::ShopRoll(self.state.shop));
        self.send(ServerMessage::GoldUpdate(gold_u16(self.state.gold)));
    }

    /// Next input, or `Disconnected` when the channel is gone.
    fn poll(&mut self) -> Option<PlayerInput> {
        match self.link.inbox.try_recv() {
            Ok(input) => Some(input),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(PlayerInput::Disconnected),
        }
    }
}

fn gold_u16(gold: u32) -> u16 {
    gold.min(u16::MAX as u32) as u16
}

/// A 1v1 match.
#[derive(Debug)]
pub struct GameSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Four-character join code.
    pub lobby_code: String,
    /// Current state.
    state: SessionState,
    /// Session configuration.
    config: SessionConfig,
    /// Seat 0 is the creator, seat 1 the joiner.
    players: Vec<SessionPlayer>,
    /// Rounds completed.
    round: u32,
    /// Round wins per seat.
    wins: [u32; 2],
    /// Canonical combat: seat 0 Blue, seat 1 Red.
    combat: CombatState,
    /// Combat steps run this round.
    combat_ticks: u32,
    /// Events of the latest combat step.
    last_events: Vec<CombatEvent>,
    /// Events seen this round.
    round_events: usize,
    /// Seconds left in prep.
    prep_timer: f32,
    /// Shop rolls.
    rng: DeterministicRng,
}

impl GameSession {
    /// Open a lobby for `name` and send them the code.
    pub fn new(lobby_code: String, config: SessionConfig, seed: u64, name: String, link: PlayerLink) -> Self {
        let creator = SessionPlayer::new(name, config.starting_gold, link);
        creator.send(ServerMessage::LobbyCode(lobby_code.clone()));
        info!("[Session {}] Created by '{}', waiting for opponent", lobby_code, creator.state.name);

        Self {
            id: uuid::Uuid::new_v4().into_bytes(),
            lobby_code,
            state: SessionState::Waiting,
            config,
            players: vec![creator],
            round: 0,
            wins: [0, 0],
            combat: CombatState::new(),
            combat_ticks: 0,
            last_events: Vec::new(),
            round_events: 0,
            prep_timer: 0.0,
            rng: DeterministicRng::new(seed),
        }
    }

    /// Seat the second player and start the first prep phase.
    pub fn add_player(&mut self, name: String, link: PlayerLink) -> Result<(), SessionError> {
        if self.state != SessionState::Waiting {
            return Err(SessionError::NotWaiting);
        }
        self.players.push(SessionPlayer::new(name, self.config.starting_gold, link));

        let starting_gold = self.config.starting_gold.min(u8::MAX as u32) as u8;
        for p in 0..2 {
            let opponent = self.players[1 - p].state.name.clone();
            self.players[p].send(ServerMessage::GameStart { slot: p as u8, gold: starting_gold, opponent });
        }

        info!(
            "[Session {}] '{}' joined '{}', starting game",
            self.lobby_code, self.players[1].state.name, self.players[0].state.name
        );
        self.start_prep();
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Rounds completed.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Round wins per seat.
    pub fn wins(&self) -> [u32; 2] {
        self.wins
    }

    /// Seat `idx`.
    pub fn player(&self, idx: usize) -> Option<&SessionPlayer> {
        self.players.get(idx)
    }

    /// Canonical combat container.
    pub fn combat(&self) -> &CombatState {
        &self.combat
    }

    /// Events of the latest combat step.
    pub fn last_events(&self) -> &[CombatEvent] {
        &self.last_events
    }

    /// Events seen so far this round.
    pub fn round_events(&self) -> usize {
        self.round_events
    }

    /// Advance by `dt` seconds of wall time.
    ///
    /// Inputs are drained FIFO per player first, then the phase timer or one
    /// combat step runs. A phase entered during the drain starts running on
    /// the next tick. Returns the state afterwards.
    pub fn tick(&mut self, dt: f32) -> SessionState {
        let phase = self.state;
        if phase == SessionState::Dead {
            return phase;
        }

        for p in 0..self.players.len() {
            while let Some(input) = self.players[p].poll() {
                match input {
                    PlayerInput::Disconnected => {
                        self.handle_disconnect(p);
                        return self.state;
                    }
                    PlayerInput::Message(msg) => self.handle_message(p, msg),
                }
            }
        }
        if self.state != phase {
            return self.state;
        }

        match self.state {
            SessionState::Prep => {
                self.prep_timer -= dt;
                if self.prep_timer <= 0.0 {
                    for (p, player) in self.players.iter_mut().enumerate() {
                        if !player.state.ready {
                            player.state.ready = true;
                            info!("[Session {}] Player {} auto-readied (timer expired)", self.lobby_code, p);
                        }
                    }
                    self.start_combat();
                }
            }
            SessionState::Combat => {
                let result = combat_tick(&mut self.combat, COMBAT_DT);
                self.combat_ticks += 1;
                for event in &result.events {
                    debug!("[Session {}] tick {}: {:?}", self.lobby_code, self.combat_ticks, event);
                }
                self.round_events += result.events.len();
                self.last_events = result.events;
                if result.outcome.is_terminal() {
                    self.finish_round(result.outcome);
                } else if self.combat_ticks >= self.config.max_combat_ticks {
                    warn!("[Session {}] Round {} hit the combat cap, calling it a draw", self.lobby_code, self.round);
                    self.finish_round(Outcome::Draw);
                }
            }
            SessionState::Waiting | SessionState::Dead => {}
        }

        self.state
    }

    /// Apply one client message. Anything out of phase is ignored.
    pub fn handle_message(&mut self, p: usize, msg: ClientMessage) {
        if self.state != SessionState::Prep {
            debug!("[Session {}] Ignoring {:?} from player {} in {:?}", self.lobby_code, msg, p, self.state);
            return;
        }
        let reroll_cost = self.config.reroll_cost;
        let player = &mut self.players[p];

        match msg {
            ClientMessage::Ready { units } => {
                let roster: Vec<Unit> = units
                    .iter()
                    .filter(|u| is_valid_archetype(u.archetype))
                    .map(|u| {
                        let mut unit = u.to_unit();
                        unit.team = Team::Blue;
                        unit
                    })
                    .collect();
                player.state.set_roster(roster);
                player.state.ready = true;
                info!(
                    "[Session {}] Player {} ready ({} units)",
                    self.lobby_code,
                    p,
                    player.state.active_units()
                );

                self.players[1 - p].send(ServerMessage::OpponentReady);
                if self.players.iter().all(|pl| pl.state.ready) {
                    self.start_combat();
                }
            }
            ClientMessage::RollShop => {
                if player.state.roll_shop(&mut self.rng, reroll_cost) {
                    player.send_shop();
                }
            }
            ClientMessage::BuyAbility { slot } => {
                if (slot as usize) < MAX_SHOP_SLOTS {
                    player.state.buy(slot as usize);
                    player.send_shop();
                }
            }
            ClientMessage::PlaceUnit { archetype, x, z } => {
                player.state.place_unit(archetype, x, z);
            }
            ClientMessage::RemoveUnit { unit } => {
                player.state.remove_unit(unit as usize);
            }
            ClientMessage::AssignAbility { inventory, unit, slot } => {
                player.state.assign_ability(inventory as usize, unit as usize, slot as usize);
            }
            other => {
                debug!("[Session {}] Unexpected {:?} from player {}", self.lobby_code, other, p);
            }
        }
    }

    fn start_prep(&mut self) {
        self.state = SessionState::Prep;
        self.prep_timer = self.config.prep_time;
        let round = self.round.min(u8::MAX as u32) as u8;

        for player in &mut self.players {
            player.state.ready = false;
            player.state.roll_shop(&mut self.rng, 0);
            player.send(ServerMessage::PrepStart { round, gold: gold_u16(player.state.gold) });
            player.send(ServerMessage::ShopRoll(player.state.shop));
        }
        debug!("[Session {}] Prep for round {}", self.lobby_code, self.round);
    }

    fn start_combat(&mut self) {
        self.state = SessionState::Combat;
        self.combat_ticks = 0;
        self.round_events = 0;
        self.last_events.clear();
        let round = self.round.min(u8::MAX as u32) as u8;

        compose_pvp(&mut self.combat, &self.players[0].state.roster, &self.players[1].state.roster);
        self.players[0].send(ServerMessage::CombatStart { round, units: net_units(&self.combat.units) });

        // Seat 1 sees itself as Blue
        let mut view = CombatState::new();
        compose_pvp(&mut view, &self.players[1].state.roster, &self.players[0].state.roster);
        self.players[1].send(ServerMessage::CombatStart { round, units: net_units(&view.units) });

        let (blue, red) = self.combat.count_teams();
        info!("[Session {}] Combat round {}: {} vs {}", self.lobby_code, self.round, blue, red);
    }

    fn finish_round(&mut self, outcome: Outcome) {
        let winner = match outcome {
            Outcome::BlueWins => Some(0),
            Outcome::RedWins => Some(1),
            Outcome::Draw | Outcome::Fighting => None,
        };
        if let Some(w) = winner {
            self.wins[w] += 1;
        }
        self.round += 1;

        let wins = [self.wins[0].min(255) as u8, self.wins[1].min(255) as u8];
        let round = self.round.min(u8::MAX as u32) as u8;
        for (p, player) in self.players.iter().enumerate() {
            player.send(ServerMessage::RoundResult { result: result_for(winner, p), wins, round });
        }
        info!(
            "[Session {}] Round {} over: {:?} after {} steps and {} events, wins {}-{}",
            self.lobby_code, self.round, outcome, self.combat_ticks, self.round_events, self.wins[0], self.wins[1]
        );

        let target = self.config.wins_to_finish;
        let match_winner = if self.wins[0] >= target || self.wins[1] >= target {
            Some(if self.wins[0] >= target { Some(0) } else { Some(1) })
        } else if self.round >= self.config.max_rounds {
            Some(match self.wins[0].cmp(&self.wins[1]) {
                std::cmp::Ordering::Greater => Some(0),
                std::cmp::Ordering::Less => Some(1),
                std::cmp::Ordering::Equal => None,
            })
        } else {
            None
        };

        if let Some(match_winner) = match_winner {
            for (p, player) in self.players.iter().enumerate() {
                player.send(ServerMessage::GameOver { result: result_for(match_winner, p), wins });
            }
            info!("[Session {}] Game over, winner {:?}", self.lobby_code, match_winner);
            self.state = SessionState::Dead;
            return;
        }

        for player in &mut self.players {
            player.state.gold += self.config.round_bonus;
        }
        self.start_prep();
    }

    fn handle_disconnect(&mut self, p: usize) {
        info!("[Session {}] Player {} disconnected", self.lobby_code, p);
        self.players[p].connected = false;

        if let Some(other) = self.players.get(1 - p).filter(|o| o.connected) {
            let wins = [self.wins[0].min(u16::MAX as u32) as u16, self.wins[1].min(u16::MAX as u32) as u16];
            other.send(ServerMessage::OpponentLeft { winner: (1 - p) as u8, wins });
        }
        self.state = SessionState::Dead;
    }
}

fn result_for(winner: Option<usize>, seat: usize) -> MatchResult {
    match winner {
        Some(w) if w == seat => MatchResult::Win,
        Some(_) => MatchResult::Loss,
        None => MatchResult::Draw,
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Every session slot is live.
    #[error("Server full")]
    ServerFull,

    /// No waiting lobby has that code.
    #[error("Lobby not found")]
    LobbyNotFound,

    /// The session already has two players.
    #[error("Session is not waiting for players")]
    NotWaiting,
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Owns every session. A finished session is dropped from its slot, which
/// closes its players' channels; empty slots are reused first.
#[derive(Debug)]
pub struct SessionManager {
    /// Session slots.
    slots: Vec<Option<GameSession>>,
    /// Maximum slots.
    max_sessions: usize,
    /// Configuration for new sessions.
    config: SessionConfig,
    /// Lobby codes and session seeds.
    rng: DeterministicRng,
}

impl SessionManager {
    /// Create a manager.
    pub fn new(max_sessions: usize, config: SessionConfig, rng: DeterministicRng) -> Self {
        Self { slots: Vec::with_capacity(max_sessions), max_sessions, config, rng }
    }

    fn live(&self) -> impl Iterator<Item = &GameSession> {
        self.slots.iter().flatten()
    }

    fn generate_code(&mut self) -> String {
        loop {
            let code: String = (0..LOBBY_CODE_LEN)
                .map(|_| LOBBY_CODE_CHARS[self.rng.next_int(LOBBY_CODE_CHARS.len() as u32) as usize] as char)
                .collect();
            if !self.live().any(|s| s.lobby_code == code) {
                return code;
            }
        }
    }

    /// Open a new lobby for `name`. Returns its code.
    ///
    /// When full, the player is sent an error and the link is dropped.
    pub fn create(&mut self, name: String, link: PlayerLink) -> Result<String, SessionError> {
        let free = self.slots.iter().position(Option::is_none);
        if free.is_none() && self.slots.len() >= self.max_sessions {
            warn!("Cannot create session for '{}': server full", name);
            link.send(ServerMessage::Error(SessionError::ServerFull.to_string()));
            return Err(SessionError::ServerFull);
        }

        let code = self.generate_code();
        let seed = self.rng.next_u64();
        let session = GameSession::new(code.clone(), self.config.clone(), seed, name, link);
        match free {
            Some(idx) => self.slots[idx] = Some(session),
            None => self.slots.push(Some(session)),
        }
        Ok(code)
    }

    /// Seat `name` in the waiting lobby `code`.
    pub fn join(&mut self, code: &str, name: String, link: PlayerLink) -> Result<(), SessionError> {
        let Some(session) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|s| s.state == SessionState::Waiting && s.lobby_code.eq_ignore_ascii_case(code))
        else {
            info!("Lobby {} not found for '{}'", code, name);
            link.send(ServerMessage::Error(SessionError::LobbyNotFound.to_string()));
            return Err(SessionError::LobbyNotFound);
        };
        session.add_player(name, link)
    }

    /// Advance every live session and release the ones that finished.
    pub fn tick_all(&mut self, dt: f32) {
        for slot in &mut self.slots {
            let finished = slot.as_mut().is_some_and(|s| s.tick(dt) == SessionState::Dead);
            if finished {
                if let Some(session) = slot.take() {
                    debug!("[Session {}] Released", session.lobby_code);
                }
            }
        }
    }

    /// Look up a live session by code.
    pub fn get(&self, code: &str) -> Option<&GameSession> {
        self.live().find(|s| s.lobby_code == code)
    }

    /// Live session count.
    pub fn live_count(&self) -> usize {
        self.live().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::AbilityId;
    use crate::network::protocol::NetUnit;

    struct Client {
        input: mpsc::Sender<PlayerInput>,
        output: mpsc::Receiver<ServerMessage>,
    }

    impl Client {
        async fn say(&self, msg: ClientMessage) {
            self.input.send(PlayerInput::Message(msg)).await.unwrap();
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.output.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn link() -> (PlayerLink, Client) {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        (PlayerLink::new(out_tx, in_rx), Client { input: in_tx, output: out_rx })
    }

    fn started_session(config: SessionConfig) -> (GameSession, Client, Client) {
        let (l0, mut c0) = link();
        let (l1, mut c1) = link();
        let mut session = GameSession::new("TEST".into(), config, 42, "Alice".into(), l0);
        session.add_player("Bob".into(), l1).unwrap();
        c0.drain();
        c1.drain();
        (session, c0, c1)
    }

    fn army(archetype: u8, count: usize) -> Vec<NetUnit> {
        (0..count)
            .map(|i| NetUnit::from_unit(&Unit::new(archetype, Team::Blue).at(i as f32 * 3.0, 10.0)))
            .collect()
    }

    #[tokio::test]
    async fn test_lobby_code_and_game_start() {
        let (l0, mut c0) = link();
        let (l1, mut c1) = link();
        let mut session = GameSession::new("ABCD".into(), SessionConfig::default(), 1, "Alice".into(), l0);
        assert_eq!(c0.drain(), vec![ServerMessage::LobbyCode("ABCD".into())]);
        assert_eq!(session.state(), SessionState::Waiting);

        session.add_player("Bob".into(), l1).unwrap();
        assert_eq!(session.state(), SessionState::Prep);

        let m0 = c0.drain();
        assert_eq!(m0[0], ServerMessage::GameStart { slot: 0, gold: 10, opponent: "Bob".into() });
        assert_eq!(m0[1], ServerMessage::PrepStart { round: 0, gold: 10 });
        assert!(matches!(m0[2], ServerMessage::ShopRoll(offers) if offers.iter().all(|o| o.is_some())));

        let m1 = c1.drain();
        assert_eq!(m1[0], ServerMessage::GameStart { slot: 1, gold: 10, opponent: "Alice".into() });
    }

    #[tokio::test]
    async fn test_cannot_add_third_player() {
        let (mut session, _c0, _c1) = started_session(SessionConfig::default());
        let (l2, _c2) = link();
        assert_eq!(session.add_player("Eve".into(), l2), Err(SessionError::NotWaiting));
    }

    #[tokio::test]
    async fn test_roll_shop_charges_and_reports() {
        let (mut session, mut c0, _c1) = started_session(SessionConfig::default());
        c0.say(ClientMessage::RollShop).await;
        session.tick(0.016);

        let msgs = c0.drain();
        assert!(matches!(msgs[0], ServerMessage::ShopRoll(_)));
        assert_eq!(msgs[1], ServerMessage::GoldUpdate(8));
        assert_eq!(session.player(0).unwrap().state.gold, 8);
    }

    #[tokio::test]
    async fn test_roll_without_gold_is_silent() {
        let (mut session, mut c0, _c1) = started_session(SessionConfig::default());
        session.players[0].state.gold = 1;
        c0.say(ClientMessage::RollShop).await;
        session.tick(0.016);
        assert!(c0.drain().is_empty());
    }

    #[tokio::test]
    async fn test_buy_sends_shop_and_gold() {
        let (mut session, mut c0, _c1) = started_session(SessionConfig::default());
        session.players[0].state.shop[1] = Some((AbilityId::MagicMissile, 0));
        c0.say(ClientMessage::BuyAbility { slot: 1 }).await;
        session.tick(0.016);

        let msgs = c0.drain();
        let ServerMessage::ShopRoll(offers) = msgs[0] else {
            panic!("Wrong message type");
        };
        assert_eq!(offers[1], None);
        assert_eq!(msgs[1], ServerMessage::GoldUpdate(7));
        assert_eq!(session.player(0).unwrap().state.inventory[0], Some((AbilityId::MagicMissile, 0)));
    }

    #[tokio::test]
    async fn test_ready_notifies_and_starts_combat() {
        let (mut session, mut c0, mut c1) = started_session(SessionConfig::default());
        c0.say(ClientMessage::Ready { units: army(1, 2) }).await;
        session.tick(0.016);
        assert_eq!(session.state(), SessionState::Prep);
        assert_eq!(c1.drain(), vec![ServerMessage::OpponentReady]);

        c1.say(ClientMessage::Ready { units: army(0, 1) }).await;
        session.tick(0.016);
        assert_eq!(session.state(), SessionState::Combat);
        assert_eq!(c0.drain()[0], ServerMessage::OpponentReady);

        // Each player sees their own army as Blue
        let ServerMessage::CombatStart { round, units } = &c1.drain()[0] else {
            panic!("Wrong message type");
        };
        assert_eq!(*round, 0);
        assert_eq!(units.len(), 3);
        assert_eq!((units[0].archetype, units[0].team), (0, 0));
        assert_eq!((units[1].archetype, units[1].team), (1, 1));
        assert_eq!(units[1].z, -10.0);

        let combat = session.combat();
        assert_eq!(combat.count_teams(), (2, 1));
        assert_eq!(combat.units[2].team, Team::Red);
    }

    #[tokio::test]
    async fn test_combat_events_surface() {
        let (mut session, mut c0, mut c1) = started_session(SessionConfig::default());
        let rager = Unit::new(0, Team::Blue).at(0.0, 10.0).with_ability(0, AbilityId::BloodRage, 0);
        c0.say(ClientMessage::Ready { units: vec![NetUnit::from_unit(&rager)] }).await;
        c1.say(ClientMessage::Ready { units: army(0, 1) }).await;
        session.tick(0.016);
        assert_eq!(session.state(), SessionState::Combat);
        assert_eq!(session.round_events(), 0);
        c0.drain();
        c1.drain();

        // Self-cast needs no range, so it fires on the first step
        session.tick(0.016);
        assert!(session
            .last_events()
            .iter()
            .any(|e| matches!(e, CombatEvent::AbilityCast { unit: 0, ability: AbilityId::BloodRage, .. })));
        assert!(session.round_events() >= 1);

        // Events stay server-side
        assert!(c0.drain().is_empty());
    }

    #[tokio::test]
    async fn test_messages_ignored_outside_prep() {
        let (l0, mut c0) = link();
        let mut session = GameSession::new("WAIT".into(), SessionConfig::default(), 3, "Solo".into(), l0);
        c0.drain();
        c0.say(ClientMessage::RollShop).await;
        session.tick(0.016);
        assert!(c0.drain().is_empty());
        assert_eq!(session.player(0).unwrap().state.gold, 10);
    }

    #[tokio::test]
    async fn test_prep_timer_auto_readies() {
        let config = SessionConfig { prep_time: 1.0, ..Default::default() };
        let (mut session, _c0, _c1) = started_session(config);
        session.players[0].state.place_unit(0, 0.0, 10.0);
        session.players[1].state.place_unit(0, 0.0, 10.0);

        session.tick(0.5);
        assert_eq!(session.state(), SessionState::Prep);
        session.tick(0.6);
        assert_eq!(session.state(), SessionState::Combat);
        assert!(session.player(1).unwrap().state.ready);
    }

    #[tokio::test]
    async fn test_round_result_and_bonus() {
        let (mut session, mut c0, mut c1) = started_session(SessionConfig::default());
        c0.say(ClientMessage::Ready { units: army(0, 2) }).await;
        c1.say(ClientMessage::Ready { units: Vec::new() }).await;
        session.tick(0.016);
        assert_eq!(session.state(), SessionState::Combat);
        c0.drain();
        c1.drain();

        // Seat 1 has no army, so Blue wins on the first step
        session.tick(0.016);
        assert_eq!(session.state(), SessionState::Prep);
        assert_eq!(session.wins(), [1, 0]);

        let m0 = c0.drain();
        assert_eq!(m0[0], ServerMessage::RoundResult { result: MatchResult::Win, wins: [1, 0], round: 1 });
        assert_eq!(m0[1], ServerMessage::PrepStart { round: 1, gold: 15 });
        let m1 = c1.drain();
        assert_eq!(m1[0], ServerMessage::RoundResult { result: MatchResult::Loss, wins: [1, 0], round: 1 });
    }

    #[tokio::test]
    async fn test_three_wins_end_the_match() {
        let (mut session, mut c0, mut c1) = started_session(SessionConfig::default());
        session.players[0].state.place_unit(1, 0.0, 10.0);

        for _ in 0..3 {
            c0.say(ClientMessage::Ready { units: Vec::new() }).await;
            c1.say(ClientMessage::Ready { units: Vec::new() }).await;
            session.tick(0.016);
            session.tick(0.016);
        }
        assert_eq!(session.state(), SessionState::Dead);
        assert_eq!(session.wins(), [3, 0]);

        let last0 = c0.drain().pop().unwrap();
        assert_eq!(last0, ServerMessage::GameOver { result: MatchResult::Win, wins: [3, 0] });
        let last1 = c1.drain().pop().unwrap();
        assert_eq!(last1, ServerMessage::GameOver { result: MatchResult::Loss, wins: [3, 0] });
    }

    #[tokio::test]
    async fn test_round_cap_compares_wins() {
        let config = SessionConfig { max_rounds: 2, ..Default::default() };
        let (mut session, mut c0, mut c1) = started_session(config);

        // Empty armies on both sides draw instantly
        for _ in 0..2 {
            c0.say(ClientMessage::Ready { units: Vec::new() }).await;
            c1.say(ClientMessage::Ready { units: Vec::new() }).await;
            session.tick(0.016);
            session.tick(0.016);
        }
        assert_eq!(session.state(), SessionState::Dead);
        assert_eq!(session.wins(), [0, 0]);
        assert_eq!(
            c0.drain().pop().unwrap(),
            ServerMessage::GameOver { result: MatchResult::Draw, wins: [0, 0] }
        );
    }

    #[tokio::test]
    async fn test_combat_cap_is_a_draw() {
        let config = SessionConfig { max_combat_ticks: 2, ..Default::default() };
        let (mut session, mut c0, mut c1) = started_session(config);
        // Far apart, no abilities: nobody dies within two steps
        c0.say(ClientMessage::Ready { units: army(0, 1) }).await;
        c1.say(ClientMessage::Ready { units: army(0, 1) }).await;
        session.tick(0.016);
        c0.drain();

        session.tick(0.016);
        assert_eq!(session.state(), SessionState::Combat);
        session.tick(0.016);
        assert_eq!(session.state(), SessionState::Prep);
        assert_eq!(session.wins(), [0, 0]);
        assert_eq!(
            c0.drain()[0],
            ServerMessage::RoundResult { result: MatchResult::Draw, wins: [0, 0], round: 1 }
        );
    }

    #[tokio::test]
    async fn test_disconnect_awards_opponent() {
        let (mut session, c0, mut c1) = started_session(SessionConfig::default());
        drop(c0);
        assert_eq!(session.tick(0.016), SessionState::Dead);
        assert_eq!(c1.drain(), vec![ServerMessage::OpponentLeft { winner: 1, wins: [0, 0] }]);
    }

    #[tokio::test]
    async fn test_waiting_creator_disconnect() {
        let (l0, c0) = link();
        let mut session = GameSession::new("GONE".into(), SessionConfig::default(), 9, "Solo".into(), l0);
        c0.input.send(PlayerInput::Disconnected).await.unwrap();
        assert_eq!(session.tick(0.016), SessionState::Dead);
    }

    #[tokio::test]
    async fn test_ready_filters_invalid_archetypes() {
        let (mut session, c0, _c1) = started_session(SessionConfig::default());
        let mut units = army(2, 2);
        units[1].archetype = 42;
        units[0].team = 1;
        c0.say(ClientMessage::Ready { units }).await;
        session.tick(0.016);

        let roster = &session.player(0).unwrap().state.roster;
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].team, Team::Blue);
    }

    #[tokio::test]
    async fn test_manager_create_join_and_reuse() {
        let mut manager = SessionManager::new(1, SessionConfig::default(), DeterministicRng::new(5));
        let (l0, mut c0) = link();
        let code = manager.create("Alice".into(), l0).unwrap();
        assert_eq!(code.len(), LOBBY_CODE_LEN);
        assert!(code.bytes().all(|b| LOBBY_CODE_CHARS.contains(&b)));
        assert_eq!(c0.drain(), vec![ServerMessage::LobbyCode(code.clone())]);

        let (l1, mut c1) = link();
        assert_eq!(manager.create("Bob".into(), l1), Err(SessionError::ServerFull));
        assert_eq!(c1.drain(), vec![ServerMessage::Error("Server full".into())]);

        let (l2, mut c2) = link();
        assert_eq!(manager.join("ZZZZ", "Bob".into(), l2), Err(SessionError::LobbyNotFound));
        assert_eq!(c2.drain(), vec![ServerMessage::Error("Lobby not found".into())]);

        let (l3, _c3) = link();
        manager.join(&code.to_ascii_lowercase(), "Bob".into(), l3).unwrap();
        assert_eq!(manager.get(&code).unwrap().state(), SessionState::Prep);

        // Creator leaves, slot frees up
        drop(c0);
        manager.tick_all(0.016);
        assert_eq!(manager.live_count(), 0);
        let (l4, _c4) = link();
        assert!(manager.create("Carol".into(), l4).is_ok());
        assert_eq!(manager.live_count(), 1);
    }
}
