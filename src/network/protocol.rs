// pongmatch wire protocol
// Rendezvous messages travel client <-> coordinator over a websocket,
// peer messages travel host <-> guest over the direct channel. Both are JSON.

use crate::game::{GameSnapshot, InputFlags};
use serde::{Deserialize, Serialize};

pub type PeerId = String;
pub type MatchId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::Host => Role::Guest,
            Role::Guest => Role::Host,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl BallSpeed {
    pub fn multiplier(self) -> f32 {
        match self {
            BallSpeed::Slow => 0.75,
            BallSpeed::Normal => 1.0,
            BallSpeed::Fast => 1.35,
        }
    }
}

pub const MAX_WIN_SCORE: u8 = 21;

/// Settings a player declares when joining. The host's copy is authoritative for the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameSettings {
    pub ball_speed: BallSpeed,
    pub win_score: u8,
    pub power_ups: bool,
    /// Cosmetic only, never taken from the host
    pub theme: String,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            ball_speed: BallSpeed::Normal,
            win_score: 5,
            power_ups: true,
            theme: "classic".to_string(),
        }
    }
}

impl GameSettings {
    /// Clamp values a config file or a peer could get wrong
    pub fn sanitized(mut self) -> Self {
        self.win_score = self.win_score.clamp(1, MAX_WIN_SCORE);
        self
    }

    /// Take the host's gameplay values, keep the local theme
    pub fn adopt_host(&mut self, host: &GameSettings) {
        let theme = std::mem::take(&mut self.theme);
        *self = host.clone().sanitized();
        self.theme = theme;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentInfo {
    pub id: PeerId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Client <-> coordinator messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RendezvousMessage {
    JoinMatchmaking {
        player_id: PeerId,
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        game_settings: GameSettings,
    },

    LeaveMatchmaking {
        player_id: PeerId,
    },

    /// Coordinator acknowledgement of a join
    Queued {
        player_id: PeerId,
        position: usize,
    },

    MatchFound {
        match_id: MatchId,
        role: Role,
        opponent: OpponentInfo,
    },

    WebrtcOffer {
        match_id: MatchId,
        offer: String,
    },

    WebrtcAnswer {
        match_id: MatchId,
        answer: String,
    },

    WebrtcIceCandidate {
        match_id: MatchId,
        candidate: String,
    },

    /// The opponent's rendezvous link dropped
    OpponentDisconnected {
        disconnected_player: PeerId,
        reason: String,
    },

    PlayerQuit {
        player_id: PeerId,
        match_id: MatchId,
        reason: String,
        timestamp: u64,
    },

    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Offer,
    Answer,
    Candidate,
}

/// Opaque negotiation blob as seen by the relay: only the tag is ever inspected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    pub kind: PayloadKind,
    pub blob: String,
}

impl HandshakePayload {
    pub fn into_message(self, match_id: MatchId) -> RendezvousMessage {
        match self.kind {
            PayloadKind::Offer => RendezvousMessage::WebrtcOffer {
                match_id,
                offer: self.blob,
            },
            PayloadKind::Answer => RendezvousMessage::WebrtcAnswer {
                match_id,
                answer: self.blob,
            },
            PayloadKind::Candidate => RendezvousMessage::WebrtcIceCandidate {
                match_id,
                candidate: self.blob,
            },
        }
    }
}

impl RendezvousMessage {
    /// Split a handshake message into its routing key and payload
    pub fn into_handshake(self) -> Result<(MatchId, HandshakePayload), RendezvousMessage> {
        match self {
            RendezvousMessage::WebrtcOffer { match_id, offer } => Ok((
                match_id,
                HandshakePayload {
                    kind: PayloadKind::Offer,
                    blob: offer,
                },
            )),
            RendezvousMessage::WebrtcAnswer { match_id, answer } => Ok((
                match_id,
                HandshakePayload {
                    kind: PayloadKind::Answer,
                    blob: answer,
                },
            )),
            RendezvousMessage::WebrtcIceCandidate {
                match_id,
                candidate,
            } => Ok((
                match_id,
                HandshakePayload {
                    kind: PayloadKind::Candidate,
                    blob: candidate,
                },
            )),
            other => Err(other),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Host <-> guest messages over the direct channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PeerMessage {
    /// Host's authoritative settings, pushed right after the channel opens
    GameSettings { settings: GameSettings },

    /// Guest has shown the settings and is ready for the first snapshot
    PlayerReady,

    GameUpdate { state: GameSnapshot },

    PlayerInput { input: InputFlags },

    VoluntaryDisconnect {
        player_id: PeerId,
        reason: String,
        timestamp: u64,
    },

    PlayerDisconnect { reason: String },

    /// The sender recorded the match result; the receiver must not record it again
    MatchSaved { player_id: PeerId, timestamp: u64 },
}

impl PeerMessage {
    /// Sent every tick and superseded by the next one, so safe to drop under backpressure
    pub fn is_per_tick(&self) -> bool {
        matches!(self, PeerMessage::GameUpdate { .. } | PeerMessage::PlayerInput { .. })
    }

    /// Serialize message to bytes for transmission
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Milliseconds since the Unix epoch, for message timestamps
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_settings_clamped_on_adopt() {
        let mut mine = GameSettings {
            theme: "neon".to_string(),
            ..GameSettings::default()
        };
        mine.adopt_host(&GameSettings {
            win_score: 0,
            ..GameSettings::default()
        });
        assert_eq!(mine.win_score, 1);
        assert_eq!(mine.theme, "neon");

        let huge = GameSettings {
            win_score: 200,
            ..GameSettings::default()
        };
        assert_eq!(huge.sanitized().win_score, MAX_WIN_SCORE);
    }

    #[test]
    fn test_join_wire_shape() {
        let msg = RendezvousMessage::JoinMatchmaking {
            player_id: "p-1".to_string(),
            username: "Alice".to_string(),
            user_id: None,
            game_settings: GameSettings::default(),
        };
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "join_matchmaking");
        assert_eq!(value["playerId"], "p-1");
        assert_eq!(value["gameSettings"]["winScore"], 5);
        assert!(value.get("userId").is_none());
    }

    #[test]
    fn test_match_found_from_coordinator_json() {
        let text = json!({
            "type": "match_found",
            "matchId": "m-7",
            "role": "guest",
            "opponent": {"id": "p-1", "username": "Alice", "userId": "u-42"}
        })
        .to_string();

        let msg = RendezvousMessage::from_json(&text).unwrap();
        assert_eq!(
            msg,
            RendezvousMessage::MatchFound {
                match_id: "m-7".to_string(),
                role: Role::Guest,
                opponent: OpponentInfo {
                    id: "p-1".to_string(),
                    username: "Alice".to_string(),
                    user_id: Some("u-42".to_string()),
                },
            }
        );
    }

    #[test]
    fn test_handshake_split_keeps_blob_opaque() {
        let msg = RendezvousMessage::WebrtcIceCandidate {
            match_id: "m-1".to_string(),
            candidate: "candidate:1 1 udp 2130706431 10.0.0.2 5000 typ host".to_string(),
        };
        let (match_id, payload) = msg.clone().into_handshake().unwrap();
        assert_eq!(match_id, "m-1");
        assert_eq!(payload.kind, PayloadKind::Candidate);
        assert_eq!(payload.into_message(match_id), msg);

        let not_handshake = RendezvousMessage::Error {
            message: "nope".to_string(),
        };
        assert!(not_handshake.into_handshake().is_err());
    }

    #[test]
    fn test_peer_input_wire_shape() {
        let msg = PeerMessage::PlayerInput {
            input: InputFlags {
                up: true,
                down: false,
            },
        };
        let value: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "player_input", "input": {"up": true, "down": false}}));

        let ready = PeerMessage::from_bytes(br#"{"type":"player_ready"}"#).unwrap();
        assert_eq!(ready, PeerMessage::PlayerReady);
    }

    #[test]
    fn test_adopt_host_keeps_theme() {
        let mut mine = GameSettings {
            theme: "neon".to_string(),
            ..GameSettings::default()
        };
        let host = GameSettings {
            ball_speed: BallSpeed::Fast,
            win_score: 3,
            power_ups: false,
            theme: "amber".to_string(),
        };
        mine.adopt_host(&host);
        assert_eq!(mine.win_score, 3);
        assert_eq!(mine.ball_speed, BallSpeed::Fast);
        assert!(!mine.power_ups);
        assert_eq!(mine.theme, "neon");
    }
}
