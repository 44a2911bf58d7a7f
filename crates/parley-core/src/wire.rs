//! The message codec — a tagged message set on newline-delimited JSON
//! frames.
//!
//! Each frame is a JSON object with a numeric `id` field that selects its
//! variant. `serde`'s internally-tagged enums only support string tags, so
//! decoding here is hand-rolled: peek at `id` in a raw `serde_json::Value`,
//! then deserialize the matching strict struct (`deny_unknown_fields`) out
//! of that same value. Any object whose `id` is unrecognised, or whose
//! fields don't match exactly, decodes to `UnknownMessage` rather than
//! erroring out — a strict, forbid-unknown-fields tagged union.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Base64-encode ciphertext for a `ClientData`/`ServerCryptogramm` payload.
pub fn b64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Base64-decode a `ClientData`/`ServerCryptogramm` payload.
pub fn b64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(data)
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotObject,
    #[error("frame has no integer `id` field")]
    MissingId,
}

// ── Client → Server ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    ConnectRequest { username: String },
    HashAnswer { answer: String },
    DiffieAnswer { client_public_value: String },
    ClientData { data: String },
    ClientGoodbye,
    ClientError { message: String },
    Unknown,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ConnectRequestBody {
    id: u32,
    username: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct HashAnswerBody {
    id: u32,
    answer: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct DiffieAnswerBody {
    id: u32,
    client_public_value: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ClientDataBody {
    id: u32,
    data: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ClientGoodbyeBody {
    id: u32,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ClientErrorBody {
    id: u32,
    message: String,
}

impl ClientMessage {
    pub fn decode(line: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(line)?;
        let obj = value.as_object().ok_or(WireError::NotObject)?;
        let id = obj.get("id").and_then(Value::as_u64).ok_or(WireError::MissingId)?;

        let msg = match id {
            0 => serde_json::from_value::<ConnectRequestBody>(value)
                .ok()
                .map(|b| ClientMessage::ConnectRequest { username: b.username }),
            1 => serde_json::from_value::<HashAnswerBody>(value)
                .ok()
                .map(|b| ClientMessage::HashAnswer { answer: b.answer }),
            2 => serde_json::from_value::<DiffieAnswerBody>(value)
                .ok()
                .map(|b| ClientMessage::DiffieAnswer { client_public_value: b.client_public_value }),
            3 => serde_json::from_value::<ClientDataBody>(value)
                .ok()
                .map(|b| ClientMessage::ClientData { data: b.data }),
            4 => serde_json::from_value::<ClientGoodbyeBody>(value)
                .ok()
                .map(|_| ClientMessage::ClientGoodbye),
            100 => serde_json::from_value::<ClientErrorBody>(value)
                .ok()
                .map(|b| ClientMessage::ClientError { message: b.message }),
            _ => None,
        };

        Ok(msg.unwrap_or(ClientMessage::Unknown))
    }

    pub fn encode(&self) -> String {
        let value = match self {
            ClientMessage::ConnectRequest { username } => {
                serde_json::to_value(ConnectRequestBody { id: 0, username: username.clone() })
            }
            ClientMessage::HashAnswer { answer } => {
                serde_json::to_value(HashAnswerBody { id: 1, answer: answer.clone() })
            }
            ClientMessage::DiffieAnswer { client_public_value } => serde_json::to_value(DiffieAnswerBody {
                id: 2,
                client_public_value: client_public_value.clone(),
            }),
            ClientMessage::ClientData { data } => {
                serde_json::to_value(ClientDataBody { id: 3, data: data.clone() })
            }
            ClientMessage::ClientGoodbye => serde_json::to_value(ClientGoodbyeBody { id: 4 }),
            ClientMessage::ClientError { message } => {
                serde_json::to_value(ClientErrorBody { id: 100, message: message.clone() })
            }
            ClientMessage::Unknown => unreachable!("Unknown is never encoded, only decoded"),
        }
        .expect("message serializes to a JSON value");
        value.to_string()
    }
}

// ── Server → Client ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Nonce { nonce: String },
    DiffieRequest { g: String, p: String, server_public_value: String },
    DiffieOk,
    ServerCryptogramm { content: String },
    ServerError { text: String },
    Unknown,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct NonceBody {
    id: u32,
    nonce: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct DiffieRequestBody {
    id: u32,
    g: String,
    p: String,
    server_public_value: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct DiffieOkBody {
    id: u32,
    message: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ServerCryptogrammBody {
    id: u32,
    content: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ServerErrorBody {
    id: u32,
    text: String,
}

impl ServerMessage {
    pub fn decode(line: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(line)?;
        let obj = value.as_object().ok_or(WireError::NotObject)?;
        let id = obj.get("id").and_then(Value::as_u64).ok_or(WireError::MissingId)?;

        let msg = match id {
            0 => serde_json::from_value::<NonceBody>(value)
                .ok()
                .map(|b| ServerMessage::Nonce { nonce: b.nonce }),
            1 => serde_json::from_value::<DiffieRequestBody>(value).ok().map(|b| {
                ServerMessage::DiffieRequest { g: b.g, p: b.p, server_public_value: b.server_public_value }
            }),
            2 => serde_json::from_value::<DiffieOkBody>(value)
                .ok()
                .map(|_| ServerMessage::DiffieOk),
            3 => serde_json::from_value::<ServerCryptogrammBody>(value)
                .ok()
                .map(|b| ServerMessage::ServerCryptogramm { content: b.content }),
            10 => serde_json::from_value::<ServerErrorBody>(value)
                .ok()
                .map(|b| ServerMessage::ServerError { text: b.text }),
            _ => None,
        };

        Ok(msg.unwrap_or(ServerMessage::Unknown))
    }

    pub fn encode(&self) -> String {
        let value = match self {
            ServerMessage::Nonce { nonce } => serde_json::to_value(NonceBody { id: 0, nonce: nonce.clone() }),
            ServerMessage::DiffieRequest { g, p, server_public_value } => {
                serde_json::to_value(DiffieRequestBody {
                    id: 1,
                    g: g.clone(),
                    p: p.clone(),
                    server_public_value: server_public_value.clone(),
                })
            }
            ServerMessage::DiffieOk => {
                serde_json::to_value(DiffieOkBody { id: 2, message: "ok".to_string() })
            }
            ServerMessage::ServerCryptogramm { content } => {
                serde_json::to_value(ServerCryptogrammBody { id: 3, content: content.clone() })
            }
            ServerMessage::ServerError { text } => {
                serde_json::to_value(ServerErrorBody { id: 10, text: text.clone() })
            }
            ServerMessage::Unknown => unreachable!("Unknown is never encoded, only decoded"),
        }
        .expect("message serializes to a JSON value");
        value.to_string()
    }
}

// ── Canonical error substrings ─────────────────────────────────────────────

pub const ERR_UNKNOWN_USER: &str = "user does not exist";
pub const ERR_WRONG_HASH: &str = "wrong hash answer";
