//! parley-core — wire protocol, keystream, DH parameters, and the client/server
//! state machines shared by every other parley crate.

pub mod config;
pub mod dh;
pub mod hash;
pub mod rc4;
pub mod state;
pub mod wire;

pub use dh::DiffieParams;
pub use rc4::Rc4;
pub use state::{ClientIdentity, ClientState, ServerState, World};
pub use wire::{b64_decode, b64_encode, ClientMessage, ServerMessage};
