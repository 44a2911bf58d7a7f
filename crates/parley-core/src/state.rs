//! The client and server protocol state machines.
//!
//! Both machines are pure: `on_init`/`on_message` take the current state and
//! an incoming message and return `(outgoing message, next state)`. All I/O
//! belongs to the driver crates (`parleyd`, `parley-client`); nothing in this
//! module touches a socket. Transitions never fail — an unexpected message
//! always produces a well-formed error frame and an `ErrorState`/`ErrorState`
//! transition ("errors inside a state machine are returned as a
//! transition, never thrown mid-step").

use num_bigint::{BigUint, RandBigInt};
use num_traits::Zero;
use rand::Rng;

use crate::hash::solve_task;
use crate::rc4::Rc4;
use crate::wire::{ClientMessage, ServerMessage, ERR_UNKNOWN_USER, ERR_WRONG_HASH};

/// The credentials the client state machine needs from its caller: a
/// username and the already-hashed password.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub username: String,
    pub password_hash: String,
}

/// The external user directory the server state machine consults. Exposes
/// exactly the three operations the core depends on. Has two
/// implementations in this workspace: a SQLite-backed `UserDirectory`
/// (`parley-services`) and the MITM's `MockWorld`, which answers `true` to
/// every `has_user` call — preserved verbatim, not "fixed".
pub trait World {
    fn has_user(&self, username: &str) -> bool;
    fn get_user_password_hash(&self, username: &str) -> String;
    fn get_diffie_params(&self, username: &str) -> (BigUint, BigUint);
}

// ── Client state machine ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ClientState {
    StartState,
    NonceRequested,
    DiffieStarted,
    DiffieDone { key: BigUint, rc4: Rc4 },
    ErrorState { message: String },
    Closed,
}

impl ClientState {
    /// `StartState.on_init`: the only transition not driven by an incoming
    /// server message — it kicks off the handshake.
    pub fn on_init(identity: &ClientIdentity) -> (ClientMessage, ClientState) {
        (
            ClientMessage::ConnectRequest { username: identity.username.clone() },
            ClientState::NonceRequested,
        )
    }

    /// `on_message`: dispatch on `(self, message)` as a single match, with
    /// every unhandled combination falling through to the same
    /// default-to-error arm.
    pub fn on_message(
        self,
        message: ServerMessage,
        identity: &ClientIdentity,
    ) -> (ClientMessage, ClientState) {
        match (self, message) {
            (ClientState::NonceRequested, ServerMessage::Nonce { nonce }) => {
                let answer = solve_task(&identity.password_hash, &nonce);
                (ClientMessage::HashAnswer { answer }, ClientState::DiffieStarted)
            }
            (
                ClientState::DiffieStarted,
                ServerMessage::DiffieRequest { g, p, server_public_value },
            ) => {
                let g = parse_biguint(&g);
                let p = parse_biguint(&p);
                let a = parse_biguint(&server_public_value);

                let client_secret = random_in_range(&p);
                let client_public = g.modpow(&client_secret, &p);
                let key = a.modpow(&client_secret, &p);

                let client_public_value = client_public.to_str_radix(10);
                (
                    ClientMessage::DiffieAnswer { client_public_value },
                    ClientState::DiffieDone { rc4: Rc4::new(&key), key },
                )
            }
            (state @ ClientState::DiffieStarted, ServerMessage::DiffieOk) => {
                // DiffieOk is only meaningful after DiffieStarted has already
                // produced DiffieDone; seeing it one step early means the
                // driver misrouted a frame. Treat it as any other surprise.
                client_error("got DiffieOk before completing the exchange", state)
            }
            (state, unexpected) => {
                client_error(&format!("got unexpected message {unexpected:?}"), state)
            }
        }
    }
}

fn client_error(message: &str, state: ClientState) -> (ClientMessage, ClientState) {
    let _ = state;
    (
        ClientMessage::ClientError { message: message.to_string() },
        ClientState::ErrorState { message: message.to_string() },
    )
}

// ── Server state machine ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ServerState {
    Start,
    TaskRequested { nonce: String, username: String },
    PasswordSolved { username: String, g: BigUint, p: BigUint, server_secret: BigUint },
    DiffieDone { username: String, shared_key: BigUint, rc4: Rc4 },
    ErrorState { message: String },
    Closed,
}

impl ServerState {
    /// `on_message`: dispatch on `(self, message)`.
    pub fn on_message(self, message: ClientMessage, world: &dyn World) -> (ServerMessage, ServerState) {
        match (self, message) {
            (ServerState::Start, ClientMessage::ConnectRequest { username }) => {
                if !world.has_user(&username) {
                    return server_error(ERR_UNKNOWN_USER, ServerState::Start);
                }
                let nonce = random_nonce_hex();
                (
                    ServerMessage::Nonce { nonce: nonce.clone() },
                    ServerState::TaskRequested { nonce, username },
                )
            }
            (
                ServerState::TaskRequested { nonce, username },
                ClientMessage::HashAnswer { answer },
            ) => {
                let password_hash = world.get_user_password_hash(&username);
                let expected = solve_task(&password_hash, &nonce);
                if answer != expected {
                    return server_error(ERR_WRONG_HASH, ServerState::TaskRequested { nonce, username });
                }
                let (g, p) = world.get_diffie_params(&username);
                let server_secret = random_in_range(&p);
                let server_public = g.modpow(&server_secret, &p);
                let response = ServerMessage::DiffieRequest {
                    g: g.to_str_radix(10),
                    p: p.to_str_radix(10),
                    server_public_value: server_public.to_str_radix(10),
                };
                (response, ServerState::PasswordSolved { username, g, p, server_secret })
            }
            (
                ServerState::PasswordSolved { username, p, server_secret, .. },
                ClientMessage::DiffieAnswer { client_public_value },
            ) => {
                let client_public = parse_biguint(&client_public_value);
                let shared_key = client_public.modpow(&server_secret, &p);
                (
                    ServerMessage::DiffieOk,
                    ServerState::DiffieDone { username, rc4: Rc4::new(&shared_key), shared_key },
                )
            }
            (state, unexpected) => {
                server_error(&format!("got unexpected message {unexpected:?}"), state)
            }
        }
    }
}

fn server_error(message: &str, state: ServerState) -> (ServerMessage, ServerState) {
    let _ = state;
    (
        ServerMessage::ServerError { text: message.to_string() },
        ServerState::ErrorState { message: message.to_string() },
    )
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Draw a random value in `[2, p-1]` inclusive.
fn random_in_range(p: &BigUint) -> BigUint {
    let two = BigUint::from(2u32);
    debug_assert!(p > &BigUint::from(3u32), "p must leave room for [2, p-1]");
    // `gen_biguint_range`'s upper bound is exclusive, so passing `p` yields
    // values in `[2, p-1]` inclusive, a closed range.
    rand::thread_rng().gen_biguint_range(&two, p)
}

fn random_nonce_hex() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn parse_biguint(s: &str) -> BigUint {
    s.parse().unwrap_or_else(|_| BigUint::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dh::DiffieParams;

    struct TestWorld {
        username: String,
        password_hash: String,
        params: DiffieParams,
        has_user: bool,
    }

    impl World for TestWorld {
        fn has_user(&self, username: &str) -> bool {
            self.has_user && username == self.username
        }
        fn get_user_password_hash(&self, _username: &str) -> String {
            self.password_hash.clone()
        }
        fn get_diffie_params(&self, _username: &str) -> (BigUint, BigUint) {
            (self.params.g.clone(), self.params.p.clone())
        }
    }

    fn run_handshake(world: &TestWorld, identity: &ClientIdentity) -> (ClientState, ServerState) {
        let mut client = ClientState::StartState;
        let mut server = ServerState::Start;

        let (connect, next_client) = ClientState::on_init(identity);
        client = next_client;
        let (nonce_msg, next_server) = server.on_message(connect, world);
        server = next_server;

        let (hash_answer, next_client) = client.on_message(nonce_msg, identity);
        client = next_client;
        let (diffie_request, next_server) = server.on_message(hash_answer, world);
        server = next_server;

        let (diffie_answer, next_client) = client.on_message(diffie_request, identity);
        client = next_client;
        let (_diffie_ok, next_server) = server.on_message(diffie_answer, world);
        server = next_server;

        (client, server)
    }

    #[test]
    fn happy_path_converges_on_shared_key() {
        let params = DiffieParams::generate(24, 16, crate::dh::DEFAULT_MILLER_RABIN_ROUNDS);
        let world = TestWorld {
            username: "alice".into(),
            password_hash: crate::hash::hash_hex(b"hunter2"),
            params,
            has_user: true,
        };
        let identity =
            ClientIdentity { username: "alice".into(), password_hash: world.password_hash.clone() };

        let (client, server) = run_handshake(&world, &identity);

        match (client, server) {
            (ClientState::DiffieDone { key, .. }, ServerState::DiffieDone { shared_key, .. }) => {
                assert_eq!(key, shared_key);
            }
            other => panic!("expected both sides DiffieDone, got {other:?}"),
        }
    }

    #[test]
    fn unknown_user_never_gets_a_nonce() {
        let params = DiffieParams::generate(24, 16, crate::dh::DEFAULT_MILLER_RABIN_ROUNDS);
        let world =
            TestWorld { username: "alice".into(), password_hash: String::new(), params, has_user: false };

        let (msg, state) = ServerState::Start.on_message(
            ClientMessage::ConnectRequest { username: "bob".into() },
            &world,
        );
        assert_eq!(msg, ServerMessage::ServerError { text: ERR_UNKNOWN_USER.to_string() });
        assert!(matches!(state, ServerState::ErrorState { .. }));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let params = DiffieParams::generate(24, 16, crate::dh::DEFAULT_MILLER_RABIN_ROUNDS);
        let world = TestWorld {
            username: "alice".into(),
            password_hash: crate::hash::hash_hex(b"pw1"),
            params,
            has_user: true,
        };

        let state = ServerState::TaskRequested { nonce: "deadbeef".into(), username: "alice".into() };
        let wrong_answer = solve_task(&crate::hash::hash_hex(b"pw2"), "deadbeef");
        let (msg, next) =
            state.on_message(ClientMessage::HashAnswer { answer: wrong_answer }, &world);
        assert_eq!(msg, ServerMessage::ServerError { text: ERR_WRONG_HASH.to_string() });
        assert!(matches!(next, ServerState::ErrorState { .. }));
    }

    #[test]
    fn unexpected_message_in_start_state_is_an_error() {
        let params = DiffieParams::generate(24, 16, crate::dh::DEFAULT_MILLER_RABIN_ROUNDS);
        let world =
            TestWorld { username: "alice".into(), password_hash: String::new(), params, has_user: true };
        let (msg, state) = ServerState::Start.on_message(ClientMessage::ClientGoodbye, &world);
        assert!(matches!(msg, ServerMessage::ServerError { .. }));
        assert!(matches!(state, ServerState::ErrorState { .. }));
    }
}
