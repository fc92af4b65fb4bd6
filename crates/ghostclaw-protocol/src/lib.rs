//! ghostclaw-protocol — wire types shared by the gateway: WS client/server
//! message envelopes, RPC method names, and pairing state (C18, C20, C21).

pub mod frames;
pub mod methods;
pub mod pairing;

pub use frames::{ClientEnvelope, ClientMessage, ErrorShape, ServerFrame};
pub use pairing::PairingState;
