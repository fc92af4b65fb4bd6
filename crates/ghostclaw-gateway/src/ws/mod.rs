pub mod connection;
pub mod frame;
pub mod handshake;
pub mod hub;
pub mod server;
