//! jinni-sdk: a small async IRC client for bots.
//!
//! Connects over TCP or TLS, registers, keeps the link alive, and turns
//! server lines into [`event::Event`]s. Outgoing traffic goes through a
//! cloneable [`client::ClientHandle`].

pub mod client;
pub mod event;
pub mod irc;
