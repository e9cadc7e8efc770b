//! jinni: an IRC bot that links issue tracker references.
//!
//! Watches channel and private messages for ticket IDs (`OS-1234`), GitHub
//! issues (`owner/repo#N`), RFDs and illumos bugs, checks that each one
//! exists over HTTP, and replies with its URL. Repeat replies for the same
//! reference in the same channel are held back for a configurable window.

pub mod bot;
pub mod classify;
pub mod config;
pub mod holdout;
pub mod lookup;
pub mod nick;
pub mod output;
pub mod util;
