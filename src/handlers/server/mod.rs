//! Server-to-server command handlers.

pub mod link;
pub mod misc;
pub mod sjoin;
pub mod tkl;
pub mod uid;
