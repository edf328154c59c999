//! Security services: cloaking and server bans.

pub mod cloak;
pub mod tkl;
