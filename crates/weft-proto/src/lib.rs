//! # weft-proto
//!
//! Wire-protocol support for the Weft IRC daemon.
//!
//! This crate is the I/O-free half of the server: it knows how a protocol
//! line looks on the wire and nothing about sockets or state.
//!
//! - [`line`]: parsing and serialising `@tags :source COMMAND params :trailing`
//! - [`casemap`]: RFC 1459 case folding used for nick/channel comparison
//! - [`mask`]: `*`/`?` glob matching and `nick!user@host` mask normalisation
//! - [`numerics`]: the numeric reply table with its format templates
//! - [`valid`]: identifier validation (nicknames, idents, channel names)

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod line;
pub mod mask;
pub mod numerics;
pub mod valid;

pub use casemap::{irc_eq, to_irc_lower};
pub use line::{Line, LineParseError, Tag};
pub use mask::{make_mask, wildcard_match};
pub use numerics::Numeric;
