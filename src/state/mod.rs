//! Server state: the entity registry, channels and the world container.

pub mod channel;
pub mod entity;
pub mod network;
pub mod uid;

pub use channel::{Channel, ChannelMember, Invite, ListEntry};
pub use entity::{Entity, EntityId, EntityKind, ServerInfo, UserInfo};
pub use network::Network;
pub use uid::UidAllocator;
