//! Notification push over `/ws`.

pub mod hub;
pub mod protocol;
pub mod socket;

pub use hub::NotificationHub;
pub use protocol::WsMessage;
pub use socket::notifications_socket;
