//! Rust client for the HTTP API and the notification socket.

pub mod api;
pub mod backoff;
pub mod socket;

pub use api::{ApiClient, ClientError, ClientResult};
pub use backoff::ReconnectBackoff;
pub use socket::{NotificationSocket, SocketExit, socket_url};
