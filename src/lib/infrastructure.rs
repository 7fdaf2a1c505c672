//! Adapters for the outside world: SMTP relays, the HTTP provider, the
//! network and the HTTP API.

pub mod email;
pub mod http;
pub mod network;
