//! Broker internals: configuration, authentication hook, subscription trie,
//! session store, message router, per-connection handler and the TCP server
//! that ties them together.

pub mod auth;
mod client_handler;
pub mod config;
mod packet_io;
pub mod router;
mod server;
pub mod session;
pub mod sys_topics;
pub mod trie;

pub use auth::{AllowAllAuthProvider, AuthDecision, AuthProvider, PasswordAuthProvider};
pub use config::BrokerConfig;
pub use server::MqttBroker;
pub use session::{CloseReason, SessionStore};
pub use sys_topics::BrokerStats;
