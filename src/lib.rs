pub mod client;
pub mod codec;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod mapper;
pub mod pending;
pub mod pool;
pub mod reply;
pub mod request;
pub mod subscriber;

pub use client::Client;
pub use config::{ClientConfig, SubscriberConfig};
pub use error::{Error, Result};
pub use pool::ClientPool;
pub use reply::Reply;
pub use request::Request;
pub use subscriber::{Message, Subscriber, SubscriberState};
