// pilight-api: Async Rust client for the pilight daemon WebSocket API.

pub mod config;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod websocket;

pub use config::HubConfig;
pub use error::Error;
pub use protocol::{ControlCode, ControlValues, Message, PowerState, Request, StateUpdate};
pub use websocket::{HubClient, HubEvent, SendTicket};
