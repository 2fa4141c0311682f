pub mod models;
pub mod rest;
pub mod snapshot;
pub mod websocket;

pub use models::CandleUpdate;
pub use rest::BackendRestClient;
pub use snapshot::{Snapshot, SnapshotSource};
pub use websocket::{ChannelEvent, ChannelHandle, ChannelMessage, ListenerId, ListenerRegistry, LiveChannel};
