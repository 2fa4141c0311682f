pub mod session;

pub use session::{ActivePair, JsonFileStore, MemoryStore, SessionState, SessionStore};
