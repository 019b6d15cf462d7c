pub mod jsonl;
pub mod memory;
pub mod store;
pub mod types;

pub use jsonl::JsonlSessionStore;
pub use memory::MemorySessionStore;
pub use store::SessionStore;
