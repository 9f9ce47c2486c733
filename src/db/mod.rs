pub mod lock;
pub mod migrate;
pub mod models;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod writer;

pub use lock::StoreLock;
pub use store::Store;
