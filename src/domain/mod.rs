pub mod filter;
pub mod projector;
pub mod record;
pub mod scheduler;
pub mod snapshot_store;
pub mod types;
pub mod view_model;
