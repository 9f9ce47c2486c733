pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod jobs;
pub mod linker;
pub mod normalize;
pub mod types;
