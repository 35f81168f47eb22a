pub mod archive;
pub mod attendance;
pub mod config;
pub mod export;
pub mod fetch;
pub mod history;
pub mod month;
pub mod normalize;
pub mod schema;
pub mod stats;
pub mod store;
