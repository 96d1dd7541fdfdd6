pub mod cli;
pub mod services;
pub mod store;
pub mod types;
