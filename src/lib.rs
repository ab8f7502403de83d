pub mod ai;
pub mod api;
pub mod config;
pub mod context;
pub mod coverage;
pub mod db;
pub mod render;
pub mod resolve;
