pub mod alerts;
pub mod client;
pub mod clusters;
pub mod config;
pub mod errors;
pub mod host;
pub mod listing;
pub mod markers;
pub mod metrics;
pub mod model;
pub mod poller;
pub mod rest;
pub mod session;
pub mod storage;
pub mod time_format;
pub mod units;
