pub mod attacks;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod errors;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod ratelimit;
pub mod reporting;
pub mod search;
