pub mod api;
pub mod app;
pub mod config;
pub mod contract;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod security;
pub mod service;
