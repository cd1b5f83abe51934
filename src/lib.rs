pub mod app;
pub mod bot;
pub mod config;
pub mod domain;
pub mod notifier;
pub mod platform;
pub mod processor;
pub mod repository;
pub mod resolver;
pub mod routes;
