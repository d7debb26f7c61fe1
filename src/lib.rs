pub mod account;
pub mod admin;
pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod filters;
pub mod format;
pub mod models;
pub mod routes;
pub mod session;
pub mod theme;
pub mod viewer;
