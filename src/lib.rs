//! User attribute service: named key/value attributes attached to user
//! accounts, with an audited SQLite store and a JSON admin surface.

pub mod admin;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
