pub mod api;
pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod db;
pub mod errors;
pub mod models;
pub mod service;
pub mod session;
