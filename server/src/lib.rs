//! Parley real-time chat server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod ai;
pub mod call;
pub mod chat;
pub mod config;
pub mod db;
pub mod friends;
pub mod notify;
pub mod routes;
pub mod state;
pub mod users;
pub mod ws;
