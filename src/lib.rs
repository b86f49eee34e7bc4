pub mod config;
pub mod engine;
pub mod game;
pub mod models;
pub mod persistence;
pub mod routes;
pub mod websocket;
