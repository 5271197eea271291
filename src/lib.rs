pub mod args;
pub mod bunq_api;
pub mod cli;
pub mod config;
pub mod db;
pub mod firefly_api;
pub mod server;
pub mod sync;
pub mod terminal;

#[cfg(test)]
mod testutils;
