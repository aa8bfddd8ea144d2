//! Core deckchat library (streaming client, session state, deck, rasterization, config).

pub mod client;
pub mod config;
pub mod deck;
pub mod events;
pub mod logging;
pub mod models;
pub mod raster;
pub mod session;
