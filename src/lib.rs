//! Auction vs. traditional real-estate listing scanner.
//!
//! Source adapters crawl listing portals under a shared anti-block
//! coordinator and write raw captures to the bronze store. The normalizer
//! promotes them to validated listings in the silver store, and the
//! aggregation engine compares the two channels.

pub mod adapter;
pub mod aggregation;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod crawler;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod normalizer;
pub mod pipeline;
pub mod state;
pub mod store;
pub mod types;
