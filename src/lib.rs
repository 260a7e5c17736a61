pub mod activity;
pub mod anchor;
pub mod artifact;
pub mod auth;
pub mod certificates;
pub mod config;
pub mod db;
pub mod error;
pub mod fonts;
pub mod hashing;
pub mod pdf;
pub mod raster;
pub mod routes;
pub mod state;
pub mod storage;
pub mod templates;
pub mod verification;
