pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod docs;
pub mod domain;
pub mod error;
pub mod linker;
pub mod lookup;
pub mod models;
pub mod pagination;
pub mod policy;
pub mod relocation;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod utils;
