//! Recipe sharing backend: users follow authors, publish recipes built from
//! a shared ingredient catalogue, and keep favorites and a shopping cart.

pub mod auth;
pub mod config;
pub mod db;
pub mod dto;
pub mod error;
pub mod image;
pub mod models;
pub mod pagination;
pub mod query;
pub mod routes;
pub mod schema;
