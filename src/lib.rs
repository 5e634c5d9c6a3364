//! Multi-Tenant Video Publishing Pipeline
//!
//! This library provides the core functionality for video-publisher, which
//! distributes tenant video assets to external publishing channels (social
//! video platforms), tracking every distribution attempt as a durable job.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
