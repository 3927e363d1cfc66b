pub mod api;
pub mod config;
pub mod control;
pub mod dashboard;
pub mod error;
pub mod models;
pub mod refresh_cache;
pub mod sensors;
pub mod supabase;
