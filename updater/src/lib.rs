pub mod bootstrap;
pub mod config;
pub mod repositories;
pub mod services;
pub mod supabase;
pub mod telemetry;
