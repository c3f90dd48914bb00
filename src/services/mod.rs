pub mod access;
pub mod auth_service;
pub mod embed;
pub mod ingest;
pub mod lockout;
pub mod rate_limit;
pub mod reply;
pub mod signature;
pub mod tenant_resolution;
pub mod trial;
