pub mod auth;
pub mod brute_force;
pub mod configuration;
pub mod credentials;
pub mod email_client;
pub mod error;
pub mod events;
pub mod keys;
pub mod middleware;
pub mod password_reset;
pub mod revocation;
pub mod routes;
pub mod service;
pub mod startup;
pub mod telemetry;
pub mod ttl_cache;
pub mod validators;
pub mod verification;
