pub mod access_rules;
pub mod auth;
pub mod documents;
pub mod health;
pub mod roles;
