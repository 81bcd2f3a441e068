pub mod access_rule;
pub mod document;
pub mod identity;
pub mod role;
