pub mod auth;
pub mod keyed_mutex;
pub mod sanitize;
pub mod search;
pub mod validation;
