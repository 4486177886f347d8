//! HTTP request handlers.

pub mod accounts;
pub mod departments;
pub mod employees;
pub mod health;
pub mod refresh_tokens;
pub mod requests;
pub mod workflows;
