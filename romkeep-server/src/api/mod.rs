//! HTTP boundary. Handlers stay thin: parse, delegate, project.

pub mod health;
pub mod library;
pub mod sync;
