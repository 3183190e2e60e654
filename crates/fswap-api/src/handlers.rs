//! Request handlers.

pub mod files;
pub mod health;
pub mod jobs;

pub use files::*;
pub use health::*;
pub use jobs::*;
