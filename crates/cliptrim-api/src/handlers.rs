//! Request handlers.

pub mod clips;
pub mod downloads;
pub mod health;

pub use clips::*;
pub use downloads::*;
pub use health::*;
