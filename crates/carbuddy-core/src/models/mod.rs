//! Data models shared across the CarBuddy crates

pub mod code;
pub mod descriptions;
pub mod event;
pub mod link;
pub mod severity;

pub use code::*;
pub use descriptions::describe;
pub use event::*;
pub use link::*;
pub use severity::*;
