//! CLI command implementations.

pub mod common;
pub mod formats;
pub mod play;
pub mod profiles;
pub mod record;
pub mod simulate;
