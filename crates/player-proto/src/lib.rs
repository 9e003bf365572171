pub mod catalog;
pub mod config;
pub mod error;
pub mod platform;
pub mod protocol;

pub use catalog::{format_duration, parse_duration, Catalog, Track};
pub use error::{ErrorKind, PlayerError};
