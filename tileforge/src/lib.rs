//! Map-tile generation: pyramid seeding, WMS rendering, metatile
//! splitting, empty-tile dropping and cache/queue wiring.

pub mod config;
pub mod generate;
pub mod geometry;
pub mod hash_drop;
pub mod render;
pub mod split;
pub mod tools;

pub use config::Config;
pub use generate::{GenerateOptions, Generator, Role};
