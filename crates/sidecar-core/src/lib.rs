pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod template;

pub use config::SidecarConfig;
pub use error::{Entity, GenerationError, Location, Result, SidecarError};
