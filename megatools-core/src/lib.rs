pub mod error;
pub mod models;

pub use error::{MegaError, Result};
pub use models::*;
