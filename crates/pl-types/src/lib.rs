pub mod market;
pub mod portfolio;
pub mod config;
pub mod errors;
pub mod ratio;

pub use market::*;
pub use portfolio::*;
pub use config::*;
pub use errors::*;
pub use ratio::*;
