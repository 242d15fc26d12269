pub mod compression;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod session;

// Re-export commonly used items for easier testing
#[allow(unused_imports)]
pub use compression::*;
pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use session::*;
