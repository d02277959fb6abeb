pub mod score_service;
pub mod session_service;

// Re-export all from each module namespace
pub use score_service::*;
pub use session_service::*;
