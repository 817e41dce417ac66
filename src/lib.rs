pub mod backend;
pub mod config;
pub mod course;
pub mod error;
pub mod progress;
pub mod quiz;
pub mod session;
pub mod sidebar;
pub mod unlock;
pub mod utils;
pub mod writer;
