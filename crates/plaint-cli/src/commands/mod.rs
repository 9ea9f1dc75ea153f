//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - init and shared utilities (open_db, load_profile, build_analyzer)
//! - `analyze` - Analyze and simulate commands
//! - `complaints` - Complaint list/show/delete/reply and statistics
//! - `import` - JSON/CSV complaint import
//! - `prompts` - Prompt library commands
//! - `serve` - Web server command

pub mod analyze;
pub mod complaints;
pub mod core;
pub mod import;
pub mod prompts;
pub mod serve;

// Re-export command functions for main.rs
pub use analyze::*;
pub use complaints::*;
pub use core::*;
pub use import::*;
pub use prompts::*;
pub use serve::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
