//! Launchpad scanning
//!
//! Polls external launchpad services for newly tradable tokens.

pub mod launchpad;
pub mod types;

pub use launchpad::{HttpLaunchpadScanner, LaunchpadScanner};
pub use types::{TokenCandidate, TokenMetadata};
