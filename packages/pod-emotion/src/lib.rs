//! # Sylph Emotion Pod
//!
//! The emotion-analysis boundary: a serialized client for the external
//! classifier and the trajectory analyzer that turns the bot's recent
//! emotion history into a prompt-ready trend.

mod analyzer;
mod trajectory;

pub use analyzer::HttpEmotionAnalyzer;
pub use trajectory::TrajectoryAnalyzer;
