pub mod analyzer;
pub mod config;
pub mod dataset;
pub mod scanner;
pub mod transform;

/// Audio file extensions that are picked up as tracks (exact, case-insensitive match).
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "wave", "flac",
    // Decoded through ffmpeg
    "wma",
];

/// Application name for XDG paths
pub const APP_NAME: &str = "mirset";
