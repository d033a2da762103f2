//! External media collaborators: ffmpeg, music recognition, player control
//! and object storage

mod ffmpeg;
mod player;
mod recognizer;
mod storage;

pub use ffmpeg::{is_wmv, Ffmpeg};
pub use player::{MediaPlayer, PlayerCommand, VlcPlayer};
pub use recognizer::{invalid_response, AudioRecognizer, AuddRecognizer};
pub use storage::{validate_key, ObjectStorage, S3Storage};
