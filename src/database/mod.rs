pub mod channel;
pub mod playlist_file;

pub use channel::*;
pub use playlist_file::*;
