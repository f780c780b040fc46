pub mod full_audio;
pub mod service;

pub use full_audio::*;
pub use service::*;
