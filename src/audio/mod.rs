//! audio - ALSA capture, playback, and the frame path between them.
//!
//! Each radio gets one capture and one render thread. Frames cross between
//! channels through bounded lock-free queues.

mod alsa_device;
mod audio_system;
mod capture;
pub mod frame;
pub mod frame_queue;
pub mod render;

pub use audio_system::RelaySystem;
pub use frame::AudioFrame;
