pub mod audio;
pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod gpio;
pub mod protocol;
pub mod recorder;
pub mod router;
pub mod state_machine;
pub mod vad;
