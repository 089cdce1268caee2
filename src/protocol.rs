//! Messages from the audio threads to the controller.

use crate::channel::ChannelId;
use crate::recorder::FinishedRecording;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Capture,
    Render,
}

#[derive(Debug)]
pub enum ControlEvent {
    /// Drive the PTT line of `target` (the radio being transmitted on)
    Key { target: ChannelId, high: bool },
    /// A session ended normally; its audio should be written out
    SessionClosed(FinishedRecording),
    /// An audio thread gave up; the relay must shut down
    StreamFailed {
        channel: ChannelId,
        direction: StreamDirection,
        error: String,
    },
}
