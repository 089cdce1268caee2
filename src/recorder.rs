//! Record-while-transmitting.
//!
//! The capture thread owns a [`Recorder`] and only ever moves frames in and out
//! of memory. Writing the WAV file happens on the control side through
//! [`RecordingSink`], so a slow disk never stalls audio.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::frame::{AudioFrame, sample_to_i16};
use crate::channel::ChannelId;
use crate::error::RecordingError;

struct ActiveRecording {
    started_at: Duration,
    frames: Vec<AudioFrame>,
    truncated: u64,
}

/// A closed session waiting to be written out.
#[derive(Debug)]
pub struct FinishedRecording {
    pub channel: ChannelId,
    /// Channel identity used in the file name
    pub name: String,
    pub started_wall: DateTime<Local>,
    pub frames: Vec<AudioFrame>,
    /// Frames that arrived after the buffer hit its cap
    pub truncated: u64,
}

impl FinishedRecording {
    pub fn file_name(&self) -> String {
        format!(
            "record_{}_{}.wav",
            self.name,
            self.started_wall.format("%Y%m%d_%H%M%S_%3f")
        )
    }

    pub fn sample_count(&self) -> usize {
        self.frames.iter().map(AudioFrame::len).sum()
    }
}

pub struct Recorder {
    channel: ChannelId,
    name: String,
    /// Wall-clock time corresponding to `Duration::ZERO` on the capture clock
    epoch: DateTime<Local>,
    max_frames: usize,
    session: Option<ActiveRecording>,
}

impl Recorder {
    pub fn new(channel: ChannelId, name: &str, max_frames: usize, epoch: DateTime<Local>) -> Self {
        Self {
            channel,
            name: name.to_string(),
            epoch,
            max_frames,
            session: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Frames buffered in the current session.
    pub fn len(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.frames.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Begin a session. Any session still open is discarded first.
    pub fn start(&mut self, at: Duration) {
        if let Some(stale) = self.session.take() {
            log::warn!(
                "[{}] Recording restarted with {} frames unsaved",
                self.name,
                stale.frames.len()
            );
        }
        self.session = Some(ActiveRecording {
            started_at: at,
            frames: Vec::with_capacity(self.max_frames),
            truncated: 0,
        });
    }

    /// Buffer one frame. Returns `false` if not recording or the cap is reached.
    pub fn append(&mut self, frame: AudioFrame) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.frames.len() >= self.max_frames {
            session.truncated += 1;
            return false;
        }
        session.frames.push(frame);
        true
    }

    /// Close the session and hand its frames over. `None` if nothing was open.
    pub fn stop(&mut self) -> Option<FinishedRecording> {
        let session = self.session.take()?;
        let offset =
            chrono::Duration::from_std(session.started_at).unwrap_or(chrono::Duration::zero());
        Some(FinishedRecording {
            channel: self.channel,
            name: self.name.clone(),
            started_wall: self.epoch + offset,
            frames: session.frames,
            truncated: session.truncated,
        })
    }

    /// Drop the open session without writing it. Returns the frames lost.
    pub fn discard(&mut self) -> usize {
        self.session.take().map_or(0, |s| s.frames.len())
    }

    pub fn stop_and_persist(
        &mut self,
        sink: &RecordingSink,
    ) -> Result<Option<PathBuf>, RecordingError> {
        match self.stop() {
            Some(finished) => sink.persist(&finished),
            None => Ok(None),
        }
    }
}

/// Where and how finished recordings are written.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    directory: PathBuf,
    sample_rate: u32,
}

impl RecordingSink {
    pub fn new(directory: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            directory: directory.into(),
            sample_rate,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn ensure_directory(&self) -> Result<(), RecordingError> {
        fs::create_dir_all(&self.directory)?;
        Ok(())
    }

    /// Write a 16-bit mono WAV. Returns `Ok(None)` for an empty recording.
    ///
    /// The file is written under a `.part` name and renamed once complete, so a
    /// failure never leaves a truncated artifact behind.
    pub fn persist(
        &self,
        recording: &FinishedRecording,
    ) -> Result<Option<PathBuf>, RecordingError> {
        if recording.frames.is_empty() {
            return Ok(None);
        }

        let final_path = self.directory.join(recording.file_name());
        let part_path = final_path.with_extension("wav.part");

        let written = self
            .write_wav(&part_path, &recording.frames)
            .and_then(|()| fs::rename(&part_path, &final_path).map_err(RecordingError::from));
        match written {
            Ok(()) => Ok(Some(final_path)),
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                Err(e)
            }
        }
    }

    fn write_wav(&self, path: &Path, frames: &[AudioFrame]) -> Result<(), RecordingError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for frame in frames {
            for &sample in &frame.samples {
                writer.write_sample(sample_to_i16(sample))?;
            }
        }
        writer.finalize()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
    }

    fn frame(level: f32, at_ms: u64) -> AudioFrame {
        AudioFrame::new(vec![level; 64], Duration::from_millis(at_ms))
    }

    #[test]
    fn append_outside_session_is_ignored() {
        let mut rec = Recorder::new(ChannelId::A, "HT_A", 10, epoch());
        assert!(!rec.append(frame(0.1, 0)));
        assert!(rec.stop().is_none());
    }

    #[test]
    fn file_name_uses_session_start() {
        let mut rec = Recorder::new(ChannelId::B, "HT_B", 10, epoch());
        rec.start(Duration::from_millis(1_250));
        rec.append(frame(0.1, 1_250));
        let finished = rec.stop().unwrap();
        assert_eq!(finished.file_name(), "record_HT_B_20261018_093001_250.wav");
        assert_eq!(finished.channel, ChannelId::B);
    }

    #[test]
    fn cap_counts_truncated_frames() {
        let mut rec = Recorder::new(ChannelId::A, "HT_A", 2, epoch());
        rec.start(Duration::ZERO);
        assert!(rec.append(frame(0.1, 0)));
        assert!(rec.append(frame(0.1, 23)));
        assert!(!rec.append(frame(0.1, 46)));
        let finished = rec.stop().unwrap();
        assert_eq!(finished.frames.len(), 2);
        assert_eq!(finished.truncated, 1);
    }

    #[test]
    fn discard_clears_buffer() {
        let mut rec = Recorder::new(ChannelId::A, "HT_A", 10, epoch());
        rec.start(Duration::ZERO);
        rec.append(frame(0.1, 0));
        assert_eq!(rec.discard(), 1);
        assert!(!rec.is_recording());
        assert!(rec.is_empty());
    }

    #[test]
    fn persist_writes_every_appended_sample() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new(dir.path(), 8000);
        let mut rec = Recorder::new(ChannelId::A, "HT_A", 100, epoch());
        rec.start(Duration::ZERO);
        for i in 0..7 {
            rec.append(frame(0.25, i * 8));
        }

        let path = rec.stop_and_persist(&sink).unwrap().unwrap();
        assert!(path.ends_with("record_HT_A_20261018_093000_000.wav"));
        assert!(!path.with_extension("wav.part").exists());

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration(), 7 * 64);
        assert!(!rec.is_recording());
    }

    #[test]
    fn empty_recording_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new(dir.path(), 8000);
        let mut rec = Recorder::new(ChannelId::A, "HT_A", 100, epoch());
        rec.start(Duration::ZERO);

        assert!(rec.stop_and_persist(&sink).unwrap().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn persist_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new(dir.path().join("missing"), 8000);
        let mut rec = Recorder::new(ChannelId::A, "HT_A", 100, epoch());
        rec.start(Duration::ZERO);
        rec.append(frame(0.1, 0));

        assert!(rec.stop_and_persist(&sink).is_err());
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn failed_rename_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new(dir.path(), 8000);
        // A non-empty directory squats on the artifact name.
        let blocker = dir.path().join("record_HT_A_20261018_093000_000.wav");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        let mut rec = Recorder::new(ChannelId::A, "HT_A", 100, epoch());
        rec.start(Duration::ZERO);
        rec.append(frame(0.1, 0));

        assert!(rec.stop_and_persist(&sink).is_err());
        assert!(!blocker.with_extension("wav.part").exists());
        assert!(blocker.join("keep").exists());
    }
}
