use std::sync::Mutex;

use crate::model::RequestLog;

/// Append-only recording of intercepted exchanges, gated by a recording
/// flag. `spec.md` §4.6 calls for idempotent start/stop and an atomic
/// drain-and-reset on stop; a single mutex is sufficient since recording
/// is not a hot path relative to request handling.
#[derive(Default)]
pub struct RecordingBuffer {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    recording: bool,
    entries: Vec<RequestLog>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: calling start while already recording is a no-op.
    pub fn start(&self) {
        let mut state = self.state.lock().expect("recording buffer poisoned");
        state.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().expect("recording buffer poisoned").recording
    }

    pub fn record(&self, entry: RequestLog) {
        let mut state = self.state.lock().expect("recording buffer poisoned");
        if state.recording {
            state.entries.push(entry);
        }
    }

    /// Idempotent: stopping a buffer that isn't recording returns an
    /// empty vector rather than erroring. The drain and the flag reset
    /// happen under the same lock acquisition, so a concurrent `record`
    /// either lands entirely before or entirely after the stop.
    pub fn stop(&self) -> Vec<RequestLog> {
        let mut state = self.state.lock().expect("recording buffer poisoned");
        state.recording = false;
        std::mem::take(&mut state.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogKind;

    fn entry(msg: &str) -> RequestLog {
        RequestLog::new(LogKind::RequestIntercepted, vec![msg.to_string()])
    }

    #[test]
    fn records_only_while_active() {
        let buf = RecordingBuffer::new();
        buf.record(entry("dropped"));
        buf.start();
        buf.record(entry("kept"));
        let drained = buf.stop();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].message_lines[0], "kept");
    }

    #[test]
    fn stop_is_idempotent_and_resets() {
        let buf = RecordingBuffer::new();
        buf.start();
        buf.record(entry("a"));
        assert_eq!(buf.stop().len(), 1);
        assert!(buf.stop().is_empty());
        assert!(!buf.is_recording());
    }

    #[test]
    fn start_is_idempotent() {
        let buf = RecordingBuffer::new();
        buf.start();
        buf.start();
        buf.record(entry("only-one-session"));
        assert_eq!(buf.stop().len(), 1);
    }
}
