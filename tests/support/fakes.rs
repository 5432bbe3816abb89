use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use snipwave::encode::capture::{CaptureEvent, CaptureRequest, CaptureSignature};
use snipwave::encode::{
    CancelToken, CaptureBackend, CaptureSession, DispatchOptions, EncodeDispatcher, EncodeError,
    EngineInitError, EngineInitKind, HostProfile, LameBackend, OutputFormat, RecordingError,
    TranscodeEngine, TranscodeJob, TrimWindow,
};

/// What a fake engine was asked to do.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedJob {
    pub input_name: String,
    pub trim: Option<TrimWindow>,
    pub format: OutputFormat,
    pub bitrate_kbps: Option<u32>,
}

/// Engine returning canned bytes and recording each job.
#[derive(Clone, Default)]
pub struct FakeEngine {
    pub output: Vec<u8>,
    pub init_failure: Option<EngineInitKind>,
    pub jobs: Arc<Mutex<Vec<RecordedJob>>>,
}

impl FakeEngine {
    pub fn returning(output: Vec<u8>) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    pub fn failing_init(kind: EngineInitKind) -> Self {
        Self {
            init_failure: Some(kind),
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<RecordedJob> {
        self.jobs.lock().expect("jobs lock").clone()
    }
}

impl TranscodeEngine for FakeEngine {
    fn initialize(&mut self) -> Result<(), EngineInitError> {
        match self.init_failure {
            Some(kind) => Err(EngineInitError::new(kind, "engine bundle missing")),
            None => Ok(()),
        }
    }

    fn transcode(
        &mut self,
        job: &TranscodeJob<'_>,
        on_progress: &mut dyn FnMut(f32),
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, EncodeError> {
        self.jobs.lock().expect("jobs lock").push(RecordedJob {
            input_name: job.input_name.to_string(),
            trim: job.trim,
            format: job.format,
            bitrate_kbps: job.bitrate_kbps,
        });
        for percent in [25.0, 50.0, 100.0] {
            if cancel.is_cancelled() {
                return Err(EncodeError::Cancelled);
            }
            on_progress(percent);
        }
        Ok(self.output.clone())
    }
}

/// Capture backend that plays back a fixed event script.
#[derive(Clone, Default)]
pub struct ScriptedCapture {
    pub signatures: Vec<CaptureSignature>,
    pub events: Vec<CaptureEvent>,
    pub starts: Arc<Mutex<usize>>,
}

impl ScriptedCapture {
    /// No recordable formats at all.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// AAC capture producing `chunks`.
    pub fn aac(chunks: Vec<Vec<u8>>) -> Self {
        let mut events: Vec<CaptureEvent> = chunks.into_iter().map(CaptureEvent::Chunk).collect();
        events.push(CaptureEvent::Finished);
        Self {
            signatures: vec![CaptureSignature::AAC_ADTS],
            events,
            starts: Arc::default(),
        }
    }

    pub fn start_count(&self) -> usize {
        *self.starts.lock().expect("starts lock")
    }
}

impl CaptureBackend for ScriptedCapture {
    fn signatures(&self) -> Vec<CaptureSignature> {
        self.signatures.clone()
    }

    fn start(
        &self,
        _request: &CaptureRequest<'_>,
    ) -> Result<Box<dyn CaptureSession>, RecordingError> {
        if self.signatures.is_empty() {
            return Err(RecordingError::NoSignature);
        }
        *self.starts.lock().expect("starts lock") += 1;
        Ok(Box::new(ScriptedSession {
            events: self.events.clone().into(),
        }))
    }
}

struct ScriptedSession {
    events: VecDeque<CaptureEvent>,
}

impl CaptureSession for ScriptedSession {
    fn next_event(&mut self, _wait: Duration) -> Option<CaptureEvent> {
        self.events.pop_front()
    }

    fn stop(&mut self) {
        self.events.clear();
    }
}

/// Dispatcher with real LAME plus the given fakes.
pub fn dispatcher(
    options: DispatchOptions,
    host: HostProfile,
    engine: FakeEngine,
    capture: ScriptedCapture,
) -> EncodeDispatcher {
    EncodeDispatcher::new(
        options,
        Box::new(host),
        Box::new(engine),
        Box::new(LameBackend),
        Box::new(capture),
    )
}

pub fn local_dispatcher(capture: ScriptedCapture) -> EncodeDispatcher {
    dispatcher(
        DispatchOptions::default(),
        HostProfile::default(),
        FakeEngine::default(),
        capture,
    )
}
