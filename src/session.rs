//! Drives a [`CompositionState`] from a frame source and a segmentation
//! worker, and reports what happened as [`SessionEvent`]s.

use crate::capture::CaptureSource;
use crate::error::{ErrorKind, GroupShotError, GroupShotResult};
use crate::export::Exporter;
use crate::layer::LayerExtractor;
use crate::segmentation::{panic_message, Completion, SegmentationModel, SegmentationWorker};
use crate::state::{AddTicket, CompositionState, Phase};
use anyhow::Context;
use image::RgbImage;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Signals for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PhaseChanged(Phase),
    BusyChanged(bool),
    PersonAdded { count: usize },
    Failed(ErrorKind),
}

pub struct Session {
    state: Arc<Mutex<CompositionState>>,
    source: Box<dyn CaptureSource>,
    worker: SegmentationWorker,
    events: Sender<SessionEvent>,
}

// A panic while holding the lock cannot leave the state half-written:
// every mutation is a single field assignment or push.
fn lock(state: &Mutex<CompositionState>) -> MutexGuard<'_, CompositionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit(events: &Sender<SessionEvent>, event: SessionEvent) {
    // Nobody listening is fine
    let _ = events.send(event);
}

impl Session {
    pub fn new(
        source: Box<dyn CaptureSource>,
        model: Box<dyn SegmentationModel + Send>,
        extractor: LayerExtractor,
    ) -> GroupShotResult<(Self, Receiver<SessionEvent>)> {
        let (tx, rx) = mpsc::channel();
        let state = Arc::new(Mutex::new(CompositionState::new()));

        let on_done = publish_results(Arc::clone(&state), extractor, tx.clone());
        let worker = SegmentationWorker::spawn(model, on_done)?;

        let session = Self {
            state,
            source,
            worker,
            events: tx,
        };
        Ok((session, rx))
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase()
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.state).is_busy()
    }

    pub fn layer_count(&self) -> usize {
        lock(&self.state).layer_count()
    }

    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        lock(&self.state).canvas_size()
    }

    /// Swap the frame source, e.g. front/back camera. The canvas keeps
    /// the size fixed at lock time; frames of another size will be
    /// rejected until the next reset.
    pub fn replace_source(&mut self, source: Box<dyn CaptureSource>) -> Box<dyn CaptureSource> {
        let (w, h) = source.resolution();
        tracing::info!("Frame source switched ({}x{})", w, h);
        std::mem::replace(&mut self.source, source)
    }

    /// Capture the current frame and lock it as the background.
    pub fn lock_background(&mut self) -> GroupShotResult<()> {
        let result = self.try_lock_background(false);
        self.report(result)
    }

    /// Like [`Session::lock_background`] but throws away any people and
    /// any pending request first.
    pub fn relock_background(&mut self) -> GroupShotResult<()> {
        let result = self.try_lock_background(true);
        self.report(result)
    }

    fn try_lock_background(&mut self, force: bool) -> GroupShotResult<()> {
        let phase = self.phase();
        if !force && phase != Phase::NoBackground {
            return Err(GroupShotError::InvalidTransition {
                op: "lock background",
                phase,
            });
        }

        let frame = self
            .source
            .capture_frame()
            .context("Failed to capture background")?;

        let was_busy = {
            let mut state = lock(&self.state);
            let was_busy = state.is_busy();
            if force {
                state.lock_background_forced(frame)?;
            } else {
                state.lock_background(frame)?;
            }
            was_busy
        };

        if was_busy {
            emit(&self.events, SessionEvent::BusyChanged(false));
        }
        emit(&self.events, SessionEvent::PhaseChanged(Phase::ReadyForPeople));
        Ok(())
    }

    /// Capture a frame and hand it to the segmentation worker.
    ///
    /// Returns as soon as the job is queued; the layer shows up later as a
    /// [`SessionEvent::PersonAdded`] (or a [`SessionEvent::Failed`]).
    pub fn request_add_person(&mut self) -> GroupShotResult<AddTicket> {
        let result = self.try_request_add_person();
        self.report(result)
    }

    fn try_request_add_person(&mut self) -> GroupShotResult<AddTicket> {
        let ticket = lock(&self.state).begin_add_person()?;
        emit(&self.events, SessionEvent::BusyChanged(true));

        let queued = self
            .source
            .capture_frame()
            .context("Failed to capture person frame")
            .and_then(|frame| self.worker.submit(ticket, frame));

        if let Err(err) = queued {
            if lock(&self.state).abandon_add_person(ticket) {
                emit(&self.events, SessionEvent::BusyChanged(false));
            }
            return Err(err.into());
        }

        tracing::debug!("Add-person request {} queued", ticket.token());
        Ok(ticket)
    }

    /// Back to `NoBackground`. Never fails; a request still in flight will
    /// be discarded when it completes.
    pub fn reset(&mut self) {
        let was_busy = {
            let mut state = lock(&self.state);
            let was_busy = state.is_busy();
            state.reset();
            was_busy
        };

        tracing::info!("Session reset");
        if was_busy {
            emit(&self.events, SessionEvent::BusyChanged(false));
        }
        emit(&self.events, SessionEvent::PhaseChanged(Phase::NoBackground));
    }

    /// Current composite, `None` before a background is locked.
    ///
    /// Only clones shared handles under the lock; compositing happens
    /// outside it, so this never waits on segmentation.
    pub fn render(&self) -> GroupShotResult<Option<RgbImage>> {
        let snapshot = lock(&self.state).snapshot();
        snapshot.map(|s| s.compose()).transpose()
    }

    pub fn export(&self, exporter: &dyn Exporter) -> GroupShotResult<Vec<u8>> {
        let result = self.try_export(exporter);
        self.report(result)
    }

    fn try_export(&self, exporter: &dyn Exporter) -> GroupShotResult<Vec<u8>> {
        let image = self.render()?.ok_or(GroupShotError::InvalidTransition {
            op: "export",
            phase: Phase::NoBackground,
        })?;
        Ok(exporter.export(&image)?)
    }

    /// Stop the worker, waiting for queued segmentation to finish.
    pub fn shutdown(self) -> GroupShotResult<()> {
        self.worker.shutdown()?;
        Ok(())
    }

    fn report<T>(&self, result: GroupShotResult<T>) -> GroupShotResult<T> {
        if let Err(err) = &result {
            tracing::warn!("{}", err);
            if err.kind().is_user_visible() {
                emit(&self.events, SessionEvent::Failed(err.kind()));
            }
        }
        result
    }
}

/// Worker-side completion: cut out the layer, then publish it in one step.
fn publish_results(
    state: Arc<Mutex<CompositionState>>,
    extractor: LayerExtractor,
    events: Sender<SessionEvent>,
) -> Completion {
    Box::new(move |ticket, frame, result| {
        if !lock(&state).is_pending(ticket) {
            tracing::debug!("Dropping result for stale request {}", ticket.token());
            return;
        }

        let outcome = result
            .map_err(|err| GroupShotError::segmentation(format!("{err:#}")))
            .and_then(|mask| {
                panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(&frame, &mask)))
                    .unwrap_or_else(|payload| {
                        Err(GroupShotError::segmentation(format!(
                            "layer extraction panicked: {}",
                            panic_message(&payload)
                        )))
                    })
            });

        let published = lock(&state).complete_add_person(ticket, outcome);
        match published {
            Ok(count) => {
                emit(&events, SessionEvent::BusyChanged(false));
                emit(&events, SessionEvent::PersonAdded { count });
                if count == 1 {
                    emit(&events, SessionEvent::PhaseChanged(Phase::HasPeople));
                }
            }
            Err(GroupShotError::StaleResult { token, .. }) => {
                tracing::debug!("Request {} went stale during extraction", token);
            }
            Err(err) => {
                tracing::warn!("Add-person request {} failed: {}", ticket.token(), err);
                emit(&events, SessionEvent::BusyChanged(false));
                emit(&events, SessionEvent::Failed(err.kind()));
            }
        }
    })
}
