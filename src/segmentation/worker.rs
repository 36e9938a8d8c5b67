use super::types::{Mask, SegmentationModel};
use crate::state::AddTicket;
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

/// Called on the worker thread once a job finishes, successful or not.
/// The frame is handed back so the caller can cut the layer out of it.
pub type Completion = Box<dyn FnMut(AddTicket, RgbImage, Result<Mask>) + Send>;

struct Job {
    ticket: AddTicket,
    frame: RgbImage,
}

/// Runs a segmentation model on its own thread.
///
/// Jobs are handled strictly one after another, so the model never sees
/// two `segment` calls at once. There is no timeout and no cancellation:
/// a job that stalls only delays the jobs queued behind it.
pub struct SegmentationWorker {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl SegmentationWorker {
    pub fn spawn(mut model: Box<dyn SegmentationModel + Send>, mut on_done: Completion) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();

        let handle = thread::Builder::new()
            .name("segmentation".into())
            .spawn(move || {
                let (w, h) = model.input_size();
                tracing::debug!("Segmentation worker started (model input {}x{})", w, h);

                for job in rx {
                    let _span = tracing::debug_span!("segment_job", token = job.ticket.token()).entered();

                    // A panicking model fails this job only; the thread keeps serving.
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        // Every capture is an independent still
                        model.reset_state();
                        model.segment(&job.frame)
                    }))
                    .unwrap_or_else(|payload| Err(anyhow!("model panicked: {}", panic_message(&payload))));
                    if let Err(err) = &result {
                        tracing::warn!("Segmentation of request {} failed: {:#}", job.ticket.token(), err);
                    }

                    let token = job.ticket.token();
                    let delivered =
                        panic::catch_unwind(AssertUnwindSafe(|| on_done(job.ticket, job.frame, result)));
                    if let Err(payload) = delivered {
                        tracing::error!(
                            "Completion for request {} panicked: {}",
                            token,
                            panic_message(&payload)
                        );
                    }
                }

                tracing::debug!("Segmentation worker stopped");
            })
            .context("Failed to spawn segmentation worker")?;

        Ok(Self {
            jobs: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn submit(&self, ticket: AddTicket, frame: RgbImage) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("segmentation worker is shut down"))?;
        jobs.send(Job { ticket, frame })
            .map_err(|_| anyhow!("segmentation worker has stopped"))
    }

    /// Stop accepting jobs and wait for the queued ones to finish.
    pub fn shutdown(mut self) -> Result<()> {
        self.jobs = None;
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("segmentation worker panicked"))?;
        }
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Drop for SegmentationWorker {
    fn drop(&mut self) {
        // Closing the channel lets the thread exit after its current job.
        // Not joined here: a stalled model must not block teardown.
        self.jobs = None;
    }
}
