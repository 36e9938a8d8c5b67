//! The capture state machine.
//!
//! `NoBackground -> ReadyForPeople -> HasPeople`, back to `NoBackground`
//! only through [`CompositionState::reset`]. Layers are append-only and
//! their order is the stacking order.

use crate::compositor::Snapshot;
use crate::error::{GroupShotError, GroupShotResult};
use crate::layer::Layer;
use image::RgbImage;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing locked yet.
    NoBackground,
    /// Background locked, no people.
    ReadyForPeople,
    /// Background locked, at least one person layer.
    HasPeople,
}

impl Phase {
    pub fn can_export(self) -> bool {
        self != Phase::NoBackground
    }
}

/// Identifies one add-person request.
///
/// Tokens increase monotonically for the whole life of a state and are
/// never reused, so a result that outlives a reset can always be told
/// apart from one belonging to the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddTicket(u64);

impl AddTicket {
    pub fn token(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct CompositionState {
    background: Option<Arc<RgbImage>>,
    layers: Vec<Arc<Layer>>,
    pending: Option<u64>,
    next_token: u64,
}

impl CompositionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match (&self.background, self.layers.is_empty()) {
            (None, _) => Phase::NoBackground,
            (Some(_), true) => Phase::ReadyForPeople,
            (Some(_), false) => Phase::HasPeople,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn background(&self) -> Option<&Arc<RgbImage>> {
        self.background.as_ref()
    }

    /// Canvas size, fixed when the background is locked.
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        self.background.as_ref().map(|bg| bg.dimensions())
    }

    /// Lock `frame` as the background. Only valid with nothing locked.
    pub fn lock_background(&mut self, frame: RgbImage) -> GroupShotResult<()> {
        if self.background.is_some() {
            return Err(self.invalid("lock background"));
        }
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return Err(GroupShotError::DimensionMismatch {
                expected: (w.max(1), h.max(1)),
                actual: (w, h),
            });
        }

        tracing::info!("Background locked at {}x{}", w, h);
        self.background = Some(Arc::new(frame));
        Ok(())
    }

    /// Drop whatever is there, including a pending request, and lock `frame`.
    pub fn lock_background_forced(&mut self, frame: RgbImage) -> GroupShotResult<()> {
        if self.background.is_some() {
            tracing::info!("Relocking background, discarding {} layer(s)", self.layers.len());
        }
        self.reset();
        self.lock_background(frame)
    }

    /// First half of an add-person request: claim the busy slot.
    pub fn begin_add_person(&mut self) -> GroupShotResult<AddTicket> {
        if self.background.is_none() {
            return Err(self.invalid("add person"));
        }
        if self.pending.is_some() {
            return Err(GroupShotError::Busy);
        }

        let token = self.next_token;
        self.next_token += 1;
        self.pending = Some(token);
        tracing::debug!("Add-person request {} started", token);
        Ok(AddTicket(token))
    }

    /// Second half of an add-person request.
    ///
    /// A ticket that is not the pending one yields
    /// [`GroupShotError::StaleResult`] and changes nothing. Otherwise the
    /// busy slot is released whatever the outcome, and on success the layer
    /// is appended. Returns the new layer count.
    pub fn complete_add_person(
        &mut self,
        ticket: AddTicket,
        outcome: GroupShotResult<Layer>,
    ) -> GroupShotResult<usize> {
        if self.pending != Some(ticket.0) {
            tracing::debug!("Discarding stale result for request {}", ticket.0);
            return Err(GroupShotError::StaleResult {
                token: ticket.0,
                pending: self.pending,
            });
        }
        self.pending = None;

        let layer = outcome?;
        self.add_layer(layer)?;
        Ok(self.layers.len())
    }

    /// Whether `ticket` is the request currently holding the busy slot.
    pub fn is_pending(&self, ticket: AddTicket) -> bool {
        self.pending == Some(ticket.0)
    }

    /// Give up on a request that never reached the model. Returns whether
    /// the busy slot was released.
    pub fn abandon_add_person(&mut self, ticket: AddTicket) -> bool {
        if self.is_pending(ticket) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Append a finished layer on top of the stack.
    pub fn add_layer(&mut self, layer: Layer) -> GroupShotResult<()> {
        let expected = match self.canvas_size() {
            Some(size) => size,
            None => return Err(self.invalid("add layer")),
        };
        if layer.dimensions() != expected {
            return Err(GroupShotError::DimensionMismatch {
                expected,
                actual: layer.dimensions(),
            });
        }

        self.layers.push(Arc::new(layer));
        tracing::info!("Person layer {} added", self.layers.len());
        Ok(())
    }

    /// Back to `NoBackground`. Always succeeds; also releases the busy slot.
    pub fn reset(&mut self) {
        self.background = None;
        self.layers = Vec::new();
        self.pending = None;
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.background.as_ref().map(|bg| Snapshot {
            background: Arc::clone(bg),
            layers: self.layers.clone(),
        })
    }

    /// Composite of the current state, or `None` when there is nothing to
    /// show yet.
    pub fn render(&self) -> GroupShotResult<Option<RgbImage>> {
        self.snapshot().map(|s| s.compose()).transpose()
    }

    fn invalid(&self, op: &'static str) -> GroupShotError {
        GroupShotError::InvalidTransition {
            op,
            phase: self.phase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::compose;
    use image::{Rgb, Rgba, RgbaImage};

    fn bg(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([255, 0, 0]))
    }

    fn solid(w: u32, h: u32, px: [u8; 4]) -> Layer {
        Layer::new(RgbaImage::from_pixel(w, h, Rgba(px)))
    }

    #[test]
    fn starts_empty() {
        let s = CompositionState::new();
        assert_eq!(s.phase(), Phase::NoBackground);
        assert!(!s.is_busy());
        assert_eq!(s.canvas_size(), None);
        assert!(s.render().unwrap().is_none());
        assert!(!s.phase().can_export());
    }

    #[test]
    fn second_lock_is_rejected_and_keeps_first() {
        let mut s = CompositionState::new();
        s.lock_background(bg(4, 4)).unwrap();
        let err = s
            .lock_background(RgbImage::from_pixel(4, 4, Rgb([0, 0, 255])))
            .unwrap_err();
        assert!(matches!(
            err,
            GroupShotError::InvalidTransition {
                phase: Phase::ReadyForPeople,
                ..
            }
        ));
        assert_eq!(**s.background().unwrap(), bg(4, 4));
    }

    #[test]
    fn empty_frame_cannot_be_background() {
        let mut s = CompositionState::new();
        assert!(s.lock_background(RgbImage::new(0, 3)).is_err());
        assert_eq!(s.phase(), Phase::NoBackground);
    }

    #[test]
    fn add_person_needs_background() {
        let mut s = CompositionState::new();
        assert!(matches!(
            s.begin_add_person(),
            Err(GroupShotError::InvalidTransition { .. })
        ));
        assert!(matches!(
            s.add_layer(solid(1, 1, [0; 4])),
            Err(GroupShotError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn second_request_while_pending_is_busy() {
        let mut s = CompositionState::new();
        s.lock_background(bg(2, 2)).unwrap();
        let t = s.begin_add_person().unwrap();
        assert!(s.is_busy());
        assert!(matches!(s.begin_add_person(), Err(GroupShotError::Busy)));

        assert_eq!(s.complete_add_person(t, Ok(solid(2, 2, [0, 0, 0, 255]))).unwrap(), 1);
        assert!(!s.is_busy());
        assert_eq!(s.phase(), Phase::HasPeople);
        // the ticket is spent
        assert!(matches!(
            s.complete_add_person(t, Ok(solid(2, 2, [0; 4]))),
            Err(GroupShotError::StaleResult { .. })
        ));
        assert_eq!(s.layer_count(), 1);
    }

    #[test]
    fn failed_segmentation_releases_busy() {
        let mut s = CompositionState::new();
        s.lock_background(bg(2, 2)).unwrap();
        let t = s.begin_add_person().unwrap();
        let err = s
            .complete_add_person(t, Err(GroupShotError::segmentation("no mask")))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SegmentationFailed);
        assert!(!s.is_busy());
        assert_eq!(s.phase(), Phase::ReadyForPeople);
    }

    #[test]
    fn mismatched_layer_is_not_appended() {
        let mut s = CompositionState::new();
        s.lock_background(bg(3, 3)).unwrap();
        let t = s.begin_add_person().unwrap();
        let err = s.complete_add_person(t, Ok(solid(3, 4, [0; 4]))).unwrap_err();
        assert!(matches!(
            err,
            GroupShotError::DimensionMismatch {
                expected: (3, 3),
                actual: (3, 4)
            }
        ));
        assert_eq!(s.layer_count(), 0);
        assert!(!s.is_busy());
    }

    #[test]
    fn stale_result_after_reset_is_discarded() {
        let mut s = CompositionState::new();
        s.lock_background(bg(2, 2)).unwrap();
        let old = s.begin_add_person().unwrap();
        s.reset();
        assert!(!s.is_busy());

        s.lock_background(bg(2, 2)).unwrap();
        let fresh = s.begin_add_person().unwrap();
        assert_ne!(old, fresh);

        let err = s
            .complete_add_person(old, Ok(solid(2, 2, [0, 0, 0, 255])))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StaleResult);
        assert_eq!(s.layer_count(), 0);
        assert!(s.is_busy());
    }

    #[test]
    fn reset_from_every_phase() {
        let mut s = CompositionState::new();
        s.reset();
        assert_eq!(s.phase(), Phase::NoBackground);

        s.lock_background(bg(2, 2)).unwrap();
        s.reset();
        assert_eq!(s.phase(), Phase::NoBackground);

        s.lock_background(bg(2, 2)).unwrap();
        s.add_layer(solid(2, 2, [1, 2, 3, 4])).unwrap();
        s.begin_add_person().unwrap();
        s.reset();
        assert_eq!(s.phase(), Phase::NoBackground);
        assert_eq!(s.layer_count(), 0);
        assert!(!s.is_busy());
        assert!(s.background().is_none());
    }

    #[test]
    fn forced_lock_replaces_everything() {
        let mut s = CompositionState::new();
        s.lock_background(bg(2, 2)).unwrap();
        s.add_layer(solid(2, 2, [0; 4])).unwrap();
        s.begin_add_person().unwrap();

        s.lock_background_forced(RgbImage::new(5, 5)).unwrap();
        assert_eq!(s.phase(), Phase::ReadyForPeople);
        assert_eq!(s.canvas_size(), Some((5, 5)));
        assert!(!s.is_busy());
    }

    #[test]
    fn render_matches_independent_compose() {
        let mut s = CompositionState::new();
        s.lock_background(bg(3, 3)).unwrap();
        let a = solid(3, 3, [0, 255, 0, 100]);
        let b = Layer::new(RgbaImage::from_fn(3, 3, |x, _| {
            Rgba([0, 0, 255, if x == 1 { 255 } else { 40 }])
        }));
        s.add_layer(a.clone()).unwrap();
        s.add_layer(b.clone()).unwrap();

        let expected = compose(&bg(3, 3), &[a, b]).unwrap();
        assert_eq!(s.render().unwrap().unwrap(), expected);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let mut s = CompositionState::new();
        s.lock_background(bg(2, 2)).unwrap();
        let snap = s.snapshot().unwrap();
        s.add_layer(solid(2, 2, [0, 0, 0, 255])).unwrap();
        s.reset();
        assert_eq!(snap.layers.len(), 0);
        assert_eq!(snap.compose().unwrap(), bg(2, 2));
    }
}
