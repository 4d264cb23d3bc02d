//! Photo composing: capture, optional caption suggestions, send.
//!
//! Caption suggestion runs on the host. `request_captions` hands out a ticket; the host
//! reports back with `complete_captions`. Only the most recent ticket is honoured, so a
//! result arriving after a retake or after the flow was reset is dropped.

use tracing::{debug, info, warn};

use crate::capability::{CaptionError, CaptureError, Facing, ImageRef, StillCamera};

/// Where the flow stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Idle,
    Captured,
    SuggestingCaptions,
    Ready,
}

/// Identifies one outstanding caption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptionTicket(u64);

/// What the host needs to run a caption suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionRequest {
    pub ticket: CaptionTicket,
    pub image: ImageRef,
}

struct Shot {
    image: ImageRef,
    /// None until a caption has been picked, typed or suggested.
    caption: Option<String>,
    suggestions: Vec<String>,
}

pub struct CaptureFlow {
    shot: Option<Shot>,
    pending: Option<CaptionTicket>,
    next_ticket: u64,
    facing: Facing,
    fallback_captions: Vec<String>,
}

impl CaptureFlow {
    /// `fallback_captions` replaces an empty or failed suggestion result; must be non-empty.
    pub fn new(fallback_captions: Vec<String>) -> Self {
        Self {
            shot: None,
            pending: None,
            next_ticket: 0,
            facing: Facing::default(),
            fallback_captions,
        }
    }

    pub fn stage(&self) -> CaptureStage {
        match (&self.shot, self.pending) {
            (None, _) => CaptureStage::Idle,
            (Some(_), Some(_)) => CaptureStage::SuggestingCaptions,
            (Some(shot), None) if shot.caption.is_some() => CaptureStage::Ready,
            (Some(_), None) => CaptureStage::Captured,
        }
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Switch between front and back camera. Only meaningful before a capture.
    pub fn flip_camera(&mut self) {
        self.facing = self.facing.flipped();
        debug!(facing = ?self.facing, "Camera flipped");
    }

    /// Take a still. Ignored (returns the existing image) if one is already held; retake first.
    pub fn capture(&mut self, camera: &mut impl StillCamera) -> Result<ImageRef, CaptureError> {
        if let Some(shot) = &self.shot {
            debug!("Capture ignored; a photo is already held");
            return Ok(shot.image.clone());
        }
        let image = camera.capture(self.facing)?;
        self.on_captured(image.clone());
        Ok(image)
    }

    /// Record an image the host captured out of band.
    pub fn on_captured(&mut self, image: ImageRef) {
        info!(facing = ?self.facing, "Photo captured");
        self.shot = Some(Shot {
            image,
            caption: None,
            suggestions: Vec::new(),
        });
        self.pending = None;
    }

    pub fn image(&self) -> Option<&ImageRef> {
        self.shot.as_ref().map(|s| &s.image)
    }

    pub fn caption(&self) -> Option<&str> {
        self.shot.as_ref().and_then(|s| s.caption.as_deref())
    }

    pub fn suggestions(&self) -> &[String] {
        self.shot
            .as_ref()
            .map(|s| s.suggestions.as_slice())
            .unwrap_or(&[])
    }

    /// Start a suggestion round for the held image. Clears previous suggestions.
    /// Returns None when there is no image or a request is already pending.
    pub fn request_captions(&mut self) -> Option<CaptionRequest> {
        if self.pending.is_some() {
            debug!("Caption request already pending");
            return None;
        }
        let shot = self.shot.as_mut()?;
        shot.suggestions.clear();
        let ticket = CaptionTicket(self.next_ticket);
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.pending = Some(ticket);
        Some(CaptionRequest {
            ticket,
            image: shot.image.clone(),
        })
    }

    /// Deliver a suggestion result. Stale tickets are discarded and return false.
    /// Failures and empty results are replaced by the fallback list; the first suggestion
    /// becomes the current caption.
    pub fn complete_captions(
        &mut self,
        ticket: CaptionTicket,
        result: Result<Vec<String>, CaptionError>,
    ) -> bool {
        if self.pending != Some(ticket) {
            debug!(?ticket, "Discarding stale caption result");
            return false;
        }
        self.pending = None;
        let Some(shot) = self.shot.as_mut() else {
            return false;
        };
        let suggestions = match result {
            Ok(list) if !list.is_empty() => list,
            Ok(_) => {
                warn!("Caption suggester returned nothing; using fallback");
                self.fallback_captions.clone()
            }
            Err(e) => {
                warn!(error = %e, "Caption suggester failed; using fallback");
                self.fallback_captions.clone()
            }
        };
        shot.caption = suggestions.first().cloned();
        shot.suggestions = suggestions;
        true
    }

    /// Use the n-th suggestion as the caption. Out-of-range picks are ignored.
    pub fn select_suggestion(&mut self, index: usize) -> bool {
        let Some(shot) = self.shot.as_mut() else {
            return false;
        };
        match shot.suggestions.get(index) {
            Some(s) => {
                shot.caption = Some(s.clone());
                true
            }
            None => false,
        }
    }

    /// Free-text caption. Last write wins.
    pub fn set_caption(&mut self, text: impl Into<String>) {
        if let Some(shot) = self.shot.as_mut() {
            shot.caption = Some(text.into());
        }
    }

    /// Back to `Idle`, dropping the image, caption and any pending request.
    pub fn retake(&mut self) {
        if self.shot.is_some() {
            debug!("Retake");
        }
        self.shot = None;
        self.pending = None;
    }

    /// Hand over the image and caption, valid only from `Captured` or `Ready`.
    /// The flow resets to `Idle`.
    pub fn take_for_send(&mut self) -> Option<(ImageRef, String)> {
        match self.stage() {
            CaptureStage::Captured | CaptureStage::Ready => {}
            stage => {
                debug!(?stage, "Send not valid in this stage");
                return None;
            }
        }
        let shot = self.shot.take()?;
        Some((shot.image, shot.caption.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCamera {
        shots: u32,
        available: bool,
    }

    impl StillCamera for FakeCamera {
        fn capture(&mut self, facing: Facing) -> Result<ImageRef, CaptureError> {
            if !self.available {
                return Err(CaptureError::Unavailable);
            }
            self.shots += 1;
            Ok(ImageRef::new(format!("img-{}-{:?}", self.shots, facing)))
        }
    }

    fn camera() -> FakeCamera {
        FakeCamera {
            shots: 0,
            available: true,
        }
    }

    fn flow() -> CaptureFlow {
        CaptureFlow::new(vec!["fallback".into()])
    }

    #[test]
    fn capture_then_send_without_caption() {
        let mut f = flow();
        assert_eq!(f.stage(), CaptureStage::Idle);
        assert!(f.take_for_send().is_none());
        let img = f.capture(&mut camera()).unwrap();
        assert_eq!(img.as_str(), "img-1-Environment");
        assert_eq!(f.stage(), CaptureStage::Captured);
        assert_eq!(f.take_for_send(), Some((img, String::new())));
        assert_eq!(f.stage(), CaptureStage::Idle);
    }

    #[test]
    fn flip_changes_camera_used() {
        let mut f = flow();
        f.flip_camera();
        let img = f.capture(&mut camera()).unwrap();
        assert_eq!(img.as_str(), "img-1-User");
    }

    #[test]
    fn unavailable_camera_leaves_flow_idle() {
        let mut f = flow();
        let mut cam = FakeCamera {
            shots: 0,
            available: false,
        };
        assert_eq!(f.capture(&mut cam), Err(CaptureError::Unavailable));
        assert_eq!(f.stage(), CaptureStage::Idle);
    }

    #[test]
    fn suggestions_preselect_first_caption() {
        let mut f = flow();
        f.capture(&mut camera()).unwrap();
        let req = f.request_captions().unwrap();
        assert_eq!(f.stage(), CaptureStage::SuggestingCaptions);
        assert!(f.take_for_send().is_none());
        assert!(f.complete_captions(req.ticket, Ok(vec!["a".into(), "b".into()])));
        assert_eq!(f.stage(), CaptureStage::Ready);
        assert_eq!(f.caption(), Some("a"));
        assert!(f.select_suggestion(1));
        assert!(!f.select_suggestion(7));
        assert_eq!(f.caption(), Some("b"));
        f.set_caption("mine");
        assert_eq!(f.take_for_send().unwrap().1, "mine");
    }

    #[test]
    fn failed_suggestion_reaches_ready_with_fallback() {
        let mut f = flow();
        f.capture(&mut camera()).unwrap();
        let req = f.request_captions().unwrap();
        assert!(f.complete_captions(req.ticket, Err(CaptionError::Failed("boom".into()))));
        assert_eq!(f.stage(), CaptureStage::Ready);
        assert_eq!(f.suggestions(), ["fallback".to_string()]);
        assert_eq!(f.caption(), Some("fallback"));
    }

    #[test]
    fn empty_suggestion_result_uses_fallback() {
        let mut f = flow();
        f.capture(&mut camera()).unwrap();
        let req = f.request_captions().unwrap();
        assert!(f.complete_captions(req.ticket, Ok(vec![])));
        assert!(!f.suggestions().is_empty());
    }

    #[test]
    fn retake_discards_pending_result() {
        let mut f = flow();
        let mut cam = camera();
        f.capture(&mut cam).unwrap();
        let req = f.request_captions().unwrap();
        f.retake();
        assert_eq!(f.stage(), CaptureStage::Idle);
        f.capture(&mut cam).unwrap();
        assert!(!f.complete_captions(req.ticket, Ok(vec!["late".into()])));
        assert_eq!(f.stage(), CaptureStage::Captured);
        assert_eq!(f.caption(), None);
    }

    #[test]
    fn second_request_while_pending_is_refused() {
        let mut f = flow();
        f.capture(&mut camera()).unwrap();
        assert!(f.request_captions().is_some());
        assert!(f.request_captions().is_none());
    }

    #[test]
    fn typed_caption_while_pending_is_overwritten_by_later_result() {
        let mut f = flow();
        f.capture(&mut camera()).unwrap();
        let req = f.request_captions().unwrap();
        f.set_caption("typed");
        assert_eq!(f.stage(), CaptureStage::SuggestingCaptions);
        f.complete_captions(req.ticket, Ok(vec!["suggested".into()]));
        assert_eq!(f.caption(), Some("suggested"));
    }
}
