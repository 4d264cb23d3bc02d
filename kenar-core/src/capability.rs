//! Host-provided capabilities the core depends on but does not implement.
//! Camera, discovery, permissions and caption generation all live behind these traits.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::peer::Advertisement;

/// Reference to a captured still image (data URL, file path, blob key; opaque to the core).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(r: impl Into<String>) -> Self {
        ImageRef(r.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which camera the still is taken with. User-facing stills are mirrored by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Facing {
    User,
    #[default]
    Environment,
}

impl Facing {
    pub fn flipped(self) -> Self {
        match self {
            Facing::User => Facing::Environment,
            Facing::Environment => Facing::User,
        }
    }
}

/// Location plus discovery authorization. Both must succeed before browsing.
pub trait Permissions {
    fn request(&mut self) -> Result<(), PermissionDenied>;
}

/// Synchronous from the core's viewpoint.
pub trait StillCamera {
    fn capture(&mut self, facing: Facing) -> Result<ImageRef, CaptureError>;
}

/// Single-shot peer probe (e.g. a device chooser). At most one advertisement per call.
pub trait Discovery {
    fn probe(&mut self) -> ProbeOutcome;
}

/// Suggests captions for an image. Must not fail: on internal error it returns a fallback list.
pub trait CaptionSuggester {
    fn suggest(&self, image: &ImageRef) -> impl Future<Output = Vec<String>> + Send;
}

/// Hands an invite to the host's share sheet (or a clipboard fallback).
pub trait Sharing {
    fn share(&mut self, invite: &Invite) -> ShareOutcome;
}

/// What gets shared to bring someone else into the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invite {
    pub title: String,
    pub text: String,
    /// Where the app can be found, if the host knows.
    pub url: Option<String>,
}

impl Invite {
    pub fn new(url: Option<String>) -> Self {
        Self {
            title: "Kenar".to_string(),
            text: "Let's connect on Kenar!".to_string(),
            url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    /// Shared, or at least copied somewhere the user can paste from.
    Accepted,
    /// Neither sharing nor a fallback is available.
    Unavailable,
}

/// Result of one discovery probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found(Advertisement),
    /// User dismissed the chooser without picking a device.
    Cancelled,
    Failed(String),
    /// Host has no discovery capability at all.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionDenied {
    #[error("location is not supported on this device")]
    LocationUnsupported,
    #[error("nearby-device discovery is not supported on this device")]
    DiscoveryUnsupported,
    #[error("location access was denied; it is needed to find nearby devices")]
    LocationDenied,
    #[error("device access was cancelled; approve it to continue")]
    DiscoveryCancelled,
    #[error("permissions are required to use the app: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("nearby-device discovery is not available on this device")]
    NoCapability,
    #[error("no device was chosen; scan again to retry")]
    UserCancelled,
    #[error("scan failed: {0}")]
    ScanFailed(String),
}

impl ScanError {
    /// Capability-unavailable is terminal for scanning; the rest are retryable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanError::NoCapability)
    }
}

impl ProbeOutcome {
    pub fn into_result(self) -> Result<Advertisement, ScanError> {
        match self {
            ProbeOutcome::Found(ad) => Ok(ad),
            ProbeOutcome::Cancelled => Err(ScanError::UserCancelled),
            ProbeOutcome::Failed(reason) => Err(ScanError::ScanFailed(reason)),
            ProbeOutcome::Unsupported => Err(ScanError::NoCapability),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("camera is not available")]
    Unavailable,
    #[error("capture failed: {0}")]
    Failed(String),
}

/// A caption request that never produced a result (task died, host gave up).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptionError {
    #[error("caption suggestion failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_outcome_maps_to_scan_errors() {
        assert_eq!(
            ProbeOutcome::Cancelled.into_result(),
            Err(ScanError::UserCancelled)
        );
        assert!(ProbeOutcome::Unsupported
            .into_result()
            .unwrap_err()
            .is_terminal());
        assert_eq!(
            ProbeOutcome::Failed("radio off".into()).into_result(),
            Err(ScanError::ScanFailed("radio off".into()))
        );
        let ad = Advertisement::new("a1", None);
        assert_eq!(ProbeOutcome::Found(ad.clone()).into_result(), Ok(ad));
    }

    #[test]
    fn facing_flips() {
        assert_eq!(Facing::default(), Facing::Environment);
        assert_eq!(Facing::Environment.flipped(), Facing::User);
        assert_eq!(Facing::User.flipped(), Facing::Environment);
    }
}
