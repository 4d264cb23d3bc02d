//! Terminal stand-ins for the device capabilities: permission check, peer chooser,
//! still camera backed by image files, invite sharing.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use kenar_core::{
    Advertisement, CaptureError, Discovery, Facing, ImageRef, Invite, PermissionDenied,
    Permissions, ProbeOutcome, ShareOutcome, Sharing, StillCamera,
};
use tracing::debug;

/// Grants access when the host offers discovery; there is no location service to ask.
pub struct HostPermissions {
    pub discovery_enabled: bool,
}

impl Permissions for HostPermissions {
    fn request(&mut self) -> Result<(), PermissionDenied> {
        if !self.discovery_enabled {
            return Err(PermissionDenied::DiscoveryUnsupported);
        }
        Ok(())
    }
}

/// One chooser interaction: the device the user typed, or none (dismissed).
pub struct Chooser {
    pub enabled: bool,
    pub choice: Option<Advertisement>,
}

impl Discovery for Chooser {
    fn probe(&mut self) -> ProbeOutcome {
        if !self.enabled {
            return ProbeOutcome::Unsupported;
        }
        match self.choice.take() {
            Some(ad) => ProbeOutcome::Found(ad),
            None => ProbeOutcome::Cancelled,
        }
    }
}

/// "Captures" by reading an image file into a data URL.
pub struct FileCamera {
    pub path: PathBuf,
}

impl StillCamera for FileCamera {
    fn capture(&mut self, facing: Facing) -> Result<ImageRef, CaptureError> {
        let path = self.path.as_path();
        let bytes = std::fs::read(path)
            .map_err(|e| CaptureError::Failed(format!("{}: {}", path.display(), e)))?;
        // Files are taken as-is; mirroring front-camera stills is the camera's job.
        debug!(path = %path.display(), ?facing, len = bytes.len(), "Read still");
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(ImageRef::new(format!(
            "data:{};base64,{}",
            mime_for(path),
            data
        )))
    }
}

/// The terminal is the share sheet: the invite is printed for the user to copy.
pub struct TerminalShare {
    pub enabled: bool,
}

impl Sharing for TerminalShare {
    fn share(&mut self, invite: &Invite) -> ShareOutcome {
        if !self.enabled {
            return ShareOutcome::Unavailable;
        }
        println!("{}", render_invite(invite));
        ShareOutcome::Accepted
    }
}

fn render_invite(invite: &Invite) -> String {
    match &invite.url {
        Some(url) => format!("{}: {} {}", invite.title, invite.text, url),
        None => format!("{}: {}", invite.title, invite.text),
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chooser_outcomes() {
        let mut c = Chooser {
            enabled: true,
            choice: Some(Advertisement::new("a1", None)),
        };
        assert!(matches!(c.probe(), ProbeOutcome::Found(_)));
        assert_eq!(c.probe(), ProbeOutcome::Cancelled);
        let mut off = Chooser {
            enabled: false,
            choice: None,
        };
        assert_eq!(off.probe(), ProbeOutcome::Unsupported);
    }

    #[test]
    fn permissions_need_discovery() {
        assert!(HostPermissions {
            discovery_enabled: true
        }
        .request()
        .is_ok());
        assert_eq!(
            HostPermissions {
                discovery_enabled: false
            }
            .request(),
            Err(PermissionDenied::DiscoveryUnsupported)
        );
    }

    #[test]
    fn camera_reads_file_as_data_url() {
        let path = std::env::temp_dir().join(format!("kenar-test-{}.png", std::process::id()));
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let mut cam = FileCamera { path: path.clone() };
        let img = cam.capture(Facing::Environment).unwrap();
        assert_eq!(img.as_str(), "data:image/png;base64,AQID");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unreadable_file_fails_capture() {
        let mut missing = FileCamera {
            path: PathBuf::from("/nonexistent/kenar.jpg"),
        };
        assert!(matches!(
            missing.capture(Facing::User),
            Err(CaptureError::Failed(_))
        ));
    }

    #[test]
    fn share_needs_the_terminal_sheet() {
        let invite = Invite::new(Some("https://example.org/kenar".into()));
        assert_eq!(
            TerminalShare { enabled: true }.share(&invite),
            ShareOutcome::Accepted
        );
        assert_eq!(
            TerminalShare { enabled: false }.share(&invite),
            ShareOutcome::Unavailable
        );
        assert_eq!(
            render_invite(&invite),
            "Kenar: Let's connect on Kenar! https://example.org/kenar"
        );
        assert_eq!(render_invite(&Invite::new(None)), "Kenar: Let's connect on Kenar!");
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("noext")), "image/jpeg");
    }
}
