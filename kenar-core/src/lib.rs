//! Kenar session core: nearby peers, per-peer disappearing messages, photo capture.
//! Host-driven: no I/O; host passes intents, capability results and time, and reads
//! state and events back.

pub mod capability;
pub mod capture;
pub mod config;
pub mod discovery;
pub mod expiry;
pub mod message;
pub mod peer;
pub mod session;

pub use capability::{
    CaptionError, CaptionSuggester, CaptureError, Discovery, Facing, ImageRef, Invite,
    PermissionDenied, Permissions, ProbeOutcome, ScanError, ShareOutcome, Sharing, StillCamera,
};
pub use capture::{CaptionRequest, CaptionTicket, CaptureFlow, CaptureStage};
pub use config::{Millis, SessionConfig};
pub use discovery::{DeviceDiscovery, DiscoveryStatus};
pub use message::{Message, MessageDraft, MessageId, MessageKind, MessageStore};
pub use peer::{Advertisement, ConnectionState, Peer, PeerId};
pub use session::{Advisory, RemovalReason, Route, SessionController, SessionEvent, SessionView};
