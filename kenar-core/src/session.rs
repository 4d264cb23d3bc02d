//! Host-driven API: SessionController receives user intents and capability results,
//! updates its stores, and queues `SessionEvent`s for the presentation layer.
//!
//! No operation fails on user input. Unmet preconditions are no-ops or surface an
//! `Advisory`; a view that points at a missing conversation falls back to `Browsing`.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capability::{
    CaptionError, CaptureError, Discovery, ImageRef, Invite, PermissionDenied, Permissions,
    ScanError, ShareOutcome, Sharing, StillCamera,
};
use crate::capture::{CaptionTicket, CaptureFlow};
use crate::config::{Millis, SessionConfig};
use crate::discovery::DeviceDiscovery;
use crate::expiry::ExpiryQueue;
use crate::message::{Message, MessageDraft, MessageId, MessageStore};
use crate::peer::{ConnectionState, Peer, PeerId};

/// The one screen the session is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionView {
    RequestingPermissions,
    /// Nearby-peer radar. A peer chosen earlier stays active while hopping to the camera.
    Browsing { active_peer: Option<PeerId> },
    Capturing { active_peer: Option<PeerId> },
    Chatting { peer: PeerId },
}

impl SessionView {
    pub fn active_peer(&self) -> Option<&PeerId> {
        match self {
            SessionView::RequestingPermissions => None,
            SessionView::Browsing { active_peer } | SessionView::Capturing { active_peer } => {
                active_peer.as_ref()
            }
            SessionView::Chatting { peer } => Some(peer),
        }
    }
}

/// Navigation targets reachable by explicit user navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Browsing,
    Capturing,
}

/// User-facing, recoverable conditions. Retry is re-invoking the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Advisory {
    #[error(transparent)]
    Permission(#[from] PermissionDenied),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("choose someone to send to first")]
    NoRecipient,
    #[error("connect to {0} before chatting")]
    PeerNotConnected(PeerId),
    #[error("no nearby device with id {0}")]
    UnknownPeer(PeerId),
    #[error("sharing is not available; copy the link manually")]
    ShareUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Expired,
    Removed,
    Cleared,
}

/// What changed, for the presentation layer. Drained with `drain_events` or `tick`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ViewChanged(SessionView),
    PeerDiscovered(Peer),
    PeerConnected(PeerId),
    MessageAdded {
        peer_id: PeerId,
        message: Message,
    },
    MessageRemoved {
        peer_id: PeerId,
        message_id: MessageId,
        reason: RemovalReason,
    },
    Advisory(Advisory),
}

/// Main coordinator. Owns the view; delegates peers, messages and capture to their stores.
pub struct SessionController {
    config: SessionConfig,
    view: SessionView,
    store: MessageStore,
    discovery: DeviceDiscovery,
    expiry: ExpiryQueue,
    capture: CaptureFlow,
    advisory: Option<Advisory>,
    events: Vec<SessionEvent>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        let discovery = DeviceDiscovery::new(config.connect_delay_ms);
        let capture = CaptureFlow::new(config.fallback_captions());
        Self {
            config,
            view: SessionView::RequestingPermissions,
            store: MessageStore::new(),
            discovery,
            expiry: ExpiryQueue::new(),
            capture,
            advisory: None,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn active_peer(&self) -> Option<&PeerId> {
        self.view.active_peer()
    }

    /// Most recent advisory, if not yet taken.
    pub fn advisory(&self) -> Option<&Advisory> {
        self.advisory.as_ref()
    }

    pub fn take_advisory(&mut self) -> Option<Advisory> {
        self.advisory.take()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- permissions ----

    /// Ask the host for location and discovery access; on success move to browsing.
    pub fn request_permissions(
        &mut self,
        permissions: &mut impl Permissions,
    ) -> Result<(), PermissionDenied> {
        if self.view != SessionView::RequestingPermissions {
            debug!("Permissions already granted");
            return Ok(());
        }
        match permissions.request() {
            Ok(()) => {
                self.grant_permissions();
                Ok(())
            }
            Err(e) => {
                self.advise(Advisory::Permission(e.clone()));
                Err(e)
            }
        }
    }

    /// The permissions collaborator reports that everything needed was authorized.
    pub fn grant_permissions(&mut self) {
        if self.view == SessionView::RequestingPermissions {
            self.set_view(SessionView::Browsing { active_peer: None });
        }
    }

    // ---- discovery ----

    /// One user-triggered probe. Returns the peer if it is newly discovered.
    pub fn scan(&mut self, probe: &mut impl Discovery) -> Option<Peer> {
        if self.view == SessionView::RequestingPermissions {
            debug!("Scan before permissions ignored");
            return None;
        }
        match self.discovery.scan(probe) {
            Ok(Some(peer)) => {
                self.events.push(SessionEvent::PeerDiscovered(peer.clone()));
                Some(peer)
            }
            Ok(None) => None,
            Err(e) => {
                self.advise(Advisory::Scan(e));
                None
            }
        }
    }

    /// Start pairing with a discovered peer. Returns true if the handshake started.
    pub fn connect(&mut self, peer_id: &PeerId, now: Millis) -> bool {
        self.discovery.connect(peer_id, now)
    }

    pub fn discovery(&self) -> &DeviceDiscovery {
        &self.discovery
    }

    pub fn peers(&self) -> &[Peer] {
        self.discovery.peers()
    }

    pub fn connection_state(&self, peer_id: &PeerId) -> Option<ConnectionState> {
        self.discovery.connection_state(peer_id)
    }

    /// Invite someone who is not nearby yet. Offered from the radar only.
    pub fn share_invite(&mut self, sharing: &mut impl Sharing) -> Option<ShareOutcome> {
        if !matches!(self.view, SessionView::Browsing { .. }) {
            debug!(view = ?self.view, "Share ignored in this view");
            return None;
        }
        let invite = Invite::new(self.config.invite_url.clone());
        let outcome = sharing.share(&invite);
        match outcome {
            ShareOutcome::Accepted => info!("Invite shared"),
            ShareOutcome::Unavailable => self.advise(Advisory::ShareUnavailable),
        }
        Some(outcome)
    }

    // ---- conversations ----

    /// Open the chat with a connected peer, creating an empty conversation if needed.
    /// Selecting the peer already open changes nothing.
    pub fn select_peer(&mut self, peer_id: &PeerId) {
        match &self.view {
            SessionView::Browsing { .. } | SessionView::Chatting { .. } => {}
            view => {
                debug!(?view, peer = %peer_id, "Select ignored in this view");
                return;
            }
        }
        if self.discovery.peer(peer_id).is_none() {
            self.advise(Advisory::UnknownPeer(peer_id.clone()));
            return;
        }
        if !self.discovery.is_connected(peer_id) {
            self.advise(Advisory::PeerNotConnected(peer_id.clone()));
            return;
        }
        if self.store.ensure_conversation(peer_id) {
            debug!(peer = %peer_id, "Conversation created");
        }
        self.set_view(SessionView::Chatting {
            peer: peer_id.clone(),
        });
    }

    /// Send text to the open chat. Whitespace-only text is ignored.
    pub fn send_text(&mut self, text: &str, now: Millis) -> Option<Message> {
        let SessionView::Chatting { peer } = &self.view else {
            debug!("Send text outside a chat ignored");
            return None;
        };
        let peer = peer.clone();
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if !self.store.has_conversation(&peer) {
            self.repair();
            return None;
        }
        Some(self.append(&peer, MessageDraft::text(text), true, now))
    }

    /// A photo is ready. Goes to the active peer's chat; without an active peer nothing is
    /// sent, the user is advised and the view returns to browsing.
    pub fn send_photo(&mut self, image: ImageRef, caption: &str, now: Millis) -> Option<Message> {
        let SessionView::Capturing { active_peer } = &self.view else {
            debug!("Send photo outside the camera ignored");
            return None;
        };
        let Some(peer) = active_peer.clone() else {
            self.advise(Advisory::NoRecipient);
            self.set_view(SessionView::Browsing { active_peer: None });
            return None;
        };
        let caption = Some(caption.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let msg = self.append(
            &peer,
            MessageDraft::image(image.into_string(), caption),
            true,
            now,
        );
        self.set_view(SessionView::Chatting { peer });
        Some(msg)
    }

    /// Send whatever the capture flow holds, with its current caption.
    pub fn send_captured(&mut self, now: Millis) -> Option<Message> {
        if !matches!(self.view, SessionView::Capturing { .. }) {
            return None;
        }
        let (image, caption) = self.capture.take_for_send()?;
        self.send_photo(image, &caption, now)
    }

    /// A message arriving from a peer. Creates the conversation if needed.
    pub fn receive_message(&mut self, peer_id: &PeerId, draft: MessageDraft, now: Millis) -> Message {
        self.append(peer_id, draft, false, now)
    }

    /// Remove a message before it expires. Unknown or already removed ids are a no-op.
    pub fn remove_message(&mut self, message_id: &MessageId) -> bool {
        let Some(peer_id) = self.expiry.cancel(message_id) else {
            debug!(id = %message_id, "Remove of absent message ignored");
            return false;
        };
        let removed = self.store.remove(&peer_id, message_id);
        if removed {
            self.events.push(SessionEvent::MessageRemoved {
                peer_id,
                message_id: *message_id,
                reason: RemovalReason::Removed,
            });
        }
        removed
    }

    /// Empty a conversation and release all of its timers. Returns how many were removed.
    pub fn clear_conversation(&mut self, peer_id: &PeerId) -> usize {
        let ids = self.store.clear(peer_id);
        for id in &ids {
            self.expiry.cancel(id);
            self.events.push(SessionEvent::MessageRemoved {
                peer_id: peer_id.clone(),
                message_id: *id,
                reason: RemovalReason::Cleared,
            });
        }
        self.expiry.cancel_peer(peer_id);
        ids.len()
    }

    /// Snapshot of a peer's conversation; empty if there is none.
    pub fn conversation(&self, peer_id: &PeerId) -> Vec<Message> {
        self.store.get(peer_id)
    }

    /// Conversation of the open chat, or None outside a chat.
    pub fn active_conversation(&self) -> Option<Vec<Message>> {
        match &self.view {
            SessionView::Chatting { peer } => Some(self.store.get(peer)),
            _ => None,
        }
    }

    pub fn has_conversation(&self, peer_id: &PeerId) -> bool {
        self.store.has_conversation(peer_id)
    }

    fn append(
        &mut self,
        peer_id: &PeerId,
        draft: MessageDraft,
        sender_is_local: bool,
        now: Millis,
    ) -> Message {
        let msg = self.store.append(peer_id, draft, sender_is_local, now);
        self.expiry.schedule(
            peer_id.clone(),
            msg.id,
            msg.expires_at(self.config.message_ttl_ms),
        );
        self.events.push(SessionEvent::MessageAdded {
            peer_id: peer_id.clone(),
            message: msg.clone(),
        });
        msg
    }

    // ---- navigation ----

    pub fn navigate_to(&mut self, route: Route) {
        if route == Route::Browsing {
            self.back();
            return;
        }
        let next = match &self.view {
            SessionView::Browsing { active_peer } => SessionView::Capturing {
                active_peer: active_peer.clone(),
            },
            SessionView::Chatting { peer } => SessionView::Capturing {
                active_peer: Some(peer.clone()),
            },
            view => {
                debug!(?view, ?route, "Navigation ignored");
                return;
            }
        };
        self.set_view(next);
    }

    /// Leave the camera (keeping the active peer) or the chat (clearing it).
    pub fn back(&mut self) {
        let next = match &self.view {
            SessionView::Capturing { active_peer } => SessionView::Browsing {
                active_peer: active_peer.clone(),
            },
            SessionView::Chatting { .. } => SessionView::Browsing { active_peer: None },
            _ => return,
        };
        self.set_view(next);
    }

    // ---- capture ----

    pub fn capture_flow(&self) -> &CaptureFlow {
        &self.capture
    }

    /// The capture flow, only while composing a photo.
    pub fn capture_flow_mut(&mut self) -> Option<&mut CaptureFlow> {
        match self.view {
            SessionView::Capturing { .. } => Some(&mut self.capture),
            _ => None,
        }
    }

    /// Take a still with the host camera. Failures are surfaced as advisories.
    /// Returns false without touching the camera while a photo is held; retake first.
    pub fn capture_photo(&mut self, camera: &mut impl StillCamera) -> bool {
        let Some(flow) = self.capture_flow_mut() else {
            return false;
        };
        if flow.image().is_some() {
            debug!("Photo already held; retake first");
            return false;
        }
        match flow.capture(camera) {
            Ok(_) => true,
            Err(e) => {
                self.advise(Advisory::Capture(e));
                false
            }
        }
    }

    /// Deliver a caption suggestion result. Dropped if the camera was left meanwhile.
    pub fn complete_captions(
        &mut self,
        ticket: CaptionTicket,
        result: Result<Vec<String>, CaptionError>,
    ) -> bool {
        match self.capture_flow_mut() {
            Some(flow) => flow.complete_captions(ticket, result),
            None => {
                debug!(?ticket, "Caption result after leaving the camera dropped");
                false
            }
        }
    }

    // ---- time ----

    /// Advance time: expire due messages, finish due handshakes. Returns all pending events.
    pub fn tick(&mut self, now: Millis) -> Vec<SessionEvent> {
        for (peer_id, message_id) in self.expiry.pop_due(now) {
            if self.store.remove(&peer_id, &message_id) {
                debug!(peer = %peer_id, id = %message_id, "Message expired");
                self.events.push(SessionEvent::MessageRemoved {
                    peer_id,
                    message_id,
                    reason: RemovalReason::Expired,
                });
            }
        }
        for peer_id in self.discovery.poll(now) {
            self.events.push(SessionEvent::PeerConnected(peer_id));
        }
        self.repair();
        self.drain_events()
    }

    /// Earliest time at which `tick` has work to do.
    pub fn next_deadline(&self) -> Option<Millis> {
        match (self.expiry.next_deadline(), self.discovery.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Number of armed message timers.
    pub fn live_timers(&self) -> usize {
        self.expiry.len()
    }

    // ---- internals ----

    fn set_view(&mut self, next: SessionView) {
        if self.view == next {
            return;
        }
        if matches!(self.view, SessionView::Capturing { .. })
            && !matches!(next, SessionView::Capturing { .. })
        {
            // Leaving the camera unmounts it: drop the photo and any pending suggestion.
            self.capture.retake();
        }
        info!(from = ?self.view, to = ?next, "View changed");
        self.view = next.clone();
        self.events.push(SessionEvent::ViewChanged(next));
    }

    fn advise(&mut self, advisory: Advisory) {
        warn!(%advisory, "Advisory");
        self.events.push(SessionEvent::Advisory(advisory.clone()));
        self.advisory = Some(advisory);
    }

    /// A chat without a conversation is not a valid state; fall back to browsing.
    fn repair(&mut self) {
        if let SessionView::Chatting { peer } = &self.view {
            if !self.store.has_conversation(peer) {
                warn!(peer = %peer, "Chat without conversation; falling back to browsing");
                self.set_view(SessionView::Browsing { active_peer: None });
            }
        }
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
