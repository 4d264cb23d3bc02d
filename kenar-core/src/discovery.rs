//! Device discovery: user-triggered single-shot probes, dedup by id, simulated pairing.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::capability::{Discovery, ProbeOutcome, ScanError};
use crate::config::Millis;
use crate::peer::{ConnectionState, Peer, PeerId};

/// What the radar should say right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryStatus {
    Scanning,
    Failed(ScanError),
    /// Nothing found yet.
    Empty,
    Ready,
}

/// Owns every discovered peer and its connection state.
pub struct DeviceDiscovery {
    /// Discovery order.
    peers: Vec<Peer>,
    states: HashMap<PeerId, ConnectionState>,
    /// Time at which each `Connecting` peer becomes `Connected`.
    connect_deadlines: HashMap<PeerId, Millis>,
    connect_delay_ms: Millis,
    scanning: bool,
    last_error: Option<ScanError>,
    /// Set once the host reports it has no discovery capability.
    unsupported: bool,
}

impl DeviceDiscovery {
    pub fn new(connect_delay_ms: Millis) -> Self {
        Self {
            peers: Vec::new(),
            states: HashMap::new(),
            connect_deadlines: HashMap::new(),
            connect_delay_ms,
            scanning: false,
            last_error: None,
            unsupported: false,
        }
    }

    /// Start a probe. Fails fast if discovery was already found to be unavailable.
    pub fn begin_scan(&mut self) -> Result<(), ScanError> {
        if self.unsupported {
            self.last_error = Some(ScanError::NoCapability);
            return Err(ScanError::NoCapability);
        }
        self.scanning = true;
        self.last_error = None;
        Ok(())
    }

    /// Apply a probe result. Returns the peer if it is new, None if its id was already known.
    pub fn complete_scan(&mut self, outcome: ProbeOutcome) -> Result<Option<Peer>, ScanError> {
        self.scanning = false;
        match outcome.into_result() {
            Ok(ad) => Ok(self.on_advertisement(Peer::from_advertisement(ad))),
            Err(e) => {
                if e.is_terminal() {
                    self.unsupported = true;
                }
                warn!(error = %e, "Scan did not find a device");
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Run one probe against the host capability.
    pub fn scan(&mut self, probe: &mut impl Discovery) -> Result<Option<Peer>, ScanError> {
        self.begin_scan()?;
        let outcome = probe.probe();
        self.complete_scan(outcome)
    }

    fn on_advertisement(&mut self, peer: Peer) -> Option<Peer> {
        if self.states.contains_key(&peer.id) {
            debug!(peer = %peer.id, "Rediscovered known peer");
            return None;
        }
        info!(peer = %peer.id, name = %peer.display_name, "Peer discovered");
        self.states
            .insert(peer.id.clone(), ConnectionState::Discovered);
        self.peers.push(peer.clone());
        Some(peer)
    }

    /// Request a connection. Returns true if this call started the handshake.
    /// Unknown peers and peers already connecting or connected are left alone.
    pub fn connect(&mut self, peer_id: &PeerId, now: Millis) -> bool {
        match self.states.get(peer_id).copied() {
            Some(ConnectionState::Discovered) => {
                self.states
                    .insert(peer_id.clone(), ConnectionState::Connecting);
                let deadline = now.saturating_add(self.connect_delay_ms);
                self.connect_deadlines.insert(peer_id.clone(), deadline);
                info!(peer = %peer_id, deadline, "Connecting");
                true
            }
            Some(state) => {
                debug!(peer = %peer_id, ?state, "Connect ignored");
                false
            }
            None => {
                debug!(peer = %peer_id, "Connect to unknown peer ignored");
                false
            }
        }
    }

    /// Complete every handshake whose delay has elapsed. Returns newly connected peers in
    /// deadline order.
    pub fn poll(&mut self, now: Millis) -> Vec<PeerId> {
        let mut due: Vec<(Millis, PeerId)> = self
            .connect_deadlines
            .iter()
            .filter(|&(_, &t)| t <= now)
            .map(|(p, &t)| (t, p.clone()))
            .collect();
        due.sort();
        let mut connected = Vec::with_capacity(due.len());
        for (_, peer_id) in due {
            self.connect_deadlines.remove(&peer_id);
            self.states
                .insert(peer_id.clone(), ConnectionState::Connected);
            info!(peer = %peer_id, "Connected");
            connected.push(peer_id);
        }
        connected
    }

    /// Earliest pending handshake completion, if any.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.connect_deadlines.values().copied().min()
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == *peer_id)
    }

    pub fn connection_state(&self, peer_id: &PeerId) -> Option<ConnectionState> {
        self.states.get(peer_id).copied()
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.connection_state(peer_id) == Some(ConnectionState::Connected)
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// False once the host reported discovery as unavailable.
    pub fn is_available(&self) -> bool {
        !self.unsupported
    }

    pub fn status(&self) -> DiscoveryStatus {
        if self.scanning {
            DiscoveryStatus::Scanning
        } else if let Some(e) = &self.last_error {
            DiscoveryStatus::Failed(e.clone())
        } else if self.peers.is_empty() {
            DiscoveryStatus::Empty
        } else {
            DiscoveryStatus::Ready
        }
    }
}
