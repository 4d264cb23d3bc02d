// Kenar Linux: terminal host for one kenar-core session (stdin commands, clock, captions).

mod captions;
mod command;
mod config;
mod devices;

use std::time::{Duration, Instant};

use anyhow::Context;
use kenar_core::{
    Advertisement, CaptionError, CaptionRequest, CaptionSuggester, CaptionTicket, ConnectionState,
    Message, MessageDraft, MessageKind, Millis, PeerId, Route, SessionController, SessionEvent,
    SessionView,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::captions::HttpCaptionSuggester;
use crate::command::{Command, HELP};
use crate::config::Config;
use crate::devices::{Chooser, FileCamera, HostPermissions, TerminalShare};

const VERSION: &str = env!("CARGO_PKG_VERSION");

type CaptionDone = (CaptionTicket, Result<Vec<String>, CaptionError>);

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("kenar-linux {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kenar_core=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load();
    if cfg.api_key.is_none() {
        info!("KENAR_API_KEY not set; caption suggestions will use the fallback list");
    }

    let rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    rt.block_on(run(cfg))
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    let (caption_tx, mut caption_rx) = mpsc::unbounded_channel::<CaptionDone>();
    let mut host = Host::new(cfg, caption_tx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(host.cfg.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    println!("kenar {} (type `help`)", VERSION);
    host.show();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    debug!("stdin closed");
                    break;
                };
                if !host.handle_line(&line) {
                    break;
                }
            }
            _ = ticker.tick() => host.tick(),
            Some((ticket, result)) = caption_rx.recv() => host.captions_done(ticket, result),
            res = &mut shutdown => {
                res?;
                info!("Shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Owns the session. Everything touching it runs on the loop task.
struct Host {
    cfg: Config,
    session: SessionController,
    suggester: HttpCaptionSuggester,
    caption_tx: mpsc::UnboundedSender<CaptionDone>,
    started: Instant,
}

impl Host {
    fn new(cfg: Config, caption_tx: mpsc::UnboundedSender<CaptionDone>) -> Self {
        let session = SessionController::new(cfg.session_config());
        let suggester = HttpCaptionSuggester::new(
            cfg.caption_endpoint.clone(),
            cfg.caption_model.clone(),
            cfg.api_key.clone(),
            Duration::from_millis(cfg.caption_timeout_ms),
            session.config().fallback_captions(),
        );
        Self {
            cfg,
            session,
            suggester,
            caption_tx,
            started: Instant::now(),
        }
    }

    fn now(&self) -> Millis {
        self.started.elapsed().as_millis() as Millis
    }

    /// Returns false when the user asked to quit.
    fn handle_line(&mut self, line: &str) -> bool {
        match command::parse(line) {
            Ok(Some(Command::Quit)) => return false,
            Ok(Some(cmd)) => self.handle(cmd),
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
        self.flush();
        true
    }

    fn handle(&mut self, cmd: Command) {
        let now = self.now();
        match cmd {
            Command::Grant => {
                let mut permissions = HostPermissions {
                    discovery_enabled: self.cfg.discovery_enabled,
                };
                // Denials surface as advisories.
                let _ = self.session.request_permissions(&mut permissions);
            }
            Command::Scan { id, name } => {
                let mut chooser = Chooser {
                    enabled: self.cfg.discovery_enabled,
                    choice: id.map(|id| Advertisement::new(id, name.as_deref())),
                };
                self.session.scan(&mut chooser);
            }
            Command::Connect(id) => {
                if !self.session.connect(&PeerId::new(id.as_str()), now) {
                    println!("cannot connect to {}", id);
                }
            }
            Command::Chat(id) => self.session.select_peer(&PeerId::new(id)),
            Command::Say(text) => {
                self.session.send_text(&text, now);
            }
            Command::Remove(index) => {
                let target = self
                    .session
                    .active_conversation()
                    .and_then(|conv| conv.get(index).map(|m| m.id));
                match target {
                    Some(id) => {
                        self.session.remove_message(&id);
                    }
                    None => println!("no message #{}", index + 1),
                }
            }
            Command::Clear => {
                if let SessionView::Chatting { peer } = self.session.view().clone() {
                    self.session.clear_conversation(&peer);
                }
            }
            Command::Camera => self.session.navigate_to(Route::Capturing),
            Command::Nearby => self.session.navigate_to(Route::Browsing),
            Command::Back => self.session.back(),
            Command::Flip => match self.session.capture_flow_mut() {
                Some(flow) => {
                    flow.flip_camera();
                    println!("camera: {:?}", flow.facing());
                }
                None => println!("open the camera first"),
            },
            Command::Snap(path) => {
                let mut camera = FileCamera { path };
                if self.session.capture_photo(&mut camera) {
                    println!("photo taken");
                } else if self.session.capture_flow().image().is_some() {
                    println!("retake first");
                }
            }
            Command::Captions => {
                let request = self
                    .session
                    .capture_flow_mut()
                    .and_then(|flow| flow.request_captions());
                match request {
                    Some(req) => {
                        println!("suggesting captions...");
                        self.spawn_captions(req);
                    }
                    None => println!("nothing to caption"),
                }
            }
            Command::Pick(index) => {
                let picked = self
                    .session
                    .capture_flow_mut()
                    .is_some_and(|flow| flow.select_suggestion(index));
                if !picked {
                    println!("no suggestion #{}", index + 1);
                }
            }
            Command::Caption(text) => {
                if let Some(flow) = self.session.capture_flow_mut() {
                    flow.set_caption(text);
                }
            }
            Command::Retake => {
                if let Some(flow) = self.session.capture_flow_mut() {
                    flow.retake();
                }
            }
            Command::Send => {
                self.session.send_captured(now);
            }
            Command::Incoming { from, text } => {
                self.session
                    .receive_message(&PeerId::new(from), MessageDraft::text(text), now);
            }
            Command::Share => {
                let mut sheet = TerminalShare {
                    enabled: self.cfg.sharing_enabled,
                };
                if self.session.share_invite(&mut sheet).is_none() {
                    println!("share from the nearby screen");
                }
            }
            Command::Show => self.show(),
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
    }

    /// Run the suggester off the loop; the result comes back through `caption_tx`.
    fn spawn_captions(&self, req: CaptionRequest) {
        let suggester = self.suggester.clone();
        let tx = self.caption_tx.clone();
        let limit = Duration::from_millis(self.cfg.caption_timeout_ms);
        tokio::spawn(async move {
            let CaptionRequest { ticket, image } = req;
            let mut inner = tokio::spawn(async move { suggester.suggest(&image).await });
            let result = match tokio::time::timeout(limit, &mut inner).await {
                Ok(Ok(list)) => Ok(list),
                Ok(Err(e)) => Err(CaptionError::Failed(e.to_string())),
                Err(_) => {
                    inner.abort();
                    Err(CaptionError::Failed("timed out".to_string()))
                }
            };
            let _ = tx.send((ticket, result));
        });
    }

    fn captions_done(&mut self, ticket: CaptionTicket, result: Result<Vec<String>, CaptionError>) {
        if self.session.complete_captions(ticket, result) {
            let flow = self.session.capture_flow();
            for (i, s) in flow.suggestions().iter().enumerate() {
                println!("  {}. {}", i + 1, s);
            }
            if let Some(c) = flow.caption() {
                println!("caption: {}", c);
            }
        }
        self.flush();
    }

    fn tick(&mut self) {
        let now = self.now();
        for event in self.session.tick(now) {
            self.print_event(&event);
        }
    }

    fn flush(&mut self) {
        for event in self.session.drain_events() {
            self.print_event(&event);
        }
    }

    fn print_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::ViewChanged(_) => self.show(),
            SessionEvent::PeerDiscovered(p) => println!("+ {} ({})", p.display_name, p.id),
            SessionEvent::PeerConnected(id) => println!("= connected to {}", id),
            SessionEvent::MessageAdded { peer_id, message } => {
                if self.session.active_peer() == Some(peer_id) {
                    println!("{}", self.format_message(message));
                } else {
                    println!("(new message from {})", peer_id);
                }
            }
            SessionEvent::MessageRemoved {
                peer_id,
                message_id,
                reason,
            } => debug!(peer = %peer_id, id = %message_id, ?reason, "Message gone"),
            SessionEvent::Advisory(a) => println!("! {}", a),
        }
    }

    fn format_message(&self, m: &Message) -> String {
        let who = if m.sender_is_local { "me" } else { "them" };
        let left = m.seconds_remaining(self.now(), self.session.config().message_ttl_ms);
        match m.kind {
            MessageKind::Text => format!("[{}s] {}: {}", left, who, m.body),
            MessageKind::Image => format!(
                "[{}s] {}: <photo> {}",
                left,
                who,
                m.caption.as_deref().unwrap_or("")
            ),
        }
    }

    fn show(&self) {
        match self.session.view() {
            SessionView::RequestingPermissions => {
                println!("-- permissions needed: type `grant`");
            }
            SessionView::Browsing { active_peer } => {
                println!("-- nearby ({:?})", self.session.discovery().status());
                if let Some(p) = active_peer {
                    println!("   sending to {}", p);
                }
                for peer in self.session.peers() {
                    let state = match self.session.connection_state(&peer.id) {
                        Some(ConnectionState::Connected) => "connected",
                        Some(ConnectionState::Connecting) => "connecting",
                        _ => "discovered",
                    };
                    println!("   {} [{}] {}", peer.id, state, peer.display_name);
                }
            }
            SessionView::Capturing { active_peer } => {
                let flow = self.session.capture_flow();
                println!(
                    "-- camera ({:?}, {:?}) to {}",
                    flow.stage(),
                    flow.facing(),
                    active_peer
                        .as_ref()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "nobody".to_string())
                );
            }
            SessionView::Chatting { peer } => {
                println!("-- chat with {}", peer);
                for (i, m) in self.session.conversation(peer).iter().enumerate() {
                    println!("{:>3} {}", i + 1, self.format_message(m));
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
