//! doomcode-controller: the desktop-side controller runtime (§4.5, §6).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use doomcode_controller::cli::{Cli, Commands};
use doomcode_controller::config::RuntimeConfig;
use doomcode_controller::pairing::{build_pairing_payload, print_pairing_payload, PairingClient};
use doomcode_controller::session_cache::SessionCache;
use doomcode_controller::supervisor::{watch_for_exit, Supervisor, SupervisorState};
use doomcode_controller::wire::RelayConnection;
use doomcode_crypto::Keypair;
use doomcode_proto::payload::Payload;
use doomcode_proto::{ControlFrame, Role, WireFrame};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let runtime_config = RuntimeConfig::from_env();
    let default_directive = if runtime_config.debug_session || runtime_config.debug_pty {
        "doomcode_controller=debug"
    } else {
        "doomcode_controller=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_directive.parse()?),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Start {
            ws_url,
            http_url,
            dir,
            agent,
            reuse,
        } => run_start(ws_url, http_url, PathBuf::from(dir), agent, reuse, runtime_config).await,
        Commands::Connect {
            session_id,
            ws_url,
            http_url,
            agent,
        } => run_connect(session_id, ws_url, http_url, PathBuf::from("."), agent, runtime_config).await,
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("fatal: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_start(
    ws_url: String,
    http_url: String,
    dir: PathBuf,
    agent: String,
    reuse: bool,
    runtime_config: RuntimeConfig,
) -> anyhow::Result<()> {
    let cached = if reuse {
        SessionCache::load(&dir)?
    } else {
        None
    };

    let (session_id, keypair) = match cached {
        Some(cache) => {
            info!(session_id = %cache.session_id, "reusing cached session");
            let keypair = cache.keypair()?;
            (cache.session_id.clone(), keypair)
        }
        None => {
            let keypair = Keypair::generate();
            let pairing_client = PairingClient::new(http_url.clone());
            let session_id = pairing_client.create_session().await?;
            let cache = SessionCache::new(&session_id, &ws_url, &http_url, &keypair, Utc::now());
            cache.save(&dir)?;
            (session_id, keypair)
        }
    };

    let payload = build_pairing_payload(&session_id, &ws_url, &keypair);
    print_pairing_payload(&payload);

    run_session(session_id, ws_url, dir, agent, keypair, runtime_config).await
}

async fn run_connect(
    session_id: String,
    ws_url: String,
    http_url: String,
    dir: PathBuf,
    agent: String,
    runtime_config: RuntimeConfig,
) -> anyhow::Result<()> {
    let keypair = Keypair::generate();
    let cache = SessionCache::new(&session_id, &ws_url, &http_url, &keypair, Utc::now());
    cache.save(&dir)?;
    run_session(session_id, ws_url, dir, agent, keypair, runtime_config).await
}

async fn run_session(
    session_id: String,
    ws_url: String,
    dir: PathBuf,
    agent: String,
    keypair: Keypair,
    runtime_config: RuntimeConfig,
) -> anyhow::Result<()> {
    let mut connection = RelayConnection::connect(&ws_url, &session_id, Role::Controller, keypair).await?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Payload>();
    let supervisor = Arc::new(Mutex::new(Supervisor::new(
        agent,
        dir,
        runtime_config,
        events_tx,
    )));

    let watcher = tokio::spawn(watch_for_exit(supervisor.clone()));
    let (reader_tx, mut reader_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    loop {
        tokio::select! {
            frame = connection.next_frame() => {
                let Some(frame) = frame else {
                    info!("transport closed");
                    break;
                };
                match frame {
                    WireFrame::Control(control) => {
                        if let Err(e) = handle_control(&control, &mut connection, &supervisor, reader_tx.clone()).await {
                            warn!("error handling control frame: {e}");
                        }
                    }
                    WireFrame::Envelope(envelope) => {
                        let Some(payload) = connection.open_envelope(&envelope) else {
                            continue;
                        };
                        if let Err(e) = handle_payload(payload, &connection, &supervisor, reader_tx.clone()).await {
                            warn!("error handling payload: {e}");
                        }
                    }
                }
            }
            Some(bytes) = reader_rx.recv() => {
                let mut guard = supervisor.lock().await;
                guard.handle_output_chunk(&bytes);
            }
            Some(event) = events_rx.recv() => {
                if connection.has_peer() {
                    if let Err(e) = connection.send_payload(Role::Controller, &event) {
                        warn!("failed to send payload: {e}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                supervisor.lock().await.stop();
                let _ = connection.send_control(ControlFrame::Leave);
                break;
            }
        }
    }

    watcher.abort();
    Ok(())
}

async fn handle_control(
    control: &ControlFrame,
    connection: &mut RelayConnection,
    supervisor: &Arc<Mutex<Supervisor>>,
    reader_tx: mpsc::UnboundedSender<Vec<u8>>,
) -> anyhow::Result<()> {
    match control {
        ControlFrame::SessionJoined { peer_public_key } => {
            info!("joined session");
            if let Some(key) = peer_public_key {
                connection.bind_peer(key)?;
                start_agent(supervisor, reader_tx).await;
            }
        }
        ControlFrame::PeerConnected { peer_public_key, peer_type } => {
            info!(?peer_type, "peer connected");
            connection.bind_peer(peer_public_key)?;
            start_agent(supervisor, reader_tx).await;
        }
        ControlFrame::PeerDisconnected { peer_type } => {
            info!(?peer_type, "peer disconnected");
        }
        ControlFrame::QueueStatusReply { queued_messages, .. } => {
            info!(queued_messages, "queue status");
        }
        ControlFrame::Error { code, message } => {
            warn!(?code, message, "relay rejected request");
        }
        _ => {}
    }
    Ok(())
}

async fn start_agent(supervisor: &Arc<Mutex<Supervisor>>, reader_tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut guard = supervisor.lock().await;
    if guard.state() == SupervisorState::Idle {
        if let Err(e) = guard.start(reader_tx) {
            error!("failed to start assistant subprocess: {e}");
        }
    }
}

async fn handle_payload(
    payload: Payload,
    connection: &RelayConnection,
    supervisor: &Arc<Mutex<Supervisor>>,
    reader_tx: mpsc::UnboundedSender<Vec<u8>>,
) -> anyhow::Result<()> {
    match payload {
        Payload::UserPrompt { prompt, .. } => {
            let mut guard = supervisor.lock().await;
            guard.send_prompt(&prompt).await?;
        }
        Payload::PermissionResponse { request_id, decision } => {
            let mut guard = supervisor.lock().await;
            guard.handle_permission_response(&request_id, decision).await?;
        }
        Payload::PatchDecision { patch_id, decision, .. } => {
            let mut guard = supervisor.lock().await;
            guard.handle_patch_decision(&patch_id, decision);
        }
        Payload::UndoRequest { patch_id } => {
            let result = {
                let mut guard = supervisor.lock().await;
                guard.handle_undo_request(&patch_id)
            };
            if let Err(e) = connection.send_payload(Role::Controller, &result) {
                warn!("failed to send undo result: {e}");
            }
        }
        Payload::AgentControl { command, .. } => {
            let mut guard = supervisor.lock().await;
            guard.handle_agent_control(command, reader_tx).await?;
        }
        Payload::Heartbeat { .. } => {}
        _ => {}
    }
    Ok(())
}
