//! Per-connection WebSocket state machine (§4.4).
//!
//! A connection is born anonymous and must send a control frame before
//! anything else is accepted. From there it is either joined to a session
//! (`create`/`join` succeed) or stays anonymous until it disconnects.
//! Reading and writing happen on two tasks per connection so neither a slow
//! peer write nor a stalled peer read can block the other (§5).

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use doomcode_proto::model::{Connection, Role};
use doomcode_proto::{ControlFrame, Envelope, WireFrame};
use doomcode_relay_store::sessions::SlotClaim;
use doomcode_relay_store::StoreError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Liveness probe timeout: a single roundtrip (§5). If no `Pong` arrives in
/// this window, the incumbent is treated as gone.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Mutable per-connection membership, local to this task. Never shared —
/// only this task ever reads or writes its own connection's role/session.
struct Membership {
    connection_id: String,
    session_id: Option<String>,
    role: Option<Role>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = futures_util::StreamExt::split(socket);

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(connection_id.clone(), tx);
    state
        .store
        .put_connection(Connection::anonymous(connection_id.clone(), Utc::now()));

    let writer_connection_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        use futures_util::SinkExt;
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                debug!(connection_id = %writer_connection_id, "write failed, peer gone");
                break;
            }
        }
    });

    let mut membership = Membership {
        connection_id: connection_id.clone(),
        session_id: None,
        role: None,
    };

    use futures_util::StreamExt;
    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(m) => m,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "transport read error");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                handle_frame(&state, &mut membership, text.as_bytes()).await;
            }
            Message::Binary(bytes) => {
                handle_frame(&state, &mut membership, &bytes).await;
            }
            Message::Pong(_) => {
                state.resolve_probe(&connection_id);
            }
            Message::Ping(_) | Message::Close(_) => {
                break;
            }
        }
    }

    on_disconnect(&state, &membership).await;
    state.unregister(&connection_id);
    writer.abort();
}

async fn handle_frame(state: &AppState, membership: &mut Membership, bytes: &[u8]) {
    let frame = match WireFrame::decode(bytes) {
        Ok(f) => f,
        Err(e) => {
            debug!(connection_id = %membership.connection_id, error = %e, "dropping malformed frame");
            return;
        }
    };

    match frame {
        WireFrame::Control(control) => handle_control(state, membership, control).await,
        WireFrame::Envelope(envelope) => handle_envelope(state, membership, envelope).await,
    }
}

async fn handle_control(state: &AppState, membership: &mut Membership, frame: ControlFrame) {
    match frame {
        ControlFrame::Create { public_key } => {
            let session_id = Uuid::new_v4().to_string();
            let now = Utc::now();
            state.store.create_session(session_id.clone(), now);
            match state.store.claim_session_slot(
                &session_id,
                Role::Controller,
                membership.connection_id.clone(),
                public_key.clone(),
                now,
            ) {
                Ok(SlotClaim::Claimed { .. }) => {
                    membership.session_id = Some(session_id.clone());
                    membership.role = Some(Role::Controller);
                    persist_connection(state, membership, &public_key);
                    send_control(
                        state,
                        &membership.connection_id,
                        ControlFrame::SessionCreated { session_id },
                    );
                }
                _ => {
                    send_control(
                        state,
                        &membership.connection_id,
                        ControlFrame::internal_error("failed to create session"),
                    );
                }
            }
        }

        ControlFrame::Join {
            session_id,
            role,
            public_key,
        } => {
            handle_join(state, membership, session_id, role, public_key).await;
        }

        ControlFrame::Leave => {
            on_disconnect(state, membership).await;
            membership.session_id = None;
            membership.role = None;
        }

        ControlFrame::Ack {
            session_id,
            last_message_id,
        } => {
            if membership.session_id.as_deref() == Some(session_id.as_str()) {
                state.store.delete_queued_up_to(&session_id, &last_message_id);
            } else {
                send_control(
                    state,
                    &membership.connection_id,
                    ControlFrame::not_joined("ack requires an active join for this session"),
                );
            }
        }

        ControlFrame::QueueStatus { session_id } => {
            if membership.session_id.as_deref() == Some(session_id.as_str()) {
                reply_queue_status(state, &membership.connection_id, &session_id);
            } else {
                send_control(
                    state,
                    &membership.connection_id,
                    ControlFrame::not_joined("queue_status requires an active join for this session"),
                );
            }
        }

        // Relay-originated variants never arrive from a client; a peer
        // sending one is a protocol violation we simply ignore.
        ControlFrame::SessionCreated { .. }
        | ControlFrame::SessionJoined { .. }
        | ControlFrame::PeerConnected { .. }
        | ControlFrame::PeerDisconnected { .. }
        | ControlFrame::QueueStatusReply { .. }
        | ControlFrame::Error { .. }
        | ControlFrame::Ping => {}
    }
}

async fn handle_join(
    state: &AppState,
    membership: &mut Membership,
    session_id: String,
    role: Role,
    public_key: String,
) {
    let now = Utc::now();
    let claim = state.store.claim_session_slot(
        &session_id,
        role,
        membership.connection_id.clone(),
        public_key.clone(),
        now,
    );

    let claim = match claim {
        Ok(claim) => claim,
        Err(StoreError::SessionNotFound(_)) | Err(StoreError::SessionExpired(_)) => {
            send_control(
                state,
                &membership.connection_id,
                ControlFrame::session_not_found(format!("no such session: {session_id}")),
            );
            return;
        }
        Err(_) => {
            send_control(
                state,
                &membership.connection_id,
                ControlFrame::internal_error("join failed"),
            );
            return;
        }
    };

    let claim = match claim {
        SlotClaim::Claimed {
            peer_slot,
            operator_key_rotated,
        } => Some((peer_slot, operator_key_rotated)),
        SlotClaim::Occupied { existing } => {
            if probe_incumbent(state, &existing.connection_id).await {
                // Incumbent is alive: reject the new join.
                send_control(
                    state,
                    &membership.connection_id,
                    ControlFrame::already_connected(format!(
                        "role already connected in session {session_id}"
                    )),
                );
                None
            } else {
                // Incumbent is gone: evict and take the slot.
                match state.store.force_claim_session_slot(
                    &session_id,
                    role,
                    membership.connection_id.clone(),
                    public_key.clone(),
                    now,
                ) {
                    Ok((_evicted, operator_key_rotated)) => {
                        state.store.delete_connection(&existing.connection_id);
                        let session = state.store.get_session(&session_id, now).ok();
                        let peer_slot = session.and_then(|s| s.slot(role.other()).clone());
                        Some((peer_slot, operator_key_rotated))
                    }
                    Err(_) => {
                        send_control(
                            state,
                            &membership.connection_id,
                            ControlFrame::internal_error("eviction failed"),
                        );
                        None
                    }
                }
            }
        }
    };

    let Some((peer_slot, operator_key_rotated)) = claim else {
        return;
    };

    membership.session_id = Some(session_id.clone());
    membership.role = Some(role);
    persist_connection(state, membership, &public_key);

    // Key-rotation invariant: queued ciphertexts were encrypted to the old
    // operator key and are forever unreadable under the new one. Purge
    // before any replay (§4.4).
    if operator_key_rotated {
        info!(session_id = %session_id, "operator key rotated, purging queue");
        state.store.purge_queue(&session_id);
    }

    send_control(
        state,
        &membership.connection_id,
        ControlFrame::SessionJoined {
            peer_public_key: peer_slot.as_ref().map(|s| s.public_key.clone()),
        },
    );

    if let Some(peer) = &peer_slot {
        send_control(
            state,
            &peer.connection_id,
            ControlFrame::PeerConnected {
                peer_public_key: public_key.clone(),
                peer_type: role,
            },
        );
    }

    if role == Role::Operator {
        replay_queue_if_any(state, &session_id, &membership.connection_id, now);
    }
}

/// Send a `Ping` to the incumbent and wait one roundtrip. Returns `true` if
/// the incumbent answered (alive), `false` if it timed out or was already
/// unreachable (gone).
async fn probe_incumbent(state: &AppState, incumbent_connection_id: &str) -> bool {
    let rx = state.register_probe(incumbent_connection_id);
    if !state.send_to(incumbent_connection_id, Message::Ping(Vec::new())) {
        return false;
    }
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, rx).await,
        Ok(Ok(())) // Pong observed within the window.
    )
}

fn persist_connection(state: &AppState, membership: &Membership, public_key: &str) {
    let connection = Connection {
        id: membership.connection_id.clone(),
        session_id: membership.session_id.clone(),
        role: membership.role,
        public_key: Some(public_key.to_string()),
        connected_at: Utc::now(),
    };
    state.store.put_connection(connection);
}

fn reply_queue_status(state: &AppState, connection_id: &str, session_id: &str) {
    let queue = state.store.list_queue(session_id, Utc::now());
    let oldest_timestamp = queue.first().map(|q| q.queued_at.timestamp_millis());
    send_control(
        state,
        connection_id,
        ControlFrame::QueueStatusReply {
            queued_messages: queue.len(),
            oldest_timestamp,
        },
    );
}

/// Replay a session's queue to a freshly joined operator: `queue_status`
/// first, then the envelopes themselves in order (§8 "offline queue and
/// drain").
fn replay_queue_if_any(
    state: &AppState,
    session_id: &str,
    operator_connection_id: &str,
    now: chrono::DateTime<Utc>,
) {
    let queue = state.store.list_queue(session_id, now);
    send_control(
        state,
        operator_connection_id,
        ControlFrame::QueueStatusReply {
            queued_messages: queue.len(),
            oldest_timestamp: queue.first().map(|q| q.queued_at.timestamp_millis()),
        },
    );
    for queued in queue {
        send_envelope(state, operator_connection_id, &queued.envelope);
    }
}

async fn handle_envelope(state: &AppState, membership: &mut Membership, envelope: Envelope) {
    let Some(session_id) = membership.session_id.clone() else {
        debug!(connection_id = %membership.connection_id, "envelope from unjoined connection, rejecting");
        send_control(
            state,
            &membership.connection_id,
            ControlFrame::not_joined("envelope frame requires an active join"),
        );
        return;
    };
    let Some(role) = membership.role else { return };

    if envelope.session_id != session_id {
        debug!(connection_id = %membership.connection_id, "envelope session mismatch, dropping");
        return;
    }

    let now = Utc::now();
    let Ok(session) = state.store.get_session(&session_id, now) else {
        return;
    };

    let peer_slot = session.slot(role.other()).clone();
    match peer_slot {
        Some(peer) => send_envelope(state, &peer.connection_id, &envelope),
        None => {
            if role == Role::Controller {
                let _ = state.store.enqueue(&session_id, envelope, now);
            }
            // Operator-to-controller while controller absent: dropped
            // silently, per §4.4 — the operator's UI owns the retry.
        }
    }
}

async fn on_disconnect(state: &AppState, membership: &Membership) {
    state.store.delete_connection(&membership.connection_id);
    let (Some(session_id), Some(role)) = (&membership.session_id, membership.role) else {
        return;
    };

    let cleared = state.store.clear_session_slot(session_id, role);
    if let Some(_cleared_slot) = cleared {
        if let Ok(session) = state.store.get_session(session_id, Utc::now()) {
            if let Some(peer) = session.slot(role.other()) {
                send_control(
                    state,
                    &peer.connection_id,
                    ControlFrame::PeerDisconnected { peer_type: role },
                );
            }
        }
        info!(session_id = %session_id, role = ?role, "connection left session");
    }
    // Queue is never purged on disconnect (§4.4): the operator may still
    // drain it, and a controller disconnect must not lose in-flight work.
}

fn send_control(state: &AppState, connection_id: &str, frame: ControlFrame) {
    if let Ok(bytes) = serde_json::to_vec(&frame) {
        state.send_to(connection_id, Message::Binary(bytes));
    }
}

fn send_envelope(state: &AppState, connection_id: &str, envelope: &Envelope) {
    if let Ok(bytes) = envelope.encode() {
        state.send_to(connection_id, Message::Binary(bytes));
    }
}
