//! §8 "Key rotation purge": two envelopes are queued while no operator is
//! present, then an operator joins with a *different* public key than any
//! previously recorded for that slot. The relay must purge the queue before
//! replay — the queued ciphertexts were sealed to a key nobody can read
//! under anymore.

use doomcode_integration_tests::support::{TestClient, TestRelay};
use doomcode_proto::model::Role;
use doomcode_proto::payload::Payload;
use doomcode_proto::ControlFrame;

#[tokio::test]
async fn operator_rejoin_with_new_key_purges_queued_envelopes() {
    let relay = TestRelay::start().await;
    let session_id = relay.create_session().await;

    let mut controller = TestClient::connect(&relay.ws_url).await;
    controller.join(&session_id, Role::Controller).await;
    let _ = controller.next_control().await;

    // First operator join establishes the recorded key, then leaves.
    let mut first_operator = TestClient::connect(&relay.ws_url).await;
    first_operator.join(&session_id, Role::Operator).await;
    let joined = first_operator.next_control().await;
    let ControlFrame::SessionJoined { peer_public_key: Some(controller_key) } = joined else {
        panic!("expected session_joined with controller key");
    };
    first_operator.bind_peer(&controller_key);
    let _peer_connected = controller.next_control().await;
    let _empty_queue_status = first_operator.next_control().await;

    first_operator.send_control(ControlFrame::Leave).await;
    let _peer_disconnected = controller.next_control().await;

    // Controller queues two envelopes while no operator is joined, sealed
    // to the second operator's (not-yet-joined) key.
    let mut second_operator = TestClient::connect(&relay.ws_url).await;
    let second_operator_key = second_operator.public_key();
    assert_ne!(second_operator_key, first_operator.public_key());
    controller.bind_peer(&second_operator_key);

    for i in 0..2u32 {
        controller
            .send_payload(
                &session_id,
                Role::Controller,
                &Payload::TerminalOutput {
                    stream: "stdout".to_string(),
                    data: format!("queued {i}\n"),
                    sequence: i,
                },
            )
            .await;
    }

    // Second operator joins with a different public key than the one
    // recorded from the first join.
    second_operator.join(&session_id, Role::Operator).await;
    let joined = second_operator.next_control().await;
    assert!(matches!(joined, ControlFrame::SessionJoined { .. }));

    let status = second_operator.next_control().await;
    let ControlFrame::QueueStatusReply { queued_messages, .. } = status else {
        panic!("expected queue_status after rotation");
    };
    assert_eq!(queued_messages, 0, "rotated operator key must purge the queue before replay");
}
