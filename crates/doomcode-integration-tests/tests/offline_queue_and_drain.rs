//! §8 "Offline queue and drain": three envelopes sent while no operator has
//! joined are queued, replayed in order behind a `queue_status` on join, and
//! an `ack` for the last one empties the queue.

use doomcode_integration_tests::support::TestClient;
use doomcode_integration_tests::support::TestRelay;
use doomcode_proto::model::Role;
use doomcode_proto::payload::Payload;
use doomcode_proto::ControlFrame;

#[tokio::test]
async fn three_queued_envelopes_replay_in_order_then_drain_on_ack() {
    let relay = TestRelay::start().await;
    let session_id = relay.create_session().await;

    let mut controller = TestClient::connect(&relay.ws_url).await;
    controller.join(&session_id, Role::Controller).await;
    let _ = controller.next_control().await; // session_joined

    // Connect the eventual operator now (to fix its public key) but don't
    // join the session with it yet, so the relay still treats the operator
    // slot as empty and queues these envelopes.
    let mut operator = TestClient::connect(&relay.ws_url).await;
    let operator_key = operator.public_key();
    controller.bind_peer(&operator_key);

    for i in 0..3u32 {
        controller
            .send_payload(
                &session_id,
                Role::Controller,
                &Payload::TerminalOutput {
                    stream: "stdout".to_string(),
                    data: format!("line {i}\n"),
                    sequence: i,
                },
            )
            .await;
    }

    operator.join(&session_id, Role::Operator).await;
    let joined = operator.next_control().await;
    let ControlFrame::SessionJoined { peer_public_key: Some(controller_key) } = joined else {
        panic!("operator expected session_joined with controller key");
    };
    operator.bind_peer(&controller_key);

    let _peer_connected = controller.next_control().await;

    let status = operator.next_control().await;
    let ControlFrame::QueueStatusReply { queued_messages, .. } = status else {
        panic!("expected queue_status before replay");
    };
    assert_eq!(queued_messages, 3);

    let mut last_message_id = String::new();
    for i in 0..3u32 {
        let envelope = operator.next_envelope().await;
        last_message_id = envelope.message_id.clone();
        let payload = operator.open_envelope(&envelope).expect("decrypts");
        match payload {
            Payload::TerminalOutput { data, sequence, .. } => {
                assert_eq!(sequence, i);
                assert_eq!(data, format!("line {i}\n"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    operator
        .send_control(ControlFrame::Ack {
            session_id: session_id.clone(),
            last_message_id,
        })
        .await;

    // Give the relay a moment to process the ack, then confirm the queue is
    // empty via a fresh queue_status request.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    operator
        .send_control(ControlFrame::QueueStatus {
            session_id: session_id.clone(),
        })
        .await;
    let status = operator.next_control().await;
    assert!(matches!(
        status,
        ControlFrame::QueueStatusReply { queued_messages: 0, .. }
    ));
}
