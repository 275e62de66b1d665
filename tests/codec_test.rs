//! Framed line codec (C1) integration tests: a multi-record stream mixing
//! valid envelopes, blank lines, and malformed records, decoded one line at
//! a time the way a transport's `read_line` loop would feed it.

use plugin_runtime::io_server::codec::{decode_line, encode_line, DecodedLine};
use plugin_runtime::io_server::model::{Envelope, InboundEvent};

fn envelope(session_id: &str) -> Envelope {
    Envelope {
        session_id: session_id.to_string(),
        event: InboundEvent::Request,
        data: serde_json::json!({"type": "tool", "action": "invoke_tool"}),
        conversation_id: None,
        message_id: None,
        app_id: None,
        endpoint_id: None,
    }
}

#[test]
fn mixed_stream_decodes_each_line_independently() {
    let lines = vec![
        encode_line(&envelope("s1")).unwrap(),
        "\n".to_string(),
        "{not json\n".to_string(),
        encode_line(&envelope("s2")).unwrap(),
    ];

    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for line in &lines {
        match decode_line(line.trim_end_matches('\n')) {
            None => {}
            Some(DecodedLine::Valid(envelope)) => valid.push(envelope),
            Some(DecodedLine::Invalid(raw)) => invalid.push(raw),
        }
    }

    assert_eq!(valid.len(), 2);
    assert_eq!(valid[0].session_id, "s1");
    assert_eq!(valid[1].session_id, "s2");
    assert_eq!(invalid, vec!["{not json".to_string()]);
}

#[test]
fn envelope_with_full_optional_context_round_trips() {
    let envelope = Envelope {
        session_id: "s1".to_string(),
        event: InboundEvent::Request,
        data: serde_json::json!({"type": "tool", "action": "invoke_tool"}),
        conversation_id: Some("conv-1".to_string()),
        message_id: Some("msg-1".to_string()),
        app_id: Some("app-1".to_string()),
        endpoint_id: Some("ep-1".to_string()),
    };

    let encoded = encode_line(&envelope).unwrap();
    let decoded = decode_line(encoded.trim_end_matches('\n')).unwrap();
    match decoded {
        DecodedLine::Valid(decoded_envelope) => assert_eq!(decoded_envelope, envelope),
        DecodedLine::Invalid(raw) => panic!("expected valid envelope, got invalid: {raw}"),
    }
}

#[test]
fn backwards_response_event_decodes_with_default_null_data() {
    let line = r#"{"session_id": "s1", "event": "backwards_response"}"#;
    match decode_line(line).unwrap() {
        DecodedLine::Valid(envelope) => {
            assert_eq!(envelope.event, InboundEvent::BackwardsResponse);
            assert!(envelope.data.is_null());
        }
        DecodedLine::Invalid(raw) => panic!("expected valid envelope, got invalid: {raw}"),
    }
}
