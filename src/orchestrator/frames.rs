//! Client-facing byte frames.
//!
//! The orchestrator relays gateway events to the client in their native
//! encoding, framed as SSE `data:` lines, so the HTTP layer can pass the
//! bytes through without re-framing.

use crate::types::GatewayEvent;

/// Encode one gateway event as an SSE frame.
pub fn encode_frame(event: &GatewayEvent) -> Vec<u8> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(_) => "{}".to_string(),
    };
    format!("data: {json}\n\n").into_bytes()
}

/// Encode a clearly labeled terminal error frame.
pub fn error_frame(message: &str) -> Vec<u8> {
    encode_frame(&GatewayEvent::Error {
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_sse_data_line() {
        let bytes = encode_frame(&GatewayEvent::TextDelta { text: "hi".into() });
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("\"text_delta\""));
    }

    #[test]
    fn error_frame_is_labeled() {
        let text = String::from_utf8(error_frame("boom")).unwrap();
        assert!(text.contains("\"error\""));
        assert!(text.contains("boom"));
    }
}
