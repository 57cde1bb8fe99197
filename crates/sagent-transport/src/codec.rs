//! Wire framing shared by both transports.

use sagent_core::{Message, Result};

/// Frame delimiter on the socket transport.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Encode one message as a `\n`-terminated JSON line.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>> {
    let mut frame = message.to_json()?.into_bytes();
    frame.push(FRAME_DELIMITER);
    Ok(frame)
}

/// Decode one payload. A message without a sender is attributed to
/// `remote`, the address it arrived from.
pub fn decode_frame(payload: &[u8], remote: &str) -> Result<Message> {
    let message = Message::from_json(payload)?;
    if message.sender().is_some() {
        Ok(message)
    } else {
        Ok(message.with_sender(remote))
    }
}

/// Whether a raw line carries anything besides whitespace.
pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
