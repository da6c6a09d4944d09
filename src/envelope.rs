//! The on-disk queue file format.
//!
//! Each accepted mail is a single file: a length-prefixed envelope header
//! (sender, then recipients), a `\n` separator, and the raw message data.
//! All integers are little-endian so queue files are portable across hosts:
//!
//! ```text
//! u16  from_len
//! u8   from[from_len]
//! u32  to_count
//! repeat to_count times:
//!     u16 to_len
//!     u8  to[to_len]
//! u8   0x0A
//! u8   data[..]
//! ```

use thiserror::Error;

/// Separator between the envelope header and the message data.
const SEPARATOR: u8 = b'\n';

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Queue file is truncated")]
    Truncated,

    #[error("Missing separator after the recipient list")]
    MissingSeparator,

    #[error("Sender address exceeds the 65535 byte field limit")]
    SenderTooLong,

    #[error("Recipient address exceeds the 65535 byte field limit")]
    RecipientTooLong,

    #[error("Address is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// The `{from, to, data}` triple durably recorded per accepted mail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
    pub data: Vec<u8>,
}

impl Envelope {
    /// Serializes the envelope header (everything before the message data),
    /// including the trailing separator byte.
    pub fn encode_header(from: &str, to: &[String]) -> Result<Vec<u8>, EnvelopeError> {
        let from_len =
            u16::try_from(from.len()).map_err(|_| EnvelopeError::SenderTooLong)?;
        let to_count = u32::try_from(to.len()).map_err(|_| EnvelopeError::RecipientTooLong)?;

        let mut buf = Vec::with_capacity(from.len() + to.iter().map(String::len).sum::<usize>() + 16);
        buf.extend_from_slice(&from_len.to_le_bytes());
        buf.extend_from_slice(from.as_bytes());
        buf.extend_from_slice(&to_count.to_le_bytes());
        for rcpt in to {
            let len = u16::try_from(rcpt.len()).map_err(|_| EnvelopeError::RecipientTooLong)?;
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(rcpt.as_bytes());
        }
        buf.push(SEPARATOR);

        Ok(buf)
    }

    /// Serializes the complete queue file contents.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut buf = Self::encode_header(&self.from, &self.to)?;
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    /// Parses a complete queue file.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let from_len = cursor.read_u16()? as usize;
        let from = String::from_utf8(cursor.read_bytes(from_len)?.to_vec())?;

        let to_count = cursor.read_u32()?;
        let mut to = Vec::with_capacity(to_count.min(1024) as usize);
        for _ in 0..to_count {
            let len = cursor.read_u16()? as usize;
            to.push(String::from_utf8(cursor.read_bytes(len)?.to_vec())?);
        }

        if cursor.read_bytes(1)? != [SEPARATOR] {
            return Err(EnvelopeError::MissingSeparator);
        }

        Ok(Self {
            from,
            to,
            data: cursor.rest().to_vec(),
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], EnvelopeError> {
        let end = self.pos.checked_add(len).ok_or(EnvelopeError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(EnvelopeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, EnvelopeError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, EnvelopeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let envelope = Envelope {
            from: "a@b.co".to_string(),
            to: vec!["c@d.co".to_string(), "e@f.co".to_string()],
            data: b"Subject: hi\r\n\r\nhello\r\n".to_vec(),
        };

        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn round_trips_empty_data() {
        let envelope = Envelope {
            from: "a@b.co".to_string(),
            to: vec!["c@d.co".to_string()],
            data: Vec::new(),
        };

        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn encodes_the_documented_layout() {
        let envelope = Envelope {
            from: "ab".to_string(),
            to: vec!["cd".to_string()],
            data: b"hi".to_vec(),
        };

        assert_eq!(
            envelope.encode().unwrap(),
            [
                2, 0, // from_len, little-endian
                b'a', b'b',
                1, 0, 0, 0, // to_count, little-endian
                2, 0, // to_len
                b'c', b'd',
                b'\n',
                b'h', b'i',
            ]
        );
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = Envelope {
            from: "a@b.co".to_string(),
            to: vec!["c@d.co".to_string()],
            data: b"body".to_vec(),
        }
        .encode()
        .unwrap();

        for end in 0..13 {
            assert!(
                matches!(
                    Envelope::decode(&bytes[..end]),
                    Err(EnvelopeError::Truncated)
                ),
                "prefix of {end} bytes should be truncated"
            );
        }
    }

    #[test]
    fn rejects_missing_separator() {
        // from_len = 0, to_count = 0, then a byte that is not '\n'.
        let bytes = [0, 0, 0, 0, 0, 0, b'x'];
        assert!(matches!(
            Envelope::decode(&bytes),
            Err(EnvelopeError::MissingSeparator)
        ));
    }

    #[test]
    fn data_may_contain_the_separator_byte() {
        let envelope = Envelope {
            from: "a@b.co".to_string(),
            to: vec!["c@d.co".to_string()],
            data: b"\n\nline\n".to_vec(),
        };

        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded.data, b"\n\nline\n");
    }
}
