//! Driver <-> band worker protocol.
//!
//! Each worker reads exactly one [`BandRequest`] from stdin and answers with
//! exactly one [`BandReply`] on stdout. Messages are rkyv archives wrapped in
//! length-prefixed frames:
//!
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | rkyv payload     |
//! +----------------+------------------+
//! ```

use std::io::{Read, Write};

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use thiserror::Error;

pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame (256 MB); a hard-preset band is far below this.
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("End of stream")]
    EndOfStream,
}

// ------------------------- Messages -------------------------

/// Work order for one band. The viewport travels by value.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[archive(check_bytes)]
pub struct BandRequest {
    pub protocol_version: u32,
    pub band_index: u32,
    pub row_start: u32,
    pub row_end: u32,
    pub re_min: f64,
    pub re_max: f64,
    pub im_min: f64,
    pub im_max: f64,
    pub width: u32,
    pub height: u32,
    pub max_iter: u32,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[archive(check_bytes)]
pub enum BandReply {
    /// Dense row block, `(row_end - row_start) * width` cells.
    Rows { band_index: u32, rows: Vec<u32> },
    Failure { band_index: u32, message: String },
}

// ------------------------- Framing -------------------------

/// Sends `message` as one frame. Prefix and payload go out in a single write
/// so a reply is never split across two pipe writes.
pub fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let payload =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialization(e.to_string()))?;
    let len = payload.len();
    let prefix = u32::try_from(len)
        .ok()
        .filter(|_| len <= MAX_FRAME_SIZE)
        .ok_or(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        })?;

    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&prefix.to_le_bytes());
    frame.extend_from_slice(&payload);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads the 4-byte prefix. A stream that ends before its first byte is a
/// clean [`FrameError::EndOfStream`]; one that ends inside it is not.
fn read_prefix<R: Read>(reader: &mut R) -> Result<usize, FrameError> {
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Err(FrameError::EndOfStream),
            Ok(0) => {
                return Err(FrameError::InvalidFrame(format!(
                    "length prefix cut off after {filled} byte(s)"
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    Ok(u32::from_le_bytes(prefix) as usize)
}

pub fn read_frame<R, T>(reader: &mut R) -> Result<T, FrameError>
where
    R: Read,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let len = read_prefix(reader)?;
    if len == 0 {
        return Err(FrameError::InvalidFrame("zero-length frame".to_string()));
    }
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    // Archived roots must sit in an aligned buffer.
    let mut payload = rkyv::AlignedVec::with_capacity(len);
    payload.resize(len, 0);
    reader.read_exact(&mut payload)?;

    rkyv::check_archived_root::<T>(&payload)
        .map_err(|e| FrameError::Deserialization(e.to_string()))?
        .deserialize(&mut Infallible)
        .map_err(|e| FrameError::Deserialization(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn request() -> BandRequest {
        BandRequest {
            protocol_version: PROTOCOL_VERSION,
            band_index: 2,
            row_start: 10,
            row_end: 15,
            re_min: -2.0,
            re_max: 1.0,
            im_min: -1.0,
            im_max: 1.0,
            width: 64,
            height: 64,
            max_iter: 50,
        }
    }

    #[test]
    fn test_request_then_reply_on_one_stream() {
        let reply = BandReply::Rows {
            band_index: 2,
            rows: (0..320).collect(),
        };

        let mut buffer = Vec::new();
        write_frame(&mut buffer, &request()).unwrap();
        write_frame(&mut buffer, &reply).unwrap();

        let mut reader = Cursor::new(buffer);
        let decoded_request: BandRequest = read_frame(&mut reader).unwrap();
        let decoded_reply: BandReply = read_frame(&mut reader).unwrap();
        assert_eq!(decoded_request, request());
        assert_eq!(decoded_reply, reply);
    }

    #[test]
    fn test_end_of_stream() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let result: Result<BandReply, _> = read_frame(&mut reader);
        assert!(matches!(result, Err(FrameError::EndOfStream)));
    }

    #[test]
    fn test_zero_length_frame_rejected() {
        let mut reader = Cursor::new(vec![0u8, 0, 0, 0]);
        let result: Result<BandReply, _> = read_frame(&mut reader);
        assert!(matches!(result, Err(FrameError::InvalidFrame(_))));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut reader = Cursor::new(u32::MAX.to_le_bytes().to_vec());
        let result: Result<BandReply, _> = read_frame(&mut reader);
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_cut_off_prefix_is_not_end_of_stream() {
        let mut reader = Cursor::new(vec![7u8, 0]);
        let result: Result<BandRequest, _> = read_frame(&mut reader);
        assert!(matches!(result, Err(FrameError::InvalidFrame(_))));
    }

    #[test]
    fn test_frame_is_one_prefixed_block() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &request()).unwrap();
        let prefix = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        assert_eq!(prefix, buffer.len() - 4);
    }

    #[test]
    fn test_truncated_payload_is_io_error() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &request()).unwrap();
        buffer.truncate(buffer.len() - 3);
        let result: Result<BandRequest, _> = read_frame(&mut Cursor::new(buffer));
        assert!(matches!(result, Err(FrameError::Io(_))));
    }
}
