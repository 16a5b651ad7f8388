//! Wire protocol shared between the game server and its clients.
//!
//! Every message starts with a one-byte opcode. Multi-byte integers travel
//! as little-endian `i32`. Channel names in a CONNECT frame are fixed-width
//! zero-padded fields so the frame can be parsed without a length prefix.

use thiserror::Error;

/// Opcode of a connection request and its acknowledgement.
pub const OP_CONNECT: u8 = 1;
/// Opcode of a disconnect request and its acknowledgement.
pub const OP_DISCONNECT: u8 = 2;
/// Opcode of a manual play command.
pub const OP_PLAY: u8 = 3;
/// Opcode of a full board snapshot.
pub const OP_BOARD: u8 = 4;

/// Fixed width of one channel-name field in a CONNECT frame. Names are
/// zero-padded and must leave room for at least one padding byte.
pub const CHANNEL_NAME_LEN: usize = 40;
/// Total size of a CONNECT frame: opcode plus two channel names.
pub const CONNECT_FRAME_LEN: usize = 1 + 2 * CHANNEL_NAME_LEN;
/// Size of a BOARD frame up to the cell grid: opcode plus six `i32` fields.
pub const BOARD_HEADER_LEN: usize = 1 + 6 * 4;
/// Upper bound on any serialized frame. Board sizes beyond this bound are
/// not negotiated; level files must fit within it.
pub const MAX_FRAME_LEN: usize = 8192;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("channel name {0:?} exceeds the fixed field width")]
    NameTooLong(String),
    #[error("channel name is not valid UTF-8")]
    InvalidName,
    #[error("frame of {0} bytes exceeds the frame size bound")]
    Oversize(usize),
    #[error("cell payload of {actual} bytes does not match a {width}x{height} board")]
    CellCountMismatch {
        width: i32,
        height: i32,
        actual: usize,
    },
}

/// A client's request for a new session, naming the two channels the server
/// should dial back on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Channel the server reads commands from.
    pub request_channel: String,
    /// Channel the server writes acknowledgements and snapshots to.
    pub notify_channel: String,
}

impl ConnectRequest {
    pub fn encode(&self) -> Result<[u8; CONNECT_FRAME_LEN], ProtocolError> {
        let mut frame = [0u8; CONNECT_FRAME_LEN];
        frame[0] = OP_CONNECT;
        write_name(&mut frame[1..1 + CHANNEL_NAME_LEN], &self.request_channel)?;
        write_name(&mut frame[1 + CHANNEL_NAME_LEN..], &self.notify_channel)?;
        Ok(frame)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() < CONNECT_FRAME_LEN {
            return Err(ProtocolError::Truncated {
                expected: CONNECT_FRAME_LEN,
                actual: frame.len(),
            });
        }
        if frame[0] != OP_CONNECT {
            return Err(ProtocolError::UnknownOpcode(frame[0]));
        }
        Ok(Self {
            request_channel: read_name(&frame[1..1 + CHANNEL_NAME_LEN])?,
            notify_channel: read_name(&frame[1 + CHANNEL_NAME_LEN..CONNECT_FRAME_LEN])?,
        })
    }
}

fn write_name(field: &mut [u8], name: &str) -> Result<(), ProtocolError> {
    let bytes = name.as_bytes();
    if bytes.len() >= CHANNEL_NAME_LEN {
        return Err(ProtocolError::NameTooLong(name.to_owned()));
    }
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn read_name(field: &[u8]) -> Result<String, ProtocolError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidName)
}

/// Full state snapshot sent to a client: dimensions, tick tempo, progression
/// flags, score, and the display-mapped cell grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub width: i32,
    pub height: i32,
    pub tempo: i32,
    pub victory: bool,
    pub game_over: bool,
    pub score: i32,
    pub cells: Vec<u8>,
}

impl BoardSnapshot {
    /// Serialized size of a BOARD frame for the given dimensions.
    pub fn frame_len(width: i32, height: i32) -> usize {
        BOARD_HEADER_LEN + (width.max(0) as usize) * (height.max(0) as usize)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let expected = (self.width.max(0) as usize) * (self.height.max(0) as usize);
        if self.cells.len() != expected {
            return Err(ProtocolError::CellCountMismatch {
                width: self.width,
                height: self.height,
                actual: self.cells.len(),
            });
        }
        let total = BOARD_HEADER_LEN + expected;
        if total > MAX_FRAME_LEN {
            return Err(ProtocolError::Oversize(total));
        }
        let mut frame = Vec::with_capacity(total);
        frame.push(OP_BOARD);
        for value in [
            self.width,
            self.height,
            self.tempo,
            self.victory as i32,
            self.game_over as i32,
            self.score,
        ] {
            frame.extend_from_slice(&value.to_le_bytes());
        }
        frame.extend_from_slice(&self.cells);
        Ok(frame)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() < BOARD_HEADER_LEN {
            return Err(ProtocolError::Truncated {
                expected: BOARD_HEADER_LEN,
                actual: frame.len(),
            });
        }
        if frame[0] != OP_BOARD {
            return Err(ProtocolError::UnknownOpcode(frame[0]));
        }
        let width = read_i32_le(frame, 1);
        let height = read_i32_le(frame, 5);
        if width < 0 || height < 0 {
            return Err(ProtocolError::CellCountMismatch {
                width,
                height,
                actual: frame.len() - BOARD_HEADER_LEN,
            });
        }
        let expected = Self::frame_len(width, height);
        if frame.len() < expected {
            return Err(ProtocolError::Truncated {
                expected,
                actual: frame.len(),
            });
        }
        Ok(Self {
            width,
            height,
            tempo: read_i32_le(frame, 9),
            victory: read_i32_le(frame, 13) != 0,
            game_over: read_i32_le(frame, 17) != 0,
            score: read_i32_le(frame, 21),
            cells: frame[BOARD_HEADER_LEN..expected].to_vec(),
        })
    }
}

/// Reads a little-endian `i32` at `offset`; the caller has already checked
/// the frame is long enough.
pub fn read_i32_le(frame: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

pub fn encode_play(command: u8) -> [u8; 2] {
    [OP_PLAY, command]
}

pub fn encode_disconnect() -> [u8; 1] {
    [OP_DISCONNECT]
}

pub fn encode_ack(opcode: u8, status: u8) -> [u8; 2] {
    [opcode, status]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_roundtrip() {
        let request = ConnectRequest {
            request_channel: "/tmp/maze_req_42".to_string(),
            notify_channel: "/tmp/maze_notify_42".to_string(),
        };

        let frame = request.encode().unwrap();
        assert_eq!(frame.len(), CONNECT_FRAME_LEN);
        assert_eq!(frame[0], OP_CONNECT);

        let decoded = ConnectRequest::decode(&frame).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_connect_request_name_too_long() {
        let request = ConnectRequest {
            request_channel: "x".repeat(CHANNEL_NAME_LEN),
            notify_channel: "/tmp/notify".to_string(),
        };

        assert!(matches!(
            request.encode(),
            Err(ProtocolError::NameTooLong(_))
        ));
    }

    #[test]
    fn test_connect_request_truncated() {
        let frame = [OP_CONNECT; 10];
        assert!(matches!(
            ConnectRequest::decode(&frame),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_connect_request_wrong_opcode() {
        let frame = [OP_BOARD; CONNECT_FRAME_LEN];
        assert!(matches!(
            ConnectRequest::decode(&frame),
            Err(ProtocolError::UnknownOpcode(op)) if op == OP_BOARD
        ));
    }

    #[test]
    fn test_board_snapshot_roundtrip() {
        let snapshot = BoardSnapshot {
            width: 7,
            height: 5,
            tempo: 500,
            victory: false,
            game_over: true,
            score: 42,
            cells: vec![b'#'; 35],
        };

        let frame = snapshot.encode().unwrap();
        let decoded = BoardSnapshot::decode(&frame).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_board_frame_length_matches_dimensions() {
        for (width, height) in [(1, 1), (7, 5), (40, 25), (80, 40)] {
            let snapshot = BoardSnapshot {
                width,
                height,
                tempo: 250,
                victory: false,
                game_over: false,
                score: 0,
                cells: vec![b' '; (width * height) as usize],
            };

            let frame = snapshot.encode().unwrap();
            assert_eq!(frame.len(), 1 + 6 * 4 + (width * height) as usize);
            assert_eq!(frame.len(), BoardSnapshot::frame_len(width, height));
        }
    }

    #[test]
    fn test_board_snapshot_rejects_mismatched_cells() {
        let snapshot = BoardSnapshot {
            width: 4,
            height: 4,
            tempo: 100,
            victory: false,
            game_over: false,
            score: 0,
            cells: vec![b' '; 15],
        };

        assert!(matches!(
            snapshot.encode(),
            Err(ProtocolError::CellCountMismatch { .. })
        ));
    }

    #[test]
    fn test_board_snapshot_rejects_oversize() {
        let snapshot = BoardSnapshot {
            width: 100,
            height: 100,
            tempo: 100,
            victory: false,
            game_over: false,
            score: 0,
            cells: vec![b' '; 10_000],
        };

        assert!(matches!(snapshot.encode(), Err(ProtocolError::Oversize(_))));
    }

    #[test]
    fn test_board_snapshot_truncated_cells() {
        let snapshot = BoardSnapshot {
            width: 5,
            height: 5,
            tempo: 100,
            victory: true,
            game_over: false,
            score: 3,
            cells: vec![b'.'; 25],
        };

        let mut frame = snapshot.encode().unwrap();
        frame.truncate(frame.len() - 1);
        assert!(matches!(
            BoardSnapshot::decode(&frame),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_command_frames() {
        assert_eq!(encode_play(b'w'), [OP_PLAY, b'w']);
        assert_eq!(encode_disconnect(), [OP_DISCONNECT]);
        assert_eq!(encode_ack(OP_CONNECT, 0), [OP_CONNECT, 0]);
        assert_eq!(encode_ack(OP_DISCONNECT, 0), [OP_DISCONNECT, 0]);
    }
}
