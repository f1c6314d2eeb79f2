use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque reference to a tile on the shared grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct TileRef {
    pub x: u32,
    pub y: u32,
}

impl TileRef {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Calls issued by the authoritative node and executed by every participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReplicatedCall {
    /// A unit factory at `tile` finished a production cycle.
    UnitFactorySpawn { tile: TileRef },
}

/// Entity bookkeeping the authoritative node mirrors to observers. Kept out of
/// [`ReplicatedCall`]: these are not calls and carry no effects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EntitySync {
    /// A unit credited to the factory at `spawner` left the world.
    UnitRemoved { spawner: TileRef },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FramePayload {
    Call(ReplicatedCall),
    Sync(EntitySync),
}

impl From<ReplicatedCall> for FramePayload {
    fn from(call: ReplicatedCall) -> Self {
        FramePayload::Call(call)
    }
}

impl From<EntitySync> for FramePayload {
    fn from(sync: EntitySync) -> Self {
        FramePayload::Sync(sync)
    }
}

/// Envelope carrying a payload together with its issue order on the source node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallFrame {
    pub sequence: u64,
    pub tick: u64,
    pub payload: FramePayload,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty replication frame")]
    Empty,
    #[error("malformed replication frame: {0}")]
    Codec(#[from] bincode::Error),
}

pub fn encode_frame(frame: &CallFrame) -> bincode::Result<Vec<u8>> {
    bincode::serialize(frame)
}

pub fn decode_frame(bytes: &[u8]) -> Result<CallFrame, FrameError> {
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }
    Ok(bincode::deserialize(bytes)?)
}

pub fn encode_frame_json(frame: &CallFrame) -> serde_json::Result<String> {
    serde_json::to_string(frame)
}

pub fn decode_frame_json(data: &str) -> serde_json::Result<CallFrame> {
    serde_json::from_str(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_frame(sequence: u64) -> CallFrame {
        CallFrame {
            sequence,
            tick: 40,
            payload: ReplicatedCall::UnitFactorySpawn {
                tile: TileRef::new(12, 7),
            }
            .into(),
        }
    }

    #[test]
    fn binary_frame_decodes_to_the_same_call() {
        let frame = spawn_frame(3);
        let bytes = encode_frame(&frame).expect("encode");
        assert_eq!(decode_frame(&bytes).expect("decode"), frame);
    }

    #[test]
    fn empty_frame_is_rejected() {
        assert!(matches!(decode_frame(&[]), Err(FrameError::Empty)));
    }

    #[test]
    fn truncated_frame_is_a_codec_error() {
        let bytes = encode_frame(&spawn_frame(9)).expect("encode");
        let err = decode_frame(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, FrameError::Codec(_)));
    }

    #[test]
    fn json_form_names_the_call() {
        let json = encode_frame_json(&spawn_frame(1)).expect("encode json");
        assert!(json.contains("UnitFactorySpawn"));
        assert_eq!(decode_frame_json(&json).expect("decode json"), spawn_frame(1));
    }

    #[test]
    fn removal_sync_is_not_a_call() {
        let frame = CallFrame {
            sequence: 2,
            tick: 41,
            payload: EntitySync::UnitRemoved {
                spawner: TileRef::new(12, 7),
            }
            .into(),
        };
        let bytes = encode_frame(&frame).expect("encode");
        let decoded = decode_frame(&bytes).expect("decode");
        assert!(matches!(
            decoded.payload,
            FramePayload::Sync(EntitySync::UnitRemoved { spawner }) if spawner == TileRef::new(12, 7)
        ));
    }
}
