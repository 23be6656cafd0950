use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::LengthDelimitedCodec;

use crate::NetworkConfig;
use crate::Result;
use crate::SerializationError;

/// `u32 BE length | bincode payload`, bounded by `max_raft_frame_size`
pub fn raft_frame_codec(config: &NetworkConfig) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(config.max_raft_frame_size)
        .new_codec()
}

pub fn encode_message<T: Serialize>(message: &T) -> Result<Bytes> {
    let bytes = bincode::serialize(message).map_err(SerializationError::Bincode)?;
    Ok(Bytes::from(bytes))
}

pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes).map_err(SerializationError::Bincode)?)
}
