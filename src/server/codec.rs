use bytes::BufMut;
use bytes::BytesMut;
use prost::Message;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;

use crate::proto::journal_engine::*;
use crate::Error;
use crate::NetworkError;
use crate::Result;

/// `req_type` byte of a request frame
pub const REQUEST_FRAME: u8 = 1;
/// `req_type` byte of a response frame
pub const RESPONSE_FRAME: u8 = 2;

/// `data_len(4) | req_type(1) | header_len(4)`; `body_len(4)` follows the
/// header.
const PREFIX_LEN: usize = 9;
const BODY_LEN_FIELD: usize = 4;

macro_rules! journal_packets {
    ($( $api:ident => $req:ident($req_body:ident), $resp:ident($resp_body:ident); )*) => {
        /// One frame of the journal engine protocol.
        #[derive(Debug, Clone, PartialEq)]
        pub enum JournalEnginePacket {
            $( $req($req), $resp($resp), )*
            /// Request whose api key this node does not serve; the body is
            /// dropped undecoded
            UnsupportedReq(ReqHeader),
            /// Complete request frame whose header or body failed to decode,
            /// with the decode failure; the frame itself was consumed
            MalformedReq(ReqHeader, String),
            /// Header-only response answering an unsupported request
            ErrorResp(RespHeader),
        }

        impl JournalEnginePacket {
            pub fn name(&self) -> &'static str {
                match self {
                    $(
                        Self::$req(_) => stringify!($req),
                        Self::$resp(_) => stringify!($resp),
                    )*
                    Self::UnsupportedReq(_) => "UnsupportedReq",
                    Self::MalformedReq(..) => "MalformedReq",
                    Self::ErrorResp(_) => "ErrorResp",
                }
            }

            fn into_parts(self) -> (u8, Vec<u8>, Vec<u8>) {
                match self {
                    $(
                        Self::$req(packet) => (
                            REQUEST_FRAME,
                            packet.header.unwrap_or_default().encode_to_vec(),
                            packet.body.unwrap_or_default().encode_to_vec(),
                        ),
                        Self::$resp(packet) => (
                            RESPONSE_FRAME,
                            packet.header.unwrap_or_default().encode_to_vec(),
                            packet.body.unwrap_or_default().encode_to_vec(),
                        ),
                    )*
                    Self::UnsupportedReq(header) | Self::MalformedReq(header, _) => {
                        (REQUEST_FRAME, header.encode_to_vec(), Vec::new())
                    }
                    Self::ErrorResp(header) => (RESPONSE_FRAME, header.encode_to_vec(), Vec::new()),
                }
            }

            fn decode_request(
                header: ReqHeader,
                body: &[u8],
            ) -> Self {
                match ApiKey::try_from(header.api_key) {
                    $(
                        Ok(ApiKey::$api) => match $req_body::decode(body) {
                            Ok(body) => Self::$req($req {
                                header: Some(header),
                                body: Some(body),
                            }),
                            Err(e) => Self::MalformedReq(header, format!("body: {}", e)),
                        },
                    )*
                    _ => Self::UnsupportedReq(header),
                }
            }

            fn decode_response(
                header: RespHeader,
                body: &[u8],
            ) -> Result<Self> {
                match ApiKey::try_from(header.api_key) {
                    $(
                        Ok(ApiKey::$api) => Ok(Self::$resp($resp {
                            header: Some(header),
                            body: Some($resp_body::decode(body)?),
                        })),
                    )*
                    _ => Ok(Self::ErrorResp(header)),
                }
            }
        }
    };
}

journal_packets! {
    Read => ReadReq(ReadReqBody), ReadResp(ReadRespBody);
    Write => WriteReq(WriteReqBody), WriteResp(WriteRespBody);
    CreateShard => CreateShardReq(CreateShardReqBody), CreateShardResp(CreateShardRespBody);
    DeleteShard => DeleteShardReq(DeleteShardReqBody), DeleteShardResp(DeleteShardRespBody);
    GetShardMetadata => GetShardMetadataReq(GetShardMetadataReqBody), GetShardMetadataResp(GetShardMetadataRespBody);
    GetClusterMetadata => GetClusterMetadataReq(GetClusterMetadataReqBody), GetClusterMetadataResp(GetClusterMetadataRespBody);
    FetchOffset => FetchOffsetReq(FetchOffsetReqBody), FetchOffsetResp(FetchOffsetRespBody);
    ListShard => ListShardReq(ListShardReqBody), ListShardResp(ListShardRespBody);
    OffsetCommit => OffsetCommitReq(OffsetCommitReqBody), OffsetCommitResp(OffsetCommitRespBody);
}

/// Frames [`JournalEnginePacket`]s as
/// `data_len u32 | req_type u8 | header_len u32 | header | body_len u32 | body`
/// with `data_len = header_len + body_len`, all integers big endian.
#[derive(Debug, Clone)]
pub struct JournalServerCodec {
    max_frame_size: usize,
}

impl JournalServerCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Encoder<JournalEnginePacket> for JournalServerCodec {
    type Error = Error;

    fn encode(
        &mut self,
        packet: JournalEnginePacket,
        dst: &mut BytesMut,
    ) -> Result<()> {
        let (req_type, header, body) = packet.into_parts();
        let data_len = header.len() + body.len();
        if data_len > self.max_frame_size {
            return Err(NetworkError::PayloadSizeLimitExceeded(data_len).into());
        }

        dst.reserve(PREFIX_LEN + BODY_LEN_FIELD + data_len);
        dst.put_u32(data_len as u32);
        dst.put_u8(req_type);
        dst.put_u32(header.len() as u32);
        dst.put_slice(&header);
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

impl Decoder for JournalServerCodec {
    type Item = JournalEnginePacket;
    type Error = Error;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<JournalEnginePacket>> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let data_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if data_len > self.max_frame_size {
            return Err(NetworkError::PayloadSizeLimitExceeded(data_len).into());
        }
        let req_type = src[4];
        if req_type != REQUEST_FRAME && req_type != RESPONSE_FRAME {
            return Err(NetworkError::MalformedFrame(format!("unknown req_type {}", req_type)).into());
        }
        let header_len = u32::from_be_bytes([src[5], src[6], src[7], src[8]]) as usize;
        if header_len > data_len {
            return Err(NetworkError::MalformedFrame(format!(
                "header_len {} exceeds data_len {}",
                header_len, data_len
            ))
            .into());
        }

        let frame_len = PREFIX_LEN + BODY_LEN_FIELD + data_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let body_len_at = PREFIX_LEN + header_len;
        let body_len = u32::from_be_bytes([
            src[body_len_at],
            src[body_len_at + 1],
            src[body_len_at + 2],
            src[body_len_at + 3],
        ]) as usize;
        if header_len + body_len != data_len {
            return Err(NetworkError::MalformedFrame(format!(
                "header_len {} + body_len {} != data_len {}",
                header_len, body_len, data_len
            ))
            .into());
        }

        let frame = src.split_to(frame_len).freeze();
        let header = &frame[PREFIX_LEN..body_len_at];
        let body = &frame[body_len_at + BODY_LEN_FIELD..];

        // A bad request frame is answered in-band, the stream stays in sync
        let packet = if req_type == REQUEST_FRAME {
            match ReqHeader::decode(header) {
                Ok(header) => JournalEnginePacket::decode_request(header, body),
                Err(e) => JournalEnginePacket::MalformedReq(ReqHeader::default(), format!("header: {}", e)),
            }
        } else {
            JournalEnginePacket::decode_response(RespHeader::decode(header)?, body)?
        };
        Ok(Some(packet))
    }
}

impl JournalEnginePacket {
    /// Request header, `None` for response packets.
    pub fn req_header(&self) -> Option<&ReqHeader> {
        match self {
            Self::ReadReq(p) => p.header.as_ref(),
            Self::WriteReq(p) => p.header.as_ref(),
            Self::CreateShardReq(p) => p.header.as_ref(),
            Self::DeleteShardReq(p) => p.header.as_ref(),
            Self::GetShardMetadataReq(p) => p.header.as_ref(),
            Self::GetClusterMetadataReq(p) => p.header.as_ref(),
            Self::FetchOffsetReq(p) => p.header.as_ref(),
            Self::ListShardReq(p) => p.header.as_ref(),
            Self::OffsetCommitReq(p) => p.header.as_ref(),
            Self::UnsupportedReq(header) | Self::MalformedReq(header, _) => Some(header),
            _ => None,
        }
    }
}
