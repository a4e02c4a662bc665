use anyhow::{anyhow, Result};
use bytes::{Bytes, BytesMut};
use kafka_protocol::messages::{RequestHeader, ResponseHeader};
use kafka_protocol::protocol::{Decodable, Encodable, HeaderVersion, Request};
use tokio_util::codec::LengthDelimitedCodec;

/// Kafka frames are prefixed with a 4 byte big-endian length.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(i32::MAX as usize)
        .length_field_length(4)
        .new_codec()
}

/// Encodes header and body of a request into one frame payload, using the
/// version carried by the header.
pub fn encode_request<R>(header: &RequestHeader, request: &R) -> Result<Bytes>
where
    R: Request + Encodable + HeaderVersion,
{
    let version = header.request_api_version;
    let mut bytes = BytesMut::new();
    header
        .encode(&mut bytes, R::header_version(version))
        .map_err(|_| anyhow!("could not encode header for api key {}", R::KEY))?;
    request
        .encode(&mut bytes, version)
        .map_err(|_| anyhow!("could not encode api key {} v{}", R::KEY, version))?;
    Ok(bytes.freeze())
}

pub fn decode_response<R>(frame: &mut BytesMut, version: i16) -> Result<(ResponseHeader, R::Response)>
where
    R: Request,
    R::Response: Decodable + HeaderVersion,
{
    let header = ResponseHeader::decode(frame, R::Response::header_version(version))
        .map_err(|_| anyhow!("could not decode response header for api key {}", R::KEY))?;
    let response = R::Response::decode(frame, version)
        .map_err(|_| anyhow!("could not decode response for api key {} v{}", R::KEY, version))?;
    Ok((header, response))
}
