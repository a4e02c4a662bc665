use anyhow::{anyhow, bail, Result};
use futures::{SinkExt, StreamExt};
use kafka_protocol::messages::RequestHeader;
use kafka_protocol::protocol::{Decodable, Encodable, HeaderVersion, Request, StrBytes};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::kafka::codec::{decode_response, encode_request, frame_codec};

/// One TCP connection to one broker. Requests are strictly sequential: each
/// `send` writes a frame and waits for its response before returning.
#[derive(Debug)]
pub struct KafkaClient {
    addr: String,
    client_id: StrBytes,
    correlation_id: i32,
    stream: Framed<TcpStream, LengthDelimitedCodec>,
}

impl KafkaClient {
    pub async fn connect(addr: &str, client_id: StrBytes) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| anyhow!("could not connect to {}: {}", addr, e))?;
        tracing::debug!(%addr, "connected to broker");
        Ok(KafkaClient {
            addr: addr.to_string(),
            client_id,
            correlation_id: 0,
            stream: Framed::new(stream, frame_codec()),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    #[tracing::instrument(skip(self, request), fields(addr = %self.addr, api_key = R::KEY))]
    pub async fn send<R>(&mut self, request: &R, version: i16) -> Result<R::Response>
    where
        R: Request + Encodable + HeaderVersion,
        R::Response: Decodable + HeaderVersion,
    {
        self.correlation_id = self.correlation_id.wrapping_add(1);
        let mut header = RequestHeader::default();
        header.request_api_key = R::KEY;
        header.request_api_version = version;
        header.correlation_id = self.correlation_id;
        header.client_id = Some(self.client_id.clone());

        tracing::trace!(correlation_id = header.correlation_id, "send client request");
        let bytes = encode_request(&header, request)?;
        self.stream.send(bytes).await?;

        let mut frame = match self.stream.next().await {
            Some(frame) => frame?,
            None => bail!("connection to {} closed", self.addr),
        };
        let (response_header, response) = decode_response::<R>(&mut frame, version)?;
        if response_header.correlation_id != header.correlation_id {
            bail!(
                "expected correlation id {} from {}, got {}",
                header.correlation_id,
                self.addr,
                response_header.correlation_id
            );
        }
        tracing::trace!(correlation_id = header.correlation_id, "receive client response");
        Ok(response)
    }
}
