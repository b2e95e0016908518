use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::config;
use crate::error::Error;
use crate::reply::{self, Reply};
use crate::request::Request;

/// Frames a byte stream into replies and requests into bytes.
///
/// Decoding is restartable: when only part of a reply has arrived nothing is consumed and the
/// transport keeps accumulating bytes until the whole reply is buffered.
#[derive(Debug, Clone)]
pub struct RespCodec {
    max_reply_size: usize,
}

impl RespCodec {
    pub fn new(max_reply_size: usize) -> RespCodec {
        RespCodec { max_reply_size }
    }
}

impl Default for RespCodec {
    fn default() -> Self {
        RespCodec::new(config::max_frame_size())
    }
}

impl Decoder for RespCodec {
    type Item = Reply;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match reply::decode(&src[..])? {
            Some((reply, consumed)) => {
                trace!(consumed, "decoded {}", reply.kind());
                // Remove the decoded reply from the buffer.
                src.advance(consumed);
                Ok(Some(reply))
            }
            // Not enough data yet. Bound what a peer can make us buffer.
            None if src.len() > self.max_reply_size => Err(Error::BadProtocol(format!(
                "buffered {} bytes without a complete reply, limit is {}",
                src.len(),
                self.max_reply_size
            ))),
            None => Ok(None),
        }
    }
}

impl Encoder<Request> for RespCodec {
    type Error = Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}
