use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on a single record; a buffer growing past this without a
/// delimiter is a framing error, not a slow client.
pub const MAX_RECORD_LEN: usize = 1024 * 1024;

/// Newline-delimited record framing.
///
/// Decodes one record per `\n` (a trailing `\r` is tolerated); encodes a
/// payload by appending the delimiter. The codec is stateless, so the
/// dispatcher can run it directly against each connection's accumulation
/// buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordCodec;

impl Decoder for RecordCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        match src.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let mut line = src.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                Ok(Some(line.freeze()))
            }
            None if src.len() > MAX_RECORD_LEN => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "record exceeds maximum length",
            )),
            None => Ok(None),
        }
    }
}

impl Encoder<Bytes> for RecordCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(item.remaining() + 1);
        dst.put(item);
        dst.put_u8(b'\n');
        Ok(())
    }
}
