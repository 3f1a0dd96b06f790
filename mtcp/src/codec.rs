use mule_cbor as cbor;
use thiserror::Error;
use tokio_util::{
    bytes::{Buf, BytesMut},
    codec::{Decoder, Encoder},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid framing: {0}")]
    InvalidFraming(cbor::decode::Error),
}

/// One decoded MTCP frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Keepalive,
    Bundle(Vec<u8>),
}

/// Frames are CBOR byte strings; a framing error desynchronises the stream
/// and must terminate the connection.
pub struct MtcpCodec;

impl Decoder for MtcpCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        let Some((len, header_len)) =
            cbor::decode::parse_byte_string_header(src).map_err(Error::InvalidFraming)?
        else {
            return Ok(None);
        };
        let len = len as usize;

        if src.len() < header_len + len {
            src.reserve(header_len + len - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let payload = src.split_to(len);
        Ok(Some(if len == 0 {
            Frame::Keepalive
        } else {
            Frame::Bundle(payload.to_vec())
        }))
    }
}

impl Encoder<&[u8]> for MtcpCodec {
    type Error = Error;

    fn encode(&mut self, data: &[u8], dst: &mut BytesMut) -> Result<(), Error> {
        dst.extend_from_slice(&cbor::encode::byte_string_header(data.len() as u64));
        dst.extend_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let mut codec = MtcpCodec;
        let mut buf = BytesMut::new();
        codec.encode(&[1, 2, 3], &mut buf).unwrap();
        codec.encode(&[], &mut buf).unwrap();
        codec.encode(&[0xAB; 300], &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Bundle(vec![1, 2, 3]))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Keepalive));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Bundle(vec![0xAB; 300]))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn partial_frames_wait_for_more_data() {
        let mut codec = MtcpCodec;
        let mut full = BytesMut::new();
        codec.encode(&[7; 64], &mut full).unwrap();

        let mut buf = BytesMut::new();
        for chunk in full.chunks(13) {
            assert!(buf.is_empty() || codec.decode(&mut buf).unwrap().is_none());
            buf.extend_from_slice(chunk);
        }
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Bundle(vec![7; 64])));
    }

    #[test]
    fn non_byte_string_is_a_framing_error() {
        let mut codec = MtcpCodec;
        let mut buf = BytesMut::from(&[0x83u8, 1, 2, 3][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::InvalidFraming(_))
        ));
    }
}
