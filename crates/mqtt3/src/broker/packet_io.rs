//! Framed packet I/O over a non-blocking stream.
//!
//! Reads accumulate into a per-connection buffer until a whole frame
//! (fixed header plus Remaining Length) is available; partial packets stay
//! buffered across calls. Writes go through a reused scratch buffer.

use crate::packet::{try_read_frame, Packet};
use crate::{MqttError, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads one packet, returning it together with its size on the wire.
/// A frame announcing more than `max_packet_size` bytes of body fails with
/// `PacketTooLarge` before any of the body is awaited.
pub async fn read_packet<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    max_packet_size: usize,
) -> Result<(Packet, usize)>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some((packet, consumed)) = try_read_frame(buf, max_packet_size)? {
            return Ok((packet, consumed));
        }
        let read = stream.read_buf(buf).await?;
        if read == 0 {
            return Err(MqttError::ConnectionClosedByPeer);
        }
    }
}

/// Encodes into the scratch buffer and writes it out; returns bytes written.
pub async fn write_packet<S>(
    stream: &mut S,
    scratch: &mut BytesMut,
    packet: &Packet,
) -> Result<usize>
where
    S: AsyncWrite + Unpin,
{
    scratch.clear();
    packet.encode(scratch)?;
    stream.write_all(&scratch[..]).await?;
    Ok(scratch.len())
}
