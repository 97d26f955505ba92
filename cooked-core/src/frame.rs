//! Length-prefixed JSON framing shared by the dispatch and result channels.
//!
//! Each frame is a 4-byte little-endian payload length followed by the
//! payload. A connection alternates strictly between one request frame and
//! one reply frame.

use crate::error::{CoreError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(CoreError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CoreError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, &payload).await
}

/// Client end of a request/reply channel.
pub struct ChannelClient {
    stream: TcpStream,
    peer: String,
}

impl ChannelClient {
    pub async fn connect<A: ToSocketAddrs + std::fmt::Display>(addr: A) -> Result<Self> {
        let peer = addr.to_string();
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!("Connected to {}", peer);
        Ok(Self { stream, peer })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one raw frame and wait for the reply frame.
    pub async fn exchange(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        write_frame(&mut self.stream, payload).await?;
        read_frame(&mut self.stream)
            .await?
            .ok_or(CoreError::ChannelClosed)
    }

    pub async fn request<Req, Rep>(&mut self, request: &Req) -> Result<Rep>
    where
        Req: Serialize,
        Rep: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request)?;
        let reply = self.exchange(&payload).await?;
        Ok(serde_json::from_slice(&reply)?)
    }
}
