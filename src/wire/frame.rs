/// Length-prefixed framing: a little-endian `u32` length, then the payload
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_MAX_FRAME_LEN: u32 = 64 * 1024;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge { len: u32, max: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn is_eof(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::UnexpectedEof
}

/// Read the next non-empty frame.
///
/// Returns `Ok(None)` when the peer closes the stream, whether at a frame
/// boundary or part way through one. Zero-length frames are skipped.
pub async fn read_frame<R>(reader: &mut R, max_len: u32) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let len = match reader.read_u32_le().await {
            Ok(len) => len,
            Err(e) if is_eof(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if len == 0 {
            continue;
        }
        if len > max_len {
            return Err(FrameError::TooLarge { len, max: max_len });
        }

        let mut payload = vec![0u8; len as usize];
        match reader.read_exact(&mut payload).await {
            Ok(_) => return Ok(Some(payload)),
            Err(e) if is_eof(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: u32::MAX,
        max: u32::MAX,
    })?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_reads_frame_split_across_reads() {
        let mut mock = Builder::new()
            .read(&[3, 0])
            .read(&[0, 0, b'a'])
            .read(&[b'b', b'c'])
            .build();

        let frame = read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b"abc"[..]));
        assert!(read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_length_frames_skipped() {
        let mut mock = Builder::new()
            .read(&[0, 0, 0, 0])
            .read(&[0, 0, 0, 0])
            .read(&[1, 0, 0, 0, b'x'])
            .build();

        let frame = read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b"x"[..]));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_clean_close() {
        let mut mock = Builder::new().read(&[10, 0, 0, 0, 1, 2, 3]).build();

        assert!(read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_prefix_is_clean_close() {
        let mut mock = Builder::new().read(&[10, 0]).build();

        assert!(read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut mock = Builder::new().read(&[0, 0, 1, 0]).build();

        match read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await {
            Err(FrameError::TooLarge { len, max }) => {
                assert_eq!(len, 65536);
                assert_eq!(max, DEFAULT_MAX_FRAME_LEN);
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_frame_prefix() {
        let mut mock = Builder::new().write(&[2, 0, 0, 0]).write(b"hi").build();

        write_frame(&mut mock, b"hi").await.unwrap();
    }
}
