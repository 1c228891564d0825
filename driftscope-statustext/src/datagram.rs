use std::{
    net::SocketAddr,
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

use futures_util::Stream;
use tokio::{
    io::ReadBuf,
    net::{
        ToSocketAddrs,
        UdpSocket,
    },
};

use crate::{
    Error,
    frame_text,
};

const DATAGRAM_BUFFER_SIZE: usize = 2048;

/// Reads one text frame per UDP datagram.
#[derive(Debug)]
pub struct DatagramReader {
    socket: UdpSocket,
    buffer: Box<[u8; DATAGRAM_BUFFER_SIZE]>,
}

impl DatagramReader {
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket,
            buffer: Box::new([0; DATAGRAM_BUFFER_SIZE]),
        }
    }

    pub async fn bind(address: impl ToSocketAddrs) -> Result<Self, Error> {
        let socket = UdpSocket::bind(address).await?;
        tracing::debug!(local_address = ?socket.local_addr().ok(), "listening for frames");
        Ok(Self::new(socket))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

impl Stream for DatagramReader {
    type Item = Result<String, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let mut read_buf = ReadBuf::new(&mut this.buffer[..]);
            match this.socket.poll_recv(cx, &mut read_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(error)) => return Poll::Ready(Some(Err(error.into()))),
                Poll::Ready(Ok(())) => {
                    let frame = frame_text(read_buf.filled());
                    if !frame.is_empty() {
                        return Poll::Ready(Some(Ok(frame)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use tokio::net::UdpSocket;

    use crate::datagram::DatagramReader;

    #[tokio::test]
    async fn it_reads_one_frame_per_datagram() {
        let mut reader = DatagramReader::bind("127.0.0.1:0").await.unwrap();
        let address = reader.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"\0\0", address).await.unwrap();
        sender
            .send_to(b"I[10]1;2;3;4;5\0\0\0\0\0\0", address)
            .await
            .unwrap();
        sender.send_to(b"U[10]1;2;3;4;5\n", address).await.unwrap();

        assert_eq!(reader.try_next().await.unwrap().unwrap(), "I[10]1;2;3;4;5");
        assert_eq!(reader.try_next().await.unwrap().unwrap(), "U[10]1;2;3;4;5");
    }
}
