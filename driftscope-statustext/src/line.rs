//! Newline delimited status text, e.g. from a TCP bridge or a capture file.

use std::{
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::io::{
    AsyncRead,
    ReadBuf,
};

use crate::{
    Error,
    frame_text,
};

/// Longest line we buffer. Anything longer is discarded up to the next
/// newline.
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

pin_project! {
    /// Splits a byte stream into text frames.
    ///
    /// Lines may end in `\r`, `\n` or `\r\n`. Empty lines are skipped, and a
    /// trailing line without a newline is emitted when the stream ends.
    #[derive(Debug)]
    pub struct LineReader<R> {
        #[pin]
        reader: R,
        receive_buffer: ReceiveBuffer,
        finished: bool,
    }
}

impl<R: AsyncRead> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            receive_buffer: ReceiveBuffer::default(),
            finished: false,
        }
    }
}

impl<R: AsyncRead> Stream for LineReader<R> {
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let this = self.as_mut().project();

            if *this.finished {
                return Poll::Ready(None);
            }

            if let Some(line) = this.receive_buffer.next_line() {
                // `\r\n` produces an empty line, which we skip along with any
                // other blank ones.
                let line = frame_text(line);
                if !line.is_empty() {
                    return Poll::Ready(Some(Ok(line)));
                }
            }
            else {
                this.receive_buffer.prepare_read();
                let mut read_buf =
                    ReadBuf::new(&mut this.receive_buffer.buffer[this.receive_buffer.write_pos..]);
                match this.reader.poll_read(cx, &mut read_buf) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(error)) => return Poll::Ready(Some(Err(error.into()))),
                    Poll::Ready(Ok(())) => {
                        let num_bytes_read = read_buf.filled().len();
                        if num_bytes_read == 0 {
                            *this.finished = true;
                            let line = this.receive_buffer.take_remaining().map(frame_text);
                            return Poll::Ready(
                                line.filter(|line| !line.is_empty()).map(Ok),
                            );
                        }

                        this.receive_buffer.write_pos += num_bytes_read;
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
struct ReceiveBuffer {
    buffer: [u8; RECEIVE_BUFFER_SIZE],
    read_pos: usize,
    write_pos: usize,
    no_newline_until: usize,
    discarding: bool,
}

impl ReceiveBuffer {
    fn scan_for_newline(&mut self) -> Option<usize> {
        if let Some(index) = self.buffer[self.no_newline_until..self.write_pos]
            .iter()
            .position(|byte| *byte == b'\r' || *byte == b'\n')
        {
            let index = index + self.no_newline_until;
            self.no_newline_until = index;
            Some(index)
        }
        else {
            self.no_newline_until = self.write_pos;
            None
        }
    }

    fn next_line(&mut self) -> Option<&[u8]> {
        let newline = self.scan_for_newline()?;
        let start = self.read_pos;
        self.read_pos = newline + 1;
        self.no_newline_until = self.read_pos;

        if std::mem::take(&mut self.discarding) {
            // tail of an over-long line
            Some(&[])
        }
        else {
            Some(&self.buffer[start..newline])
        }
    }

    fn take_remaining(&mut self) -> Option<&[u8]> {
        let (start, end) = (self.read_pos, self.write_pos);
        let discarding = std::mem::take(&mut self.discarding);
        self.reset();
        (start < end && !discarding).then(|| &self.buffer[start..end])
    }

    fn prepare_read(&mut self) {
        if self.read_pos == self.write_pos {
            self.reset();
        }
        else if self.read_pos > 0 {
            // move data
            self.buffer.copy_within(self.read_pos..self.write_pos, 0);
            self.write_pos -= self.read_pos;
            self.no_newline_until -= self.read_pos;
            self.read_pos = 0;
        }

        if self.write_pos == self.buffer.len() {
            tracing::debug!(
                max_length = RECEIVE_BUFFER_SIZE,
                "discarding over-long line"
            );
            self.reset();
            self.discarding = true;
        }
    }

    fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.no_newline_until = 0;
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self {
            buffer: [0; RECEIVE_BUFFER_SIZE],
            read_pos: 0,
            write_pos: 0,
            no_newline_until: 0,
            discarding: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use crate::line::{
        LineReader,
        RECEIVE_BUFFER_SIZE,
    };

    async fn read_all(input: &[u8]) -> Vec<String> {
        LineReader::new(input).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn it_splits_lines() {
        let lines = read_all(b"U[1]1;2;3;4;5\r\nI[1]1;2;3;4;5\n\nG[1]1;2;3;4;5;6").await;
        assert_eq!(lines, ["U[1]1;2;3;4;5", "I[1]1;2;3;4;5", "G[1]1;2;3;4;5;6"]);
    }

    #[tokio::test]
    async fn it_strips_nul_padding() {
        let lines = read_all(b"SPF[7]1;2;3;4;5\0\0\0\n").await;
        assert_eq!(lines, ["SPF[7]1;2;3;4;5"]);
    }

    #[tokio::test]
    async fn it_discards_over_long_lines() {
        let mut input = vec![b'x'; 2 * RECEIVE_BUFFER_SIZE + 17];
        input.extend_from_slice(b"\nU[2]1;2;3;4;5\n");
        input.extend_from_slice(&vec![b'y'; RECEIVE_BUFFER_SIZE + 3]);

        let lines = read_all(&input).await;
        assert_eq!(lines, ["U[2]1;2;3;4;5"]);
    }

    #[tokio::test]
    async fn it_handles_lines_split_across_reads() {
        let (client, mut server) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            server.write_all(b"G[100]250;9;1;2;3;4\nU[100]1;2;3;4;5\n").await.unwrap();
        });

        let lines: Vec<String> = LineReader::new(client).try_collect().await.unwrap();
        writer.await.unwrap();
        assert_eq!(lines, ["G[100]250;9;1;2;3;4", "U[100]1;2;3;4;5"]);
    }
}
