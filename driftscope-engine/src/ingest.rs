//! Feeding raw frames from a transport into a [`Session`].

use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use driftscope_statustext::{
    DatagramReader,
    Frame,
    LineReader,
};
use futures_util::{
    Stream,
    StreamExt,
    pin_mut,
};
use serde::Deserialize;
use tokio::{
    io::BufReader,
    net::TcpStream,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    Error,
    session::Session,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Frames received from the transport.
    pub frames: usize,
    /// Frames that decoded into something we store.
    pub decoded: usize,
    /// Frames dropped as unrecognized or malformed.
    pub dropped: usize,
    /// Samples appended to the store.
    pub samples: usize,
}

/// Reads frames until the stream ends or `shutdown` is cancelled.
///
/// Cancellation is observed between frames. A frame that was already
/// received is pushed into the session before the loop exits. Transport
/// errors end ingestion and are returned; decode errors only drop the frame.
pub async fn ingest<S, E>(
    session: &Session,
    frames: S,
    shutdown: CancellationToken,
) -> Result<IngestStats, Error>
where
    S: Stream<Item = Result<String, E>>,
    Error: From<E>,
{
    pin_mut!(frames);
    let mut stats = IngestStats::default();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("ingestion cancelled");
                break;
            }
            line = frames.next() => {
                match line {
                    None => {
                        tracing::debug!("transport closed");
                        break;
                    }
                    Some(Err(error)) => return Err(error.into()),
                    Some(Ok(line)) => {
                        stats.frames += 1;

                        // decoding happens before the store is locked
                        let frame = match Frame::decode(&line) {
                            Some(frame) => frame,
                            None => {
                                stats.dropped += 1;
                                continue;
                            }
                        };

                        match session.push_frame(&frame) {
                            Ok(num_samples) => {
                                stats.decoded += 1;
                                stats.samples += num_samples;
                            }
                            Err(error) => {
                                tracing::warn!(%line, %error, "frame rejected by store");
                                stats.dropped += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    tracing::info!(?stats, "ingestion stopped");

    Ok(stats)
}

/// Where frames come from.
#[derive(Clone, Debug, Deserialize)]
pub enum Transport {
    /// Newline delimited frames from a TCP server.
    Tcp { address: String },
    /// One frame per UDP datagram, received on a local address.
    Udp { bind: String },
    /// Newline delimited frames replayed from a file.
    File { path: PathBuf },
}

impl Transport {
    pub async fn run(
        &self,
        session: &Session,
        shutdown: CancellationToken,
    ) -> Result<IngestStats, Error> {
        match self {
            Transport::Tcp { address } => {
                tracing::info!(%address, "connecting");
                let stream = TcpStream::connect(address).await?;
                ingest(session, LineReader::new(BufReader::new(stream)), shutdown).await
            }
            Transport::Udp { bind } => {
                let reader = DatagramReader::bind(bind.as_str()).await?;
                tracing::info!(local_address = %reader.local_addr()?, "receiving datagrams");
                ingest(session, reader, shutdown).await
            }
            Transport::File { path } => {
                tracing::info!(path = %path.display(), "replaying");
                let file = tokio::fs::File::open(path).await?;
                ingest(session, LineReader::new(BufReader::new(file)), shutdown).await
            }
        }
    }
}

/// A running ingestion task.
///
/// This is the only writer into the session while it runs. Readers can take
/// snapshots from the session's store concurrently.
#[derive(Debug)]
pub struct Capture {
    shutdown: CancellationToken,
    join_handle: JoinHandle<Result<IngestStats, Error>>,
}

impl Capture {
    pub fn spawn(session: Arc<Session>, transport: Transport) -> Self {
        let shutdown = CancellationToken::new();

        let join_handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { transport.run(&session, shutdown).await }
        });

        Self {
            shutdown,
            join_handle,
        }
    }

    /// Token that stops this capture when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Waits until the transport closes or the capture is stopped through
    /// its [`shutdown_token`][Self::shutdown_token].
    pub async fn join(self) -> Result<IngestStats, Error> {
        self.join_handle.await?
    }

    /// Stops ingestion and waits for the task to finish.
    pub async fn stop(self) -> Result<IngestStats, Error> {
        self.shutdown.cancel();
        self.join_handle.await?
    }

    /// Runs for `duration`, or until the transport closes or fails.
    pub async fn run_for(self, duration: Duration) -> Result<IngestStats, Error> {
        let Self {
            shutdown,
            mut join_handle,
        } = self;

        tokio::select! {
            result = &mut join_handle => result?,
            _ = tokio::time::sleep(duration) => {
                shutdown.cancel();
                join_handle.await?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use driftscope_types::{
        Channel,
        Sample,
        Source,
    };
    use futures_util::stream;
    use tokio::{
        io::AsyncWriteExt,
        net::TcpListener,
    };
    use tokio_util::sync::CancellationToken;

    use crate::{
        Error,
        ingest::{
            Capture,
            IngestStats,
            Transport,
            ingest,
        },
        session::Session,
    };

    fn frames(lines: &[&str]) -> impl futures_util::Stream<Item = Result<String, Error>> {
        stream::iter(
            lines
                .iter()
                .map(|line| Ok(line.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn it_ingests_and_drops_silently() {
        let session = Session::new();
        let stats = ingest(
            &session,
            frames(&[
                "Setting GPS Initial Altitude: 500 cm",
                "I[100]10;1;2;3;400",
                "G[100]12;9;1;2;3;900",
                "G[200]12;9;1;2",
                "APM: EKF2 IMU0 initial yaw alignment complete",
                "SPF[100]2;0;0;0;500",
            ]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            stats,
            IngestStats {
                frames: 6,
                decoded: 4,
                dropped: 2,
                samples: 16,
            }
        );
        assert_eq!(session.initial_altitude_cm(), Some(500));
        assert_eq!(
            session.store().snapshot(Source::SpoofDiff, Channel::AltitudeDiff),
            vec![Sample::new(100, 500.0)]
        );
    }

    #[tokio::test]
    async fn cancellation_stops_a_pending_stream() {
        let session = Session::new();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let stats = ingest(
            &session,
            stream::pending::<Result<String, Error>>(),
            shutdown,
        )
        .await
        .unwrap();
        assert_eq!(stats, IngestStats::default());
    }

    #[tokio::test]
    async fn transport_errors_end_ingestion() {
        let session = Session::new();
        let broken = stream::iter(vec![
            Ok("U[1]1;2;3;4;5".to_owned()),
            Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset)),
        ]);

        let result = ingest(&session, broken, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(session.store().len(Source::Uninhibited, Channel::VelocityX), 1);
    }

    #[tokio::test]
    async fn it_captures_from_tcp_until_stopped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"I[100]5;0;0;0;0\r\nG[100]5.2;7;0;0;0;0\r\n")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            // keep the connection open, so only stopping ends the capture
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let session = Arc::new(Session::new());
        let capture = Capture::spawn(session.clone(), Transport::Tcp { address });

        while session.store().len(Source::GroundTruth, Channel::SatCount) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!capture.is_finished());

        let stats = capture.stop().await.unwrap();
        assert_eq!(stats.decoded, 2);
        server.abort();
    }

    #[tokio::test]
    async fn run_for_returns_early_when_the_transport_closes() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("frames.txt");
        std::fs::write(&path, "U[1]1;2;3;4;5\nU[2]1;2;3;4;5\n").unwrap();

        let session = Arc::new(Session::new());
        let stats = Capture::spawn(session.clone(), Transport::File { path })
            .run_for(Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(stats.decoded, 2);
        assert_eq!(session.store().len(Source::Uninhibited, Channel::Altitude), 2);
    }
}
