//! Recordings on disk.
//!
//! A recording is one JSON document per session. Channel logs are stored per
//! source under the source's key, each channel as a list of
//! `[time_ms, value]` pairs. Ground-truth altitudes are always stored as the
//! receiver reported them.

use std::path::{
    Path,
    PathBuf,
};

use chrono::{
    Local,
    NaiveDateTime,
};
use driftscope_types::Source;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    Error,
    ingest::IngestStats,
    session::Session,
    store::{
        ChannelLogs,
        SourceLog,
        StoreError,
    },
    util::json::json_decode,
};

pub const LOG_FILE_PREFIX: &str = "out";
pub const LOG_FILE_EXTENSION: &str = "log";
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// The stored form of a [`Session`].
///
/// Missing keys decode as empty logs, and a missing or zero `INIT_ALT` as "no
/// initial altitude".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "EKF_U", default)]
    pub uninhibited: SourceLog,

    #[serde(rename = "EKF_I", default)]
    pub inhibited: SourceLog,

    #[serde(rename = "GPS", default)]
    pub ground_truth: SourceLog,

    #[serde(rename = "SPF", default)]
    pub spoof_diff: SourceLog,

    #[serde(rename = "INIT_ALT", default)]
    pub initial_altitude_cm: i32,
}

impl SessionRecord {
    pub fn from_session(session: &Session) -> Self {
        let logs = session.raw_logs();
        Self {
            uninhibited: logs.source(Source::Uninhibited).clone(),
            inhibited: logs.source(Source::Inhibited).clone(),
            ground_truth: logs.source(Source::GroundTruth).clone(),
            spoof_diff: logs.source(Source::SpoofDiff).clone(),
            initial_altitude_cm: session.initial_altitude_cm().unwrap_or_default(),
        }
    }

    /// Restores the session. This is where the initial altitude is
    /// subtracted from the ground-truth altitudes.
    pub fn into_session(self) -> Result<Session, StoreError> {
        let mut logs = ChannelLogs::default();
        logs.set_source(Source::Uninhibited, self.uninhibited)?;
        logs.set_source(Source::Inhibited, self.inhibited)?;
        logs.set_source(Source::GroundTruth, self.ground_truth)?;
        logs.set_source(Source::SpoofDiff, self.spoof_diff)?;

        let initial_altitude_cm = Some(self.initial_altitude_cm).filter(|altitude| *altitude != 0);

        Ok(Session::restore(logs, initial_altitude_cm))
    }
}

/// `out_<timestamp>[_<label>].log`
///
/// Characters in the label that don't belong in a file name are replaced
/// with `-`.
pub fn log_file_name(timestamp: NaiveDateTime, label: Option<&str>) -> String {
    let mut name = format!("{LOG_FILE_PREFIX}_{}", timestamp.format(TIMESTAMP_FORMAT));

    if let Some(label) = label.map(str::trim).filter(|label| !label.is_empty()) {
        name.push('_');
        name.extend(label.chars().map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            }
            else {
                '-'
            }
        }));
    }

    name.push('.');
    name.push_str(LOG_FILE_EXTENSION);
    name
}

fn is_log_file_name(name: &str) -> bool {
    name.starts_with(LOG_FILE_PREFIX)
        && Path::new(name)
            .extension()
            .is_some_and(|extension| extension == LOG_FILE_EXTENSION)
}

pub async fn write_session(path: impl AsRef<Path>, session: &Session) -> Result<(), Error> {
    let json = serde_json::to_vec(&SessionRecord::from_session(session))?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Reads a recording. Returns `Ok(None)` if the file doesn't exist.
pub async fn read_session(path: impl AsRef<Path>) -> Result<Option<Session>, Error> {
    let path = path.as_ref();

    let json = match tokio::fs::read(path).await {
        Ok(json) => json,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no recording");
            return Ok(None);
        }
        Err(error) => return Err(error.into()),
    };

    let record: SessionRecord = json_decode(&json)?;
    let session = record.into_session()?;
    tracing::info!(
        path = %path.display(),
        initial_altitude_cm = ?session.initial_altitude_cm(),
        "loaded session"
    );

    Ok(Some(session))
}

/// The directory recordings are saved to and loaded from.
#[derive(Clone, Debug)]
pub struct LogDirectory {
    path: PathBuf,
}

impl Default for LogDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_DIRECTORY)
    }
}

impl LogDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saves the session under the current local time.
    pub async fn save(&self, session: &Session, label: Option<&str>) -> Result<PathBuf, Error> {
        self.save_as(session, Local::now().naive_local(), label).await
    }

    pub async fn save_as(
        &self,
        session: &Session,
        timestamp: NaiveDateTime,
        label: Option<&str>,
    ) -> Result<PathBuf, Error> {
        tokio::fs::create_dir_all(&self.path).await?;

        let path = self.path.join(log_file_name(timestamp, label));
        write_session(&path, session).await?;
        tracing::info!(path = %path.display(), "saved session");

        Ok(path)
    }

    /// Recordings in this directory, oldest first. A missing directory has
    /// none.
    pub async fn files(&self) -> Result<Vec<PathBuf>, Error> {
        let mut read_dir = match tokio::fs::read_dir(&self.path).await {
            Ok(read_dir) => read_dir,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(error) => return Err(error.into()),
        };

        let mut names = vec![];
        while let Some(entry) = read_dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if is_log_file_name(name) && entry.file_type().await?.is_file() {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();

        Ok(names.into_iter().map(|name| self.path.join(name)).collect())
    }

    /// The most recent recording, going by file name.
    pub async fn latest(&self) -> Result<Option<PathBuf>, Error> {
        Ok(self.files().await?.pop())
    }

    /// Path of the named recording, or of the most recent one if no name is
    /// given. `None` if there are no recordings.
    pub async fn resolve(&self, name: Option<&str>) -> Result<Option<PathBuf>, Error> {
        match name {
            Some(name) => Ok(Some(self.path.join(name))),
            None => {
                let latest = self.latest().await?;
                if latest.is_none() {
                    tracing::debug!(path = %self.path.display(), "no recordings");
                }
                Ok(latest)
            }
        }
    }

    /// Loads the named recording, or the most recent one if no name is
    /// given, and returns it along with its path.
    ///
    /// Returns `Ok(None)` if there is no such recording. A recording that
    /// exists but can't be decoded is an error.
    pub async fn open(&self, name: Option<&str>) -> Result<Option<(PathBuf, Session)>, Error> {
        match self.resolve(name).await? {
            Some(path) => Ok(read_session(&path).await?.map(|session| (path, session))),
            None => Ok(None),
        }
    }

    /// Like [`open`][Self::open], without the path.
    pub async fn load(&self, name: Option<&str>) -> Result<Option<Session>, Error> {
        Ok(self.open(name).await?.map(|(_, session)| session))
    }

    /// Waits for `capture` to end and saves the session, also if the capture
    /// failed.
    ///
    /// Samples that were ingested before a transport error are kept this
    /// way. The capture's own result is passed back in [`Recorded::result`].
    /// Only failing to save is an error here.
    pub async fn record<F>(
        &self,
        session: &Session,
        capture: F,
        label: Option<&str>,
    ) -> Result<Recorded, Error>
    where
        F: Future<Output = Result<IngestStats, Error>>,
    {
        let result = capture.await;
        if let Err(error) = &result {
            tracing::warn!(%error, "capture failed, saving what was received");
        }

        let path = self.save(session, label).await?;

        Ok(Recorded { path, result })
    }
}

/// A capture that was saved by [`LogDirectory::record`].
#[derive(Debug)]
pub struct Recorded {
    pub path: PathBuf,
    pub result: Result<IngestStats, Error>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use driftscope_types::{
        Channel,
        Sample,
        Source,
    };
    use futures_util::stream;
    use tokio_util::sync::CancellationToken;

    use crate::{
        Error,
        ingest::ingest,
        persistence::{
            LogDirectory,
            SessionRecord,
            log_file_name,
        },
        session::Session,
    };

    fn timestamp(year: i32, hour: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(year, 3, 14)
            .unwrap()
            .and_hms_opt(hour, 15, 9)
            .unwrap()
    }

    fn recorded_session() -> Session {
        let session = Session::new();
        for line in [
            "Setting GPS Initial Altitude: 10000 cm",
            "U[100]1;2;3;4;480",
            "I[100]1.5;2;3;4;470",
            "G[100]1.25;11;2;3;4;10500",
            "G[200]1.25;12;2;3;4;10520",
            "SPF[100]0.25;0;0;0;30",
        ] {
            session.push_line(line).unwrap().unwrap();
        }
        session
    }

    #[test]
    fn file_names_sort_by_time() {
        assert_eq!(
            log_file_name(timestamp(2024, 9), None),
            "out_2024-03-14_09-15-09.log"
        );
        assert_eq!(
            log_file_name(timestamp(2024, 9), Some("field test/2")),
            "out_2024-03-14_09-15-09_field-test-2.log"
        );
        assert!(
            log_file_name(timestamp(2024, 9), Some("zzz"))
                < log_file_name(timestamp(2024, 10), None)
        );
    }

    #[test]
    fn record_keys_are_source_keys() {
        let json = serde_json::to_value(SessionRecord::default()).unwrap();
        let object = json.as_object().unwrap();

        for source in Source::ALL {
            assert!(object.contains_key(source.key()), "{source}");
        }
        assert!(object.contains_key("INIT_ALT"));
    }

    #[tokio::test]
    async fn save_then_load_subtracts_the_initial_altitude_once() {
        let directory = tempfile::tempdir().unwrap();
        let logs = LogDirectory::new(directory.path());

        let original = recorded_session();
        logs.save_as(&original, timestamp(2024, 9), None).await.unwrap();

        let loaded = logs.load(None).await.unwrap().unwrap();
        assert_eq!(loaded.initial_altitude_cm(), Some(10000));

        let expected = original.store().snapshot_all();
        let actual = loaded.store().snapshot_all();
        for source in Source::ALL {
            for channel in source.channels() {
                let expected = expected.channel(source, *channel);
                let actual = actual.channel(source, *channel);
                if (source, *channel) == (Source::GroundTruth, Channel::Altitude) {
                    assert_eq!(actual, [Sample::new(100, 500.0), Sample::new(200, 520.0)]);
                }
                else {
                    assert_eq!(actual, expected, "{source} {channel}");
                }
            }
        }

        // saving a loaded session stores raw altitudes again
        let path = logs.save_as(&loaded, timestamp(2024, 10), Some("again")).await.unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["GPS"]["ALT"][0][1].as_f64(), Some(10500.0));

        let reloaded = logs.load(None).await.unwrap().unwrap();
        assert_eq!(
            reloaded.store().snapshot(Source::GroundTruth, Channel::Altitude),
            vec![Sample::new(100, 500.0), Sample::new(200, 520.0)]
        );
    }

    #[tokio::test]
    async fn non_finite_values_survive_a_save() {
        let directory = tempfile::tempdir().unwrap();
        let logs = LogDirectory::new(directory.path());

        let session = Session::new();
        session.push_line("G[100]1e999;9;1;2;3;10").unwrap().unwrap();
        session.push_line("I[100]nan;1;2;-inf;10").unwrap().unwrap();
        logs.save(&session, None).await.unwrap();

        let loaded = logs.load(None).await.unwrap().unwrap();
        assert_eq!(
            loaded.store().snapshot(Source::GroundTruth, Channel::GroundSpeed),
            vec![Sample::new(100, f64::INFINITY)]
        );
        assert!(
            loaded.store().snapshot(Source::Inhibited, Channel::GroundSpeed)[0]
                .value
                .is_nan()
        );
        assert_eq!(
            loaded.store().snapshot(Source::Inhibited, Channel::VelocityZ),
            vec![Sample::new(100, f64::NEG_INFINITY)]
        );
    }

    #[tokio::test]
    async fn a_failed_capture_is_still_saved() {
        let directory = tempfile::tempdir().unwrap();
        let logs = LogDirectory::new(directory.path());

        let session = Session::new();
        let frames = stream::iter(vec![
            Ok("I[100]5;1;2;3;400".to_owned()),
            Ok("G[100]5.5;9;1;2;3;410".to_owned()),
            Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset)),
            Ok("I[200]5;1;2;3;400".to_owned()),
        ]);

        let recorded = logs
            .record(
                &session,
                ingest(&session, frames, CancellationToken::new()),
                Some("reset"),
            )
            .await
            .unwrap();
        assert!(matches!(recorded.result, Err(Error::Io(_))));

        let (path, loaded) = logs.open(None).await.unwrap().unwrap();
        assert_eq!(path, recorded.path);
        assert_eq!(
            loaded.store().snapshot(Source::Inhibited, Channel::GroundSpeed),
            vec![Sample::new(100, 5.0)]
        );
        assert_eq!(loaded.store().len(Source::GroundTruth, Channel::SatCount), 1);
    }

    #[tokio::test]
    async fn resolving_names_and_the_latest_recording() {
        let directory = tempfile::tempdir().unwrap();
        let logs = LogDirectory::new(directory.path());

        assert_eq!(logs.resolve(None).await.unwrap(), None);
        assert_eq!(
            logs.resolve(Some("out_x.log")).await.unwrap(),
            Some(directory.path().join("out_x.log"))
        );

        let path = logs.save_as(&Session::new(), timestamp(2024, 9), None).await.unwrap();
        assert_eq!(logs.resolve(None).await.unwrap(), Some(path.clone()));

        let (opened, _) = logs.open(None).await.unwrap().unwrap();
        assert_eq!(opened, path);
    }

    #[tokio::test]
    async fn latest_is_the_last_file_by_name() {
        let directory = tempfile::tempdir().unwrap();
        let logs = LogDirectory::new(directory.path());

        let session = Session::new();
        logs.save_as(&session, timestamp(2025, 9), None).await.unwrap();
        let newest = logs.save_as(&session, timestamp(2025, 23), None).await.unwrap();
        logs.save_as(&session, timestamp(2024, 23), Some("old")).await.unwrap();
        std::fs::write(directory.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(directory.path().join("zzz.log"), "{}").unwrap();

        assert_eq!(logs.files().await.unwrap().len(), 3);
        assert_eq!(logs.latest().await.unwrap(), Some(newest));
    }

    #[tokio::test]
    async fn missing_recordings_are_not_an_error() {
        let directory = tempfile::tempdir().unwrap();

        let logs = LogDirectory::new(directory.path().join("does-not-exist"));
        assert!(logs.latest().await.unwrap().is_none());
        assert!(logs.load(None).await.unwrap().is_none());

        let logs = LogDirectory::new(directory.path());
        assert!(logs.load(Some("out_nope.log")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn older_recordings_without_some_keys_load() {
        let directory = tempfile::tempdir().unwrap();
        std::fs::write(
            directory.path().join("out_old.log"),
            r#"{"EKF_I": {"GS": [[100, 5.0]]}, "GPS": {"GS": [[100, 5.5]]}}"#,
        )
        .unwrap();

        let session = LogDirectory::new(directory.path())
            .load(Some("out_old.log"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.initial_altitude_cm(), None);
        assert_eq!(
            session.store().snapshot(Source::GroundTruth, Channel::GroundSpeed),
            vec![Sample::new(100, 5.5)]
        );
        assert!(session.store().snapshot_source(Source::SpoofDiff).is_empty());
    }

    #[tokio::test]
    async fn corrupt_recordings_are_an_error() {
        let directory = tempfile::tempdir().unwrap();
        let logs = LogDirectory::new(directory.path());

        std::fs::write(
            directory.path().join("out_bad-value.log"),
            r#"{"GPS": {"ALT": [[100, "high"]]}}"#,
        )
        .unwrap();
        let result = logs.load(Some("out_bad-value.log")).await;
        assert!(matches!(result, Err(Error::Json(_))));

        std::fs::write(
            directory.path().join("out_bad-channel.log"),
            r#"{"EKF_I": {"SC": [[100, 9.0]]}}"#,
        )
        .unwrap();
        let result = logs.load(Some("out_bad-channel.log")).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }
}
