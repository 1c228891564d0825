//! Decoding, storing and reconciling flight controller telemetry.
//!
//! A [`Session`] is filled by [`ingest`] (usually through a [`Capture`]),
//! saved to and loaded from a [`LogDirectory`], and analyzed with the
//! functions in [`reconcile`].

pub mod export;
pub mod ingest;
pub mod persistence;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod util;

pub use crate::{
    export::export_csv,
    ingest::{
        Capture,
        IngestStats,
        Transport,
        ingest,
    },
    persistence::{
        LogDirectory,
        Recorded,
    },
    reconcile::{
        ChannelSummary,
        DiffTable,
    },
    session::Session,
    store::{
        ChannelLogs,
        ChannelStore,
        StoreError,
    },
};

#[derive(Debug, thiserror::Error)]
#[error("driftscope error")]
pub enum Error {
    Io(#[from] std::io::Error),
    Json(#[from] util::json::PrettyJsonError),
    JsonEncode(#[from] serde_json::Error),
    Csv(#[from] csv::Error),
    Transport(#[from] driftscope_statustext::Error),
    Store(#[from] StoreError),
    Join(#[from] tokio::task::JoinError),
}
