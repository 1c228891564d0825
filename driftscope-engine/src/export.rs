//! CSV export of [`DiffTable`]s.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

use csv::WriterBuilder;
use driftscope_types::Channel;

use crate::{
    Error,
    reconcile::DiffTable,
};

pub const CSV_HEADER: [&str; 9] = [
    "Time (ms)",
    "Inhibited Value",
    "GPS Value",
    "Satellite Count",
    "Abs Diff",
    "Squared Diff",
    "",
    "Mean Abs Diff",
    "RMS Diff",
];

impl DiffTable {
    /// Writes one row per pair. The aggregates go into the last two columns
    /// of the first row, so records have different lengths.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);
        writer.write_record(CSV_HEADER)?;

        for (i, row) in self.rows.iter().enumerate() {
            let mut record = vec![
                row.time_ms.to_string(),
                row.estimate.to_string(),
                row.truth.to_string(),
                row.sat_count
                    .map(|sat_count| sat_count.to_string())
                    .unwrap_or_default(),
                row.abs_diff.to_string(),
                row.squared_diff.to_string(),
            ];
            if i == 0 {
                record.extend([
                    String::new(),
                    self.mean_abs_diff.to_string(),
                    self.rms_diff.to_string(),
                ]);
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Writes `<stem>_<CHANNEL>.csv` into `directory` for every table and returns
/// the paths written.
///
/// This does blocking file I/O. From async code, run it with
/// [`tokio::task::spawn_blocking`].
pub fn export_csv(
    tables: &BTreeMap<Channel, DiffTable>,
    directory: impl AsRef<Path>,
    stem: &str,
) -> Result<Vec<PathBuf>, Error> {
    let directory = directory.as_ref();
    std::fs::create_dir_all(directory)?;

    let mut paths = Vec::with_capacity(tables.len());
    for (channel, table) in tables {
        let path = directory.join(format!("{stem}_{channel}.csv"));
        let file = std::fs::File::create(&path)?;
        table.write_csv(file)?;

        tracing::debug!(path = %path.display(), rows = table.rows.len(), "exported");
        paths.push(path);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use driftscope_types::Sample;

    use crate::{
        export::export_csv,
        reconcile::{
            diff_table,
            diff_tables,
        },
        session::Session,
    };

    #[test]
    fn aggregates_go_into_the_first_row() {
        let table = diff_table(
            &[Sample::new(100, 10.0), Sample::new(200, 20.0)],
            &[Sample::new(100, 12.0), Sample::new(200, 18.0)],
            &[Sample::new(200, 9.0)],
        )
        .unwrap();

        let mut buffer = vec![];
        table.write_csv(&mut buffer).unwrap();

        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "Time (ms),Inhibited Value,GPS Value,Satellite Count,Abs Diff,Squared Diff,,Mean Abs Diff,RMS Diff\n\
             100,10,12,,2,4,,2,2\n\
             200,20,18,9,2,4\n"
        );
    }

    #[test]
    fn it_writes_one_file_per_channel() {
        let session = Session::new();
        session.push_line("I[100]10;1;2;3;400").unwrap().unwrap();
        session.push_line("G[100]12;7;1;2;3;410").unwrap().unwrap();
        session.push_line("G[200]12;7;1;2;3;410").unwrap().unwrap();

        let directory = tempfile::tempdir().unwrap();
        let out = directory.path().join("csv");
        let paths = export_csv(&diff_tables(&session), &out, "flight").unwrap();

        let names = paths
            .iter()
            .map(|path| path.file_name().unwrap().to_str().unwrap().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "flight_GS.csv",
                "flight_VX.csv",
                "flight_VY.csv",
                "flight_VZ.csv",
                "flight_ALT.csv"
            ]
        );

        let altitude = std::fs::read_to_string(out.join("flight_ALT.csv")).unwrap();
        assert_eq!(altitude.lines().nth(1), Some("100,400,410,7,10,100,,10,10"));
        assert_eq!(altitude.lines().count(), 2);
    }
}
