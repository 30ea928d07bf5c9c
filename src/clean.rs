use log::{debug, info, warn};

use row_reconciler::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use text_diff::print_diff;

use crate::args::Args;
use crate::clean::config_reader::*;
use crate::clean::io_csv::*;

pub mod config_reader;
mod io_common;
mod io_csv;

#[derive(Debug, Snafu)]
pub enum CleanError {
    #[snafu(display("Error opening file {path}"))]
    OpeningCsv {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: u64,
    },
    #[snafu(display("File {path} ends before the {row_name} row"))]
    MissingHeaderRow { path: String, row_name: String },
    #[snafu(display("Error writing file {path}"))]
    WritingCsv { source: csv::Error, path: String },
    #[snafu(display("Error writing file {path}"))]
    FlushingCsv {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the configuration {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error cleaning {path}"))]
    Reconcile {
        source: ReconcileError,
        path: String,
    },
    #[snafu(display("Error opening reference file {path}"))]
    OpeningReference {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Difference detected between {path} and reference {reference}"))]
    ReferenceMismatch { path: String, reference: String },
    #[snafu(display(
        "No test submissions, {path} was not written and cannot be compared with {reference}"
    ))]
    DeletedRowsNotWritten { path: String, reference: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CleanResult<T> = Result<T, CleanError>;

/// The settings of one run, after merging the defaults, the configuration file and the flags.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CleanSettings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub deleted_output: PathBuf,
    /// Only 2 header rows (no import identifiers row).
    pub within_participants: bool,
    pub reconcile: ReconcileConfig,
    pub reference: Option<PathBuf>,
    pub reference_deleted: Option<PathBuf>,
}

impl CleanSettings {
    pub fn resolve(args: &Args, file_config: Option<&CleanConfig>) -> CleanResult<CleanSettings> {
        let empty = CleanConfig::default();
        let fc = file_config.unwrap_or(&empty);
        let pick = |arg: &Option<String>, conf: &Option<String>| arg.clone().or_else(|| conf.clone());

        let input: PathBuf = match pick(&args.input, &fc.input_file) {
            Some(p) => PathBuf::from(p),
            None => {
                whatever!("No input file: pass --input or set inputFile in the configuration")
            }
        };
        let output = pick(&args.out, &fc.output_file)
            .map(PathBuf::from)
            .unwrap_or_else(|| io_common::default_output_path(&input, ""));
        let deleted_output = pick(&args.out_deleted, &fc.deleted_rows_file)
            .map(PathBuf::from)
            .unwrap_or_else(|| io_common::default_output_path(&input, "_deleted_rows"));

        let defaults = ReconcileConfig::default();
        let reconcile = ReconcileConfig {
            key_column: pick(&args.link_id_column, &fc.link_id_column)
                .unwrap_or(defaults.key_column),
            duration_column: pick(&args.duration_column, &fc.duration_column)
                .unwrap_or(defaults.duration_column),
            contact_column: pick(&args.email_column, &fc.email_column)
                .unwrap_or(defaults.contact_column),
            begin_id_column: pick(&args.id_beginning, &fc.id_beginning)
                .unwrap_or(defaults.begin_id_column),
            end_id_column: pick(&args.id_end, &fc.id_end).unwrap_or(defaults.end_id_column),
            test_id: pick(&args.test_id, &fc.test_id).unwrap_or(defaults.test_id),
            check_boundary_mismatch: args.check_id_mismatch
                || fc.check_id_mismatch.unwrap_or(false),
        };

        Ok(CleanSettings {
            input,
            output,
            deleted_output,
            within_participants: args.within_participants
                || fc.is_within_participants.unwrap_or(false),
            reconcile,
            reference: pick(&args.reference, &fc.reference_file).map(PathBuf::from),
            reference_deleted: pick(&args.reference_deleted, &fc.reference_deleted_rows_file)
                .map(PathBuf::from),
        })
    }
}

pub fn run_from_args(args: &Args) -> CleanResult<Reconciliation> {
    let file_config = match &args.config {
        Some(p) => Some(read_config(p)?),
        None => None,
    };
    let settings = CleanSettings::resolve(args, file_config.as_ref())?;
    run_clean(&settings)
}

/// Reads the export, merges it and writes the outputs.
///
/// Nothing is written if the merge fails.
pub fn run_clean(settings: &CleanSettings) -> CleanResult<Reconciliation> {
    info!("settings: {:?}", settings);
    let input_name = settings.input.display().to_string();

    let mut export = read_export(&settings.input, settings.within_participants)?;
    info!(
        "Read {} rows from {:?} ({} columns)",
        export.records.len(),
        io_common::simplify_file_name(&settings.input),
        export.header.len()
    );

    let records = std::mem::take(&mut export.records);
    let res = reconcile(&export.header, records, &settings.reconcile)
        .context(ReconcileSnafu { path: &input_name })?;

    for m in res.boundary_mismatches.iter() {
        debug!("mismatch: {:?}", m);
    }

    write_partition(&settings.output, &export, &res.accepted)?;
    info!(
        "Wrote {} participants to {}",
        res.accepted.len(),
        settings.output.display()
    );
    if res.rejected.is_empty() {
        info!("No test submissions found, {} not written", settings.deleted_output.display());
    } else {
        write_partition(&settings.deleted_output, &export, &res.rejected)?;
        info!(
            "Wrote {} test submissions to {}",
            res.rejected.len(),
            settings.deleted_output.display()
        );
    }

    if let Some(reference) = &settings.reference {
        check_reference(&settings.output, reference)?;
    }
    if let Some(reference) = &settings.reference_deleted {
        // A file left by an earlier run must not be taken for this run's output.
        ensure!(
            !res.rejected.is_empty(),
            DeletedRowsNotWrittenSnafu {
                path: settings.deleted_output.display().to_string(),
                reference: reference.display().to_string(),
            }
        );
        check_reference(&settings.deleted_output, reference)?;
    }

    Ok(res)
}

fn check_reference(output: &Path, reference: &Path) -> CleanResult<()> {
    let read = |p: &Path| {
        fs::read_to_string(p).context(OpeningReferenceSnafu {
            path: p.display().to_string(),
        })
    };
    // Line endings are not significant for the comparison.
    let expected = read(reference)?.replace("\r\n", "\n");
    let actual = read(output)?.replace("\r\n", "\n");
    if expected != actual {
        warn!("Found differences with the reference file {}", reference.display());
        print_diff(expected.as_str(), actual.as_str(), "\n");
        return ReferenceMismatchSnafu {
            path: output.display().to_string(),
            reference: reference.display().to_string(),
        }
        .fail();
    }
    info!("{} matches the reference {}", output.display(), reference.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const EXPORT: &str = "\
\"LinkID\",\"Q99_1\",\"SONA_end\",\"Duration (in seconds)\",\"email\",\"Q1\"
\"Link ID\",\"Enter your id\",\"Enter your id again\",\"Duration (in seconds)\",\"Email\",\"How are you?\"
\"{\"\"ImportId\"\":\"\"LinkID\"\"}\",\"{\"\"ImportId\"\":\"\"QID99_1\"\"}\",\"{\"\"ImportId\"\":\"\"QID2\"\"}\",\"{\"\"ImportId\"\":\"\"duration\"\"}\",\"{\"\"ImportId\"\":\"\"email\"\"}\",\"{\"\"ImportId\"\":\"\"QID1\"\"}\"
\"L2\",\"5001\",\"\",\"100\",\"\",\"\"
\"L1\",\"123456\",\"\",\"10\",\"\",\"fine\"
\"L2\",\"\",\"5001\",\"20\",\"p@x.org,p@y.org\",\"good\"
\"L3\",\"5003\",\"5003\",\"7\",\"q@x.org\",\"bad\"
\"L2\",\"\",\"\",\"5\",\"\",\"great\"
";

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn settings(dir: &Path, input: &str) -> CleanSettings {
        CleanSettings {
            input: dir.join(input),
            output: dir.join("out.csv"),
            deleted_output: dir.join("out_deleted.csv"),
            within_participants: false,
            reconcile: ReconcileConfig::default(),
            reference: None,
            reference_deleted: None,
        }
    }

    #[test]
    fn cleans_an_export() {
        init();
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("export.csv"), EXPORT).unwrap();
        let s = settings(dir.path(), "export.csv");

        let res = run_clean(&s).unwrap();
        assert_eq!(res.accepted.keys().collect::<Vec<_>>(), vec!["L2", "L3"]);
        assert_eq!(res.rejected.keys().collect::<Vec<_>>(), vec!["L1"]);

        let out = fs::read_to_string(&s.output).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "LinkID,Q99_1,SONA_end,Duration (in seconds),email,Q1");
        assert_eq!(lines[3], "L2,5001,5001,125,p@x.org,good");
        assert_eq!(lines[4], "L3,5003,5003,7,q@x.org,bad");

        let deleted = fs::read_to_string(&s.deleted_output).unwrap();
        assert_eq!(deleted.lines().count(), 4);
        assert_eq!(deleted.lines().last(), Some("L1,123456,,10,,fine"));
    }

    #[test]
    fn no_deleted_file_without_test_submissions() {
        init();
        let dir = tempdir().unwrap();
        let export: String = EXPORT
            .lines()
            .filter(|l| !l.contains("123456"))
            .map(|l| format!("{}\n", l))
            .collect();
        fs::write(dir.path().join("export.csv"), export).unwrap();
        let s = settings(dir.path(), "export.csv");

        let res = run_clean(&s).unwrap();
        assert!(res.rejected.is_empty());
        assert!(s.output.exists());
        assert!(!s.deleted_output.exists());
    }

    #[test]
    fn malformed_row_writes_nothing() {
        init();
        let dir = tempdir().unwrap();
        let export = format!("{}\"L4\",\"1\"\n", EXPORT);
        fs::write(dir.path().join("export.csv"), export).unwrap();
        let s = settings(dir.path(), "export.csv");

        let err = run_clean(&s).unwrap_err();
        match err {
            CleanError::Reconcile {
                source: ReconcileError::MalformedRow { row, found, .. },
                ..
            } => {
                assert_eq!(row, 9);
                assert_eq!(found, 2);
            }
            e => panic!("unexpected error {:?}", e),
        }
        assert!(!s.output.exists());
        assert!(!s.deleted_output.exists());
    }

    #[test]
    fn missing_column_writes_nothing() {
        init();
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("export.csv"), EXPORT).unwrap();
        let mut s = settings(dir.path(), "export.csv");
        s.reconcile.end_id_column = "ID_end".to_string();

        let err = run_clean(&s).unwrap_err();
        assert!(matches!(
            err,
            CleanError::Reconcile {
                source: ReconcileError::MissingColumn {
                    role: ColumnRole::EndId,
                    ..
                },
                ..
            }
        ));
        assert!(!s.output.exists());
    }

    #[test]
    fn reference_check() {
        init();
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("export.csv"), EXPORT).unwrap();
        let mut s = settings(dir.path(), "export.csv");
        run_clean(&s).unwrap();

        let good = dir.path().join("expected.csv");
        fs::copy(&s.output, &good).unwrap();
        let bad = dir.path().join("wrong.csv");
        fs::write(&bad, "LinkID\n").unwrap();

        s.reference = Some(good);
        assert!(run_clean(&s).is_ok());
        s.reference = Some(bad);
        assert!(matches!(
            run_clean(&s),
            Err(CleanError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn deleted_reference_without_test_submissions() {
        init();
        let dir = tempdir().unwrap();
        let export: String = EXPORT
            .lines()
            .filter(|l| !l.contains("123456"))
            .map(|l| format!("{}\n", l))
            .collect();
        fs::write(dir.path().join("export.csv"), export).unwrap();
        let reference = dir.path().join("expected_deleted.csv");
        fs::write(&reference, "LinkID\n").unwrap();
        let mut s = settings(dir.path(), "export.csv");
        s.reference_deleted = Some(reference);

        match run_clean(&s).unwrap_err() {
            CleanError::DeletedRowsNotWritten { path, .. } => {
                assert_eq!(path, s.deleted_output.display().to_string())
            }
            e => panic!("unexpected error {:?}", e),
        }
        assert!(s.output.exists());
        assert!(!s.deleted_output.exists());
    }

    #[test]
    fn flags_override_the_configuration() {
        let conf = CleanConfig {
            input_file: Some("data/export.csv".to_string()),
            id_end: Some("end_id".to_string()),
            test_id: Some("000".to_string()),
            is_within_participants: Some(true),
            ..CleanConfig::default()
        };
        let args = Args {
            id_end: Some("ID_2".to_string()),
            ..Args::default()
        };
        let s = CleanSettings::resolve(&args, Some(&conf)).unwrap();
        assert_eq!(s.input, PathBuf::from("data/export.csv"));
        assert_eq!(s.output, PathBuf::from("data/output_export.csv"));
        assert_eq!(
            s.deleted_output,
            PathBuf::from("data/output_export_deleted_rows.csv")
        );
        assert_eq!(s.reconcile.end_id_column, "ID_2");
        assert_eq!(s.reconcile.begin_id_column, "Q99_1");
        assert_eq!(s.reconcile.test_id, "000");
        assert!(s.within_participants);
    }

    #[test]
    fn input_is_required() {
        let err = CleanSettings::resolve(&Args::default(), None).unwrap_err();
        assert!(matches!(err, CleanError::Whatever { .. }));
    }
}
