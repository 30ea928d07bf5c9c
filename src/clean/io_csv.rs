// Primitives for reading and writing the CSV exports.

use std::io::Cursor;

use crate::clean::*;

/// An export, as read from the file.
///
/// The header rows are kept as-is, to be copied at the top of the outputs.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SurveyExport {
    /// The names of the columns (first row).
    pub header: Vec<String>,
    /// The label row, and the import identifiers row in the 3-row layout.
    pub extra_header_rows: Vec<Vec<String>>,
    pub records: Vec<RawRecord>,
}

pub fn read_export(path: &Path, within_participants: bool) -> CleanResult<SurveyExport> {
    let path_s = path.display().to_string();
    let mut records = get_records(path)?;

    let mut header_rows_read: u64 = 0;
    let mut next_row = |row_name: &str| -> CleanResult<Vec<String>> {
        header_rows_read += 1;
        match records.next() {
            Some(line_r) => {
                let line = line_r.context(CsvLineParseSnafu {
                    path: &path_s,
                    lineno: header_rows_read,
                })?;
                Ok(line.iter().map(|s| s.to_string()).collect())
            }
            None => MissingHeaderRowSnafu {
                path: &path_s,
                row_name,
            }
            .fail(),
        }
    };

    let header = next_row("header")?;
    debug!("read_export: header: {:?}", header);
    let mut extra_header_rows = vec![next_row("content")?];
    if !within_participants {
        extra_header_rows.push(next_row("import identifiers")?);
    }

    let mut res: Vec<RawRecord> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let line = line_r.context(CsvLineParseSnafu {
            path: &path_s,
            lineno: (idx + extra_header_rows.len() + 2) as u64,
        })?;
        // The line where the record starts. A quoted field may span several lines.
        let row = line
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + extra_header_rows.len() + 2);
        res.push(RawRecord {
            row,
            fields: line.iter().map(|s| s.to_string()).collect(),
        });
    }
    Ok(SurveyExport {
        header,
        extra_header_rows,
        records: res,
    })
}

fn get_records(path: &Path) -> CleanResult<csv::StringRecordsIntoIter<Cursor<Vec<u8>>>> {
    let content = fs::read_to_string(path).context(OpeningCsvSnafu {
        path: path.display().to_string(),
    })?;
    // The rows are read with their actual length, the reconciler reports the short ones.
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(Cursor::new(skip_initial_space(&content).into_bytes()));
    Ok(rdr.into_records())
}

#[derive(Clone, Copy)]
enum FieldState {
    Start,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Drops the spaces at the start of each field, outside of quotes.
///
/// Exports may separate the fields with `", "`, and the csv crate only recognizes
/// a quoted field when the quote is the first character. Line breaks are kept so
/// the record positions still match the file.
fn skip_initial_space(content: &str) -> String {
    let mut res = String::with_capacity(content.len());
    let mut state = FieldState::Start;
    for c in content.chars() {
        if let FieldState::QuoteInQuoted = state {
            if c == '"' {
                res.push(c);
                state = FieldState::Quoted;
                continue;
            }
            state = FieldState::Unquoted;
        }
        state = match (state, c) {
            (FieldState::Start, ' ') => FieldState::Start,
            (FieldState::Start, '"') => {
                res.push(c);
                FieldState::Quoted
            }
            (FieldState::Quoted, '"') => {
                res.push(c);
                FieldState::QuoteInQuoted
            }
            (FieldState::Quoted, _) => {
                res.push(c);
                FieldState::Quoted
            }
            (_, ',' | '\n' | '\r') => {
                res.push(c);
                FieldState::Start
            }
            _ => {
                res.push(c);
                FieldState::Unquoted
            }
        };
    }
    res
}

/// Writes the header rows of the export followed by one row per record.
pub fn write_partition(
    path: &Path,
    export: &SurveyExport,
    records: &PartitionRecords,
) -> CleanResult<()> {
    let path_s = path.display().to_string();
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::CRLF)
        .from_path(path)
        .context(WritingCsvSnafu { path: &path_s })?;

    wtr.write_record(&export.header)
        .context(WritingCsvSnafu { path: &path_s })?;
    for row in export.extra_header_rows.iter() {
        wtr.write_record(row)
            .context(WritingCsvSnafu { path: &path_s })?;
    }
    for (key, record) in records.iter() {
        debug!("write_partition: {:?}", key);
        wtr.write_record(record.values())
            .context(WritingCsvSnafu { path: &path_s })?;
    }
    wtr.flush().context(FlushingCsvSnafu { path: &path_s })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_two_row_layout() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("within.csv");
        fs::write(
            &p,
            "\"LinkID\",\"Q1\"\n\"Link\",\"Question\nwith a new line\"\n\"L1\",\" a \"\n\"L2\"\n",
        )
        .unwrap();

        let export = read_export(&p, true).unwrap();
        assert_eq!(export.header, vec!["LinkID", "Q1"]);
        assert_eq!(
            export.extra_header_rows,
            vec![vec!["Link".to_string(), "Question\nwith a new line".to_string()]]
        );
        assert_eq!(
            export.records,
            vec![
                RawRecord {
                    row: 4,
                    fields: vec!["L1".to_string(), " a ".to_string()],
                },
                RawRecord {
                    row: 5,
                    fields: vec!["L2".to_string()],
                },
            ]
        );
    }

    #[test]
    fn missing_import_row() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("short.csv");
        fs::write(&p, "\"LinkID\"\n\"Link\"\n").unwrap();

        let err = read_export(&p, false).unwrap_err();
        match err {
            CleanError::MissingHeaderRow { row_name, .. } => {
                assert_eq!(row_name, "import identifiers")
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn missing_file() {
        let dir = tempdir().unwrap();
        let err = read_export(&dir.path().join("nope.csv"), false).unwrap_err();
        assert!(matches!(err, CleanError::OpeningCsv { .. }));
    }

    #[test]
    fn spaces_after_delimiters() {
        assert_eq!(
            skip_initial_space("\"a\", \"b\",  c ,\" d \"\n \"x, \"\"y\"\"\", z\r\n"),
            "\"a\",\"b\",c ,\" d \"\n\"x, \"\"y\"\"\",z\r\n"
        );
    }

    #[test]
    fn spaced_sentinel_is_rejected() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("spaced.csv");
        fs::write(
            &p,
            "\"LinkID\", \"Q99_1\", \"SONA_end\", \"Duration (in seconds)\", \"email\", \"Q1\"\n\
             \"Link\", \"Id\", \"Id again\", \"Duration\", \"Email\", \"Question\"\n\
             \"L1\", \"123456\", \"123456\", \"10\", \"\", \"x\"\n\
             \"L2\", \"5001\", \"5001\", \"20\", \"\", \" y \"\n",
        )
        .unwrap();

        let export = read_export(&p, true).unwrap();
        assert_eq!(export.records[0].fields[1], "123456");
        assert_eq!(export.records[1].fields[5], " y ");
        let res = reconcile(&export.header, export.records, &ReconcileConfig::default()).unwrap();
        assert_eq!(res.rejected.keys().collect::<Vec<_>>(), vec!["L1"]);
        assert_eq!(res.accepted.keys().collect::<Vec<_>>(), vec!["L2"]);
    }
}
