use clap::Parser;

/// Merges the partial rows of a survey export into one row per participant, and moves the
/// test submissions to a separate file.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file with the settings of the cleaning. Paths in this file are relative
    /// to the directory of the file. Any flag given on the command line overrides the corresponding setting.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The CSV export to clean.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (file path, default output_<input>.csv) Where to write the merged rows of the participants.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path, default output_<input>_deleted_rows.csv) Where to write the test submissions.
    /// The file is only written if at least one test submission was found.
    #[clap(long, value_parser)]
    pub out_deleted: Option<String>,

    /// (default Q99_1) The column with the identifier entered at the beginning of the session.
    #[clap(long, value_parser)]
    pub id_beginning: Option<String>,

    /// (default SONA_end) The column with the identifier entered at the end of the session.
    #[clap(long, value_parser)]
    pub id_end: Option<String>,

    /// If passed, the export has only 2 header rows (within participants flows). Otherwise the
    /// third row with the import identifiers is expected.
    #[clap(long, takes_value = false)]
    pub within_participants: bool,

    /// (default "Duration (in seconds)") The column with the durations, summed over the rows of a participant.
    #[clap(long, value_parser)]
    pub duration_column: Option<String>,

    /// (default email) The column with the contact address. Only the first of comma-separated values is kept.
    #[clap(long, value_parser)]
    pub email_column: Option<String>,

    /// (default LinkID) The column that links the rows of the same participant.
    #[clap(long, value_parser)]
    pub link_id_column: Option<String>,

    /// (default 123456) The identifier used for test submissions.
    #[clap(long, value_parser)]
    pub test_id: Option<String>,

    /// If passed, reports the rows where the beginning and end identifiers differ.
    #[clap(long, takes_value = false)]
    pub check_id_mismatch: bool,

    /// (file path) A reference file for the merged rows. If provided, the output must match it.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path) A reference file for the test submissions. If provided, the output must match it.
    #[clap(long, value_parser)]
    pub reference_deleted: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
