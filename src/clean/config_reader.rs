use crate::clean::*;

use serde::{Deserialize, Serialize};

/// The settings that can be stored in a JSON configuration file.
///
/// All the entries are optional. The paths are relative to the directory of the configuration file.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanConfig {
    #[serde(rename = "inputFile")]
    pub input_file: Option<String>,
    #[serde(rename = "outputFile")]
    pub output_file: Option<String>,
    #[serde(rename = "deletedRowsFile")]
    pub deleted_rows_file: Option<String>,
    #[serde(rename = "idBeginning")]
    pub id_beginning: Option<String>,
    #[serde(rename = "idEnd")]
    pub id_end: Option<String>,
    #[serde(rename = "isWithinParticipants")]
    pub is_within_participants: Option<bool>,
    #[serde(rename = "durationColumn")]
    pub duration_column: Option<String>,
    #[serde(rename = "emailColumn")]
    pub email_column: Option<String>,
    #[serde(rename = "linkIdColumn")]
    pub link_id_column: Option<String>,
    #[serde(rename = "testId")]
    pub test_id: Option<String>,
    #[serde(rename = "checkIdMismatch")]
    pub check_id_mismatch: Option<bool>,
    #[serde(rename = "referenceFile")]
    pub reference_file: Option<String>,
    #[serde(rename = "referenceDeletedRowsFile")]
    pub reference_deleted_rows_file: Option<String>,
}

pub fn read_config(path: &str) -> CleanResult<CleanConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: CleanConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);

    let root = Path::new(path).parent();
    let rebase = |p: Option<String>| p.map(|s| io_common::resolve_path(root, &s));
    Ok(CleanConfig {
        input_file: rebase(config.input_file),
        output_file: rebase(config.output_file),
        deleted_rows_file: rebase(config.deleted_rows_file),
        reference_file: rebase(config.reference_file),
        reference_deleted_rows_file: rebase(config.reference_deleted_rows_file),
        ..config
    })
}
