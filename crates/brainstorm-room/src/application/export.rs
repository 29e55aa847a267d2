//! Contribution export: the turn × participant table of a completed room and
//! its `;`-delimited rendering.

use brainstorm_core::error::DomainError;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::Room;

/// Byte order mark prepended to downloads so spreadsheet tools pick UTF-8.
pub const UTF8_BOM: &str = "\u{feff}";

/// Column delimiter.
pub const DELIMITER: u8 = b';';

const HEADER: [&str; 3] = ["Turn", "Participant", "Contribution"];

/// One (turn, participant) cell of the export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    /// 1-based turn.
    pub turn: u32,
    /// Participant name.
    pub participant: String,
    /// Submitted text, empty when nothing was recorded.
    pub contribution: String,
}

/// Every turn of a room crossed with its active participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTable {
    /// The exported room.
    pub room_id: Uuid,
    /// The room topic.
    pub topic: String,
    /// Rows ordered by turn, then join order.
    pub rows: Vec<ExportRow>,
}

impl ExportTable {
    /// Resolves the table for `room`. Inactive participants are left out.
    #[must_use]
    pub fn from_room(room: &Room) -> Self {
        let rows = (1..=room.turn_count())
            .flat_map(|turn| {
                room.active_participants().map(move |p| ExportRow {
                    turn,
                    participant: p.name.clone(),
                    contribution: room
                        .contribution(turn, &p.name)
                        .map(|c| c.text.clone())
                        .unwrap_or_default(),
                })
            })
            .collect();
        Self {
            room_id: room.id,
            topic: room.topic().to_owned(),
            rows,
        }
    }

    /// Renders the header and rows, one `\n`-terminated line per row.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the writer fails.
    pub fn to_delimited(&self) -> Result<String, DomainError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(HEADER).map_err(infrastructure)?;
        for row in &self.rows {
            writer
                .write_record([
                    row.turn.to_string(),
                    flatten_line_breaks(&row.participant),
                    flatten_line_breaks(&row.contribution),
                ])
                .map_err(infrastructure)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| DomainError::Infrastructure(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| DomainError::Infrastructure(e.to_string()))
    }

    /// Download file name.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("contributions_room_{}.csv", self.room_id)
    }
}

fn infrastructure(e: csv::Error) -> DomainError {
    DomainError::Infrastructure(format!("export rendering failed: {e}"))
}

/// Replaces each line break with a space; `\r\n` counts as one break.
#[must_use]
pub fn flatten_line_breaks(field: &str) -> String {
    field.replace("\r\n", " ").replace(['\r', '\n'], " ")
}
