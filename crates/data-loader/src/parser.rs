//! Parser for the anime CSV export.
//!
//! The expected source is the "anime with synopsis" dump, one row per title:
//!
//! ```text
//! MAL_ID,Name,Score,Genres,sypnopsis
//! 1,Cowboy Bebop,8.78,"Action, Adventure, Comedy, Drama, Sci-Fi, Space","In the year 2071, ..."
//! ```
//!
//! Header lookup is case-insensitive and accepts a few aliases per column.
//! Only the title column is required. Extra columns are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::error::{DataLoadError, Result};
use crate::types::*;

const ID_COLUMNS: &[&str] = &["mal_id", "anime_id", "id"];
const TITLE_COLUMNS: &[&str] = &["name", "title"];
const GENRE_COLUMNS: &[&str] = &["genres", "genre"];
// The upstream dataset misspells "synopsis"
const SYNOPSIS_COLUMNS: &[&str] = &["sypnopsis", "synopsis"];

/// Column positions resolved from the header row
struct Columns {
    id: Option<usize>,
    title: usize,
    genres: Option<usize>,
    synopsis: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
        };

        let title = find(TITLE_COLUMNS).ok_or_else(|| DataLoadError::MissingColumn {
            column: "Name".to_string(),
        })?;

        Ok(Self {
            id: find(ID_COLUMNS),
            title,
            genres: find(GENRE_COLUMNS),
            synopsis: find(SYNOPSIS_COLUMNS),
        })
    }
}

/// Parse an anime CSV file into documents, in file order
pub fn parse_anime_csv(path: &Path) -> Result<Vec<AnimeDocument>> {
    let file = File::open(path).map_err(|_| DataLoadError::FileNotFound {
        path: path.display().to_string(),
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    parse_anime_reader(file, &file_name)
}

/// Parse anime CSV data from any reader.
///
/// `source` is only used in error messages.
pub fn parse_anime_reader<R: Read>(reader: R, source: &str) -> Result<Vec<AnimeDocument>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = Columns::resolve(reader.headers()?)?;
    let mut documents = Vec::new();

    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        // Header is line 1
        let line_no = idx + 2;

        let title = field(&row, Some(columns.title));
        if title.is_empty() {
            debug!("Skipping row at line {} in {}: empty title", line_no, source);
            continue;
        }

        let id = match columns.id {
            Some(_) => parse_id(field(&row, columns.id), source, line_no)?,
            None => (idx + 1) as AnimeId,
        };

        documents.push(
            AnimeDocument::new(id, title)
                .with_synopsis(field(&row, columns.synopsis))
                .with_genres(parse_genres(field(&row, columns.genres))),
        );
    }

    debug!("Parsed {} anime documents from {}", documents.len(), source);
    Ok(documents)
}

fn field(row: &StringRecord, column: Option<usize>) -> &str {
    column.and_then(|c| row.get(c)).unwrap_or("").trim()
}

fn parse_id(raw: &str, source: &str, line: usize) -> Result<AnimeId> {
    raw.parse().map_err(|e| DataLoadError::ParseError {
        file: source.to_string(),
        line,
        reason: format!("Invalid anime id {:?}: {}", raw, e),
    })
}

/// Split a comma separated genre list, dropping blanks
pub fn parse_genres(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}
