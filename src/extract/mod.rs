//! Source-specific extractors. Pure over their input: bytes in, staging
//! records out, no store access and no I/O.

pub mod event_page;
pub mod events_list;
pub mod html;
pub mod profile;
pub mod rankings;
pub mod stats_archive;

pub use event_page::EventPageExtractor;
pub use events_list::EventsListExtractor;
pub use profile::FighterProfileExtractor;
pub use rankings::RankingsExtractor;
pub use stats_archive::StatsArchiveExtractor;

use crate::error::{ParseError, RecordError};

/// Records recovered from one payload plus the rows that were skipped.
#[derive(Debug, Clone)]
pub struct Extracted<R> {
    pub records: Vec<R>,
    pub rejected: Vec<RecordError>,
}

impl<R> Default for Extracted<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<R> Extracted<R> {
    pub fn push(&mut self, record: R) {
        self.records.push(record);
    }

    pub fn reject(&mut self, err: RecordError) {
        tracing::debug!("[EXTRACT] skipped row: {err}");
        self.rejected.push(err);
    }
}

pub trait Extractor {
    type Record;

    /// A payload-level `ParseError` means the expected structure is absent;
    /// row-level problems end up in `Extracted::rejected`.
    fn extract(&self, raw: &[u8]) -> Result<Extracted<Self::Record>, ParseError>;
}

/// Both HTML sources serve UTF-8.
pub(crate) fn decode_html(raw: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(raw).map_err(|_| ParseError::Encoding)
}
