use scraper::{ElementRef, Html};

use crate::config::WIKIPEDIA_BASE_URL;
use crate::error::{ParseError, RecordError};
use crate::extract::html::{absolute_url, first_href, first_table_after_id, row_cells, table_rows, visible_text};
use crate::extract::{decode_html, Extracted, Extractor};
use crate::types::{EventSection, StagingEvent};

/// Heading id, section, and whether rows there are cancelled cards.
const SECTIONS: &[(&str, EventSection, bool)] = &[
    ("Past_events", EventSection::Past, false),
    ("Scheduled_events", EventSection::Scheduled, false),
    ("Cancelled_events", EventSection::Scheduled, true),
];

/// Column positions inside one events table.
#[derive(Debug, Clone, Copy)]
struct Columns {
    event: usize,
    date: usize,
    venue: usize,
    location: usize,
}

impl Columns {
    /// Layout used when the table has no recognizable header row.
    fn default_for(section: EventSection) -> Self {
        match section {
            // # | Event | Date | Venue | Location | Attendance | Ref.
            EventSection::Past => Columns { event: 1, date: 2, venue: 3, location: 4 },
            // Event | Date | Venue | Location | Ref.
            EventSection::Scheduled => Columns { event: 0, date: 1, venue: 2, location: 3 },
        }
    }

    fn from_header(headers: &[String], fallback: Columns) -> Columns {
        let find = |prefix: &str| headers.iter().position(|h| h.starts_with(prefix));
        Columns {
            event: find("event").unwrap_or(fallback.event),
            date: find("date").unwrap_or(fallback.date),
            venue: find("venue").unwrap_or(fallback.venue),
            location: find("location").or_else(|| find("city")).unwrap_or(fallback.location),
        }
    }
}

/// Wikipedia "List of UFC events".
#[derive(Debug, Default, Clone, Copy)]
pub struct EventsListExtractor;

impl Extractor for EventsListExtractor {
    type Record = StagingEvent;

    fn extract(&self, raw: &[u8]) -> Result<Extracted<StagingEvent>, ParseError> {
        let doc = Html::parse_document(decode_html(raw)?);
        let mut out = Extracted::default();
        let mut found_any = false;

        for &(id, section, cancelled) in SECTIONS {
            let Some(table) = first_table_after_id(&doc, id) else {
                continue;
            };
            found_any = true;
            extract_table(table, section, cancelled, &mut out);
        }

        if !found_any {
            return Err(ParseError::MissingSection("Past_events".into()));
        }
        Ok(out)
    }
}

fn extract_table(table: ElementRef<'_>, section: EventSection, cancelled_section: bool, out: &mut Extracted<StagingEvent>) {
    let mut columns = Columns::default_for(section);
    let mut header_seen = false;

    for (i, row) in table_rows(table).into_iter().enumerate() {
        let cells = row_cells(row);
        if cells.is_empty() {
            continue;
        }

        let all_header = cells.iter().all(|c| c.value().name() == "th");
        if all_header {
            if !header_seen {
                let headers: Vec<String> = cells.iter().map(|c| visible_text(*c).to_lowercase()).collect();
                columns = Columns::from_header(&headers, columns);
                header_seen = true;
            }
            continue;
        }

        let Some(event_cell) = cells.get(columns.event) else {
            out.reject(RecordError::Parse(format!(
                "row {i}: {} cells, event column is {}",
                cells.len(),
                columns.event
            )));
            continue;
        };
        let name = visible_text(*event_cell);
        if name.is_empty() || name.eq_ignore_ascii_case("event") {
            continue;
        }

        let text_at = |idx: usize| cells.get(idx).map(|c| visible_text(*c)).unwrap_or_default();
        let date_text = text_at(columns.date);

        let struck = event_cell
            .descendants()
            .filter_map(ElementRef::wrap)
            .any(|e| matches!(e.value().name(), "s" | "del"));
        let row_text = visible_text(row).to_lowercase();
        let cancelled = cancelled_section
            || struck
            || row_text.contains("cancelled")
            || row_text.contains("canceled");

        let source_url = first_href(*event_cell)
            .filter(|href| !href.contains("redlink=1"))
            .map(|href| absolute_url(WIKIPEDIA_BASE_URL, &href));

        out.push(StagingEvent {
            name,
            date_text,
            venue: text_at(columns.venue),
            location: text_at(columns.location),
            source_url,
            section,
            cancelled,
        });
    }
}
