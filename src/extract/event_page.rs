use scraper::{ElementRef, Html};

use crate::error::{ParseError, RecordError};
use crate::extract::html::{first_table_after_id, row_cells, selector, table_rows, visible_text};
use crate::extract::{decode_html, Extracted, Extractor};
use crate::types::{CardType, StagingFight};

/// Heading ids that introduce the bout table, most specific first.
const RESULT_SECTION_IDS: &[&str] = &["Results", "Fight_card", "Announced_bouts"];

/// Minimum cells of a bout row: class, corner, result, corner, method, round.
const MIN_FIGHT_CELLS: usize = 6;

/// Per-event Wikipedia page.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventPageExtractor;

impl Extractor for EventPageExtractor {
    type Record = StagingFight;

    fn extract(&self, raw: &[u8]) -> Result<Extracted<StagingFight>, ParseError> {
        let doc = Html::parse_document(decode_html(raw)?);
        let table = results_table(&doc)?;
        Ok(extract_fights(table))
    }
}

fn results_table(doc: &Html) -> Result<ElementRef<'_>, ParseError> {
    for id in RESULT_SECTION_IDS {
        if let Some(table) = first_table_after_id(doc, id) {
            return Ok(table);
        }
    }

    let tables = selector("table")?;
    let header_cells = selector("th")?;
    doc.select(&tables)
        .find(|table| {
            table.select(&header_cells).any(|th| {
                let text = visible_text(th).to_lowercase();
                text.contains("main card") || text.contains("weight class")
            })
        })
        .ok_or_else(|| ParseError::MissingTable("Results".into()))
}

fn extract_fights(table: ElementRef<'_>) -> Extracted<StagingFight> {
    let mut out = Extracted::default();
    let mut card_type: Option<CardType> = None;
    let mut fight_order = 0u32;

    for row in table_rows(table) {
        let cells = row_cells(row);
        let texts: Vec<String> = cells.iter().map(|c| visible_text(*c)).collect();

        if texts.len() == 1 {
            if let Some(ct) = CardType::from_header(&texts[0]) {
                card_type = Some(ct);
                fight_order = 0;
            }
            continue;
        }
        if texts.is_empty() {
            continue;
        }

        let first = texts[0].to_lowercase();
        if first.is_empty() || first == "weight class" || CardType::from_header(&first).is_some() {
            continue;
        }
        if texts.len() < MIN_FIGHT_CELLS {
            out.reject(RecordError::Parse(format!(
                "bout row with {} cells: '{}'",
                texts.len(),
                texts.join(" | ")
            )));
            continue;
        }

        fight_order += 1;
        let cell = |i: usize| texts.get(i).cloned().unwrap_or_default();
        out.push(StagingFight {
            weight_class: cell(0),
            fighter1: cell(1),
            result_text: cell(2),
            fighter2: cell(3),
            method: cell(4),
            round_text: cell(5),
            time: cell(6),
            notes: cell(7),
            card_type,
            fight_order,
        });
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn bout(class: &str, f1: &str, result: &str, f2: &str, method: &str, round: u32, time: &str, notes: &str) -> String {
        format!(
            "<tr><td>{class}</td><td><a href=\"/wiki/x\">{f1}</a></td><td>{result}</td><td>{f2}</td><td>{method}</td><td>{round}</td><td>{time}</td><td>{notes}</td></tr>"
        )
    }

    /// A results page with a five-bout main card and a six-bout preliminary card.
    pub(crate) fn results_page_html() -> String {
        let mut rows = String::new();
        rows.push_str("<tr><th colspan=\"8\">Main card</th></tr>");
        rows.push_str("<tr><th>Weight class</th><th></th><th></th><th></th><th>Method</th><th>Round</th><th>Time</th><th>Notes</th></tr>");
        rows.push_str(&bout(
            "Light Heavyweight",
            "Alex Pereira (c)",
            "def.",
            "Jamahal Hill",
            "KO (punches)",
            1,
            "3:14",
            "For the UFC Light Heavyweight Championship.<sup class=\"reference\">[a]</sup>",
        ));
        rows.push_str(&bout(
            "Women's Strawweight",
            "Zhang Weili (c)",
            "def.",
            "Yan Xiaonan",
            "Decision (unanimous) (49–45, 49–45, 49–46)",
            5,
            "5:00",
            "For the UFC Women's Strawweight Championship.",
        ));
        rows.push_str(&bout("Lightweight", "Justin Gaethje", "def.", "Max Holloway", "KO (punch)", 5, "4:59", "For the BMF title."));
        rows.push_str(&bout("Lightweight", "Arman Tsarukyan", "def.", "Charles Oliveira", "Decision (split) (29–28, 28–29, 29–28)", 3, "5:00", ""));
        rows.push_str(&bout("Featherweight", "Bo Nickal", "def.", "Cody Brundage", "Submission (rear-naked choke)", 2, "3:38", ""));
        rows.push_str("<tr><th colspan=\"8\">Preliminary card (ESPN)</th></tr>");
        for i in 1..=6 {
            rows.push_str(&bout(
                "Bantamweight",
                &format!("Prelim Winner {i}"),
                "def.",
                &format!("Prelim Loser {i}"),
                "Decision (unanimous) (30–27, 30–27, 30–27)",
                3,
                "5:00",
                "",
            ));
        }
        format!(
            "<html><body><h1>UFC 300</h1><div class=\"mw-heading\"><h2 id=\"Results\">Results</h2></div>\
             <table class=\"toccolours\"><tbody>{rows}</tbody></table></body></html>"
        )
    }

    #[test]
    fn card_sections_restart_fight_order() {
        let out = EventPageExtractor.extract(results_page_html().as_bytes()).unwrap();
        assert_eq!(out.records.len(), 11);
        assert!(out.rejected.is_empty());

        let main: Vec<u32> = out
            .records
            .iter()
            .filter(|f| f.card_type == Some(CardType::Main))
            .map(|f| f.fight_order)
            .collect();
        assert_eq!(main, vec![1, 2, 3, 4, 5]);

        let prelims: Vec<u32> = out
            .records
            .iter()
            .filter(|f| f.card_type == Some(CardType::Preliminary))
            .map(|f| f.fight_order)
            .collect();
        assert_eq!(prelims, vec![1, 2, 3, 4, 5, 6]);

        let first = &out.records[0];
        assert_eq!(first.fighter1, "Alex Pereira (c)");
        assert_eq!(first.result_text, "def.");
        assert_eq!(first.notes, "For the UFC Light Heavyweight Championship.");
        assert_eq!(first.round_text, "1");
    }

    #[test]
    fn falls_back_to_table_with_card_headers() {
        let html = "<html><body><table><tr><th colspan=\"8\">Main card</th></tr>\
            <tr><td>Heavyweight</td><td>Tom Aspinall</td><td>def.</td><td>Curtis Blaydes</td><td>KO (punches)</td><td>1</td><td>1:00</td><td></td></tr>\
            </table></body></html>";
        let out = EventPageExtractor.extract(html.as_bytes()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].card_type, Some(CardType::Main));
    }

    #[test]
    fn missing_results_table_is_a_parse_error() {
        let html = "<html><body><h2 id=\"Background\">Background</h2><p>No bouts yet.</p></body></html>";
        let err = EventPageExtractor.extract(html.as_bytes()).unwrap_err();
        assert_eq!(err, ParseError::MissingTable("Results".into()));
    }

    #[test]
    fn short_rows_are_rejected_not_fatal() {
        let html = "<h2 id=\"Results\">Results</h2><table>\
            <tr><th colspan=\"8\">Main card</th></tr>\
            <tr><td>Heavyweight</td><td>Tom Aspinall</td><td>vs.</td></tr>\
            <tr><td>Heavyweight</td><td>Tom Aspinall</td><td>vs.</td><td>Curtis Blaydes</td><td></td><td></td></tr>\
            </table>";
        let out = EventPageExtractor.extract(html.as_bytes()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.records[0].fight_order, 1);
    }
}
