use scraper::{ElementRef, Html, Selector};

use crate::config::FIGHT_RU_BASE_URL;
use crate::error::{ParseError, RecordError};
use crate::extract::html::{absolute_url, first_href, has_class, selector, visible_text};
use crate::extract::{decode_html, Extracted, Extractor};
use crate::types::{RankMove, StagingRankedFighter, StagingRankingList};

/// Heading texts of blocks that are navigation, not a weight class.
const SKIPPED_HEADINGS: &[&str] = &["Весовая категория", "Все"];

/// fight.ru ships `&shy;` inside proper names; strip before the DOM sees them.
pub fn strip_soft_hyphens(html: &str) -> String {
    html.replace("&shy;", "").replace('\u{00ad}', "")
}

struct Selectors {
    block: Selector,
    weight_name: Selector,
    champion: Selector,
    contender: Selector,
    name: Selector,
    number: Selector,
    mv: Selector,
    record: Selector,
    country: Selector,
}

impl Selectors {
    fn new() -> Result<Self, ParseError> {
        Ok(Self {
            block: selector("div.org-single")?,
            weight_name: selector("div.weight-name")?,
            champion: selector("div.first-fighter")?,
            contender: selector("div.next-fighter")?,
            name: selector("div.fighter-name")?,
            number: selector("div.fighter-number")?,
            mv: selector("div.move")?,
            record: selector(".fighter-record")?,
            country: selector(".fighter-country")?,
        })
    }
}

/// fight.ru UFC ratings page.
#[derive(Debug, Default, Clone, Copy)]
pub struct RankingsExtractor;

impl Extractor for RankingsExtractor {
    type Record = StagingRankingList;

    fn extract(&self, raw: &[u8]) -> Result<Extracted<StagingRankingList>, ParseError> {
        let html = strip_soft_hyphens(decode_html(raw)?);
        let doc = Html::parse_document(&html);
        let sel = Selectors::new()?;

        let mut out = Extracted::default();
        let mut blocks = 0usize;
        for block in doc.select(&sel.block) {
            blocks += 1;
            let Some(heading) = block.select(&sel.weight_name).next() else {
                continue;
            };
            let weight_class = visible_text(heading);
            if weight_class.is_empty() || SKIPPED_HEADINGS.contains(&weight_class.as_str()) {
                continue;
            }

            let mut fighters = Vec::new();
            if let Some(champion) = block.select(&sel.champion).next() {
                match ranked_fighter(champion, Some(0), &sel) {
                    Ok(f) => fighters.push(f),
                    Err(e) => out.reject(e),
                }
            }
            for contender in block.select(&sel.contender) {
                let position = contender
                    .select(&sel.number)
                    .next()
                    .map(visible_text)
                    .and_then(|n| n.parse::<u32>().ok());
                let Some(position) = position else {
                    out.reject(RecordError::Parse(format!(
                        "{weight_class}: contender without a rank number"
                    )));
                    continue;
                };
                match ranked_fighter(contender, Some(position), &sel) {
                    Ok(f) => fighters.push(f),
                    Err(e) => out.reject(e),
                }
            }

            if fighters.is_empty() {
                continue;
            }
            out.push(StagingRankingList { weight_class, fighters });
        }

        if blocks == 0 {
            return Err(ParseError::MissingSection("org-single".into()));
        }
        Ok(out)
    }
}

fn ranked_fighter(el: ElementRef<'_>, position: Option<u32>, sel: &Selectors) -> Result<StagingRankedFighter, RecordError> {
    let name = el
        .select(&sel.name)
        .next()
        .map(visible_text)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RecordError::Parse("ranked fighter without a name".into()))?;
    let rank_position = position.ok_or_else(|| RecordError::Parse(format!("{name}: no rank position")))?;

    let optional_text = |s: &Selector| {
        el.select(s)
            .next()
            .map(visible_text)
            .filter(|t| !t.is_empty())
    };

    Ok(StagingRankedFighter {
        rank_move: el.select(&sel.mv).next().map(parse_move).unwrap_or(RankMove::Steady),
        record: optional_text(&sel.record),
        country: optional_text(&sel.country),
        profile_url: first_href(el).map(|href| absolute_url(FIGHT_RU_BASE_URL, &href)),
        name,
        rank_position,
    })
}

fn parse_move(el: ElementRef<'_>) -> RankMove {
    let digits: String = visible_text(el).chars().filter(|c| c.is_ascii_digit()).collect();
    let Ok(n) = digits.parse::<u32>() else {
        return RankMove::Steady;
    };
    if n == 0 {
        RankMove::Steady
    } else if has_class(el, "up") {
        RankMove::Up(n)
    } else if has_class(el, "down") {
        RankMove::Down(n)
    } else {
        RankMove::Steady
    }
}
