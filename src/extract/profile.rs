use scraper::{ElementRef, Html, Selector};

use crate::error::ParseError;
use crate::extract::html::{selector, visible_text};
use crate::extract::rankings::strip_soft_hyphens;
use crate::extract::{decode_html, Extracted, Extractor};
use crate::types::StagingProfile;

/// Labels of the `<li><span class="text">..</span><span class="sub">..</span></li>` facts list.
const BIRTH_LABELS: &[&str] = &["дата рождения", "родился", "родилась"];
const COUNTRY_LABELS: &[&str] = &["страна"];

struct Selectors {
    name_ru: Selector,
    heading: Selector,
    name_en: Selector,
    country: Selector,
    record: Selector,
    birth_date: Selector,
    fact: Selector,
    fact_label: Selector,
    fact_value: Selector,
}

impl Selectors {
    fn new() -> Result<Self, ParseError> {
        Ok(Self {
            name_ru: selector("h1.fighter-name")?,
            heading: selector("h1, h2")?,
            name_en: selector(".fighter-latin-name, .fighter-eng-name, .eng-name")?,
            country: selector(".fighter-country-name")?,
            record: selector(".fight-score")?,
            birth_date: selector("[itemprop=\"birthDate\"]")?,
            fact: selector("li")?,
            fact_label: selector("span.text")?,
            fact_value: selector("span.sub")?,
        })
    }
}

/// fight.ru fighter profile page. Yields exactly one record.
#[derive(Debug, Default, Clone, Copy)]
pub struct FighterProfileExtractor;

impl Extractor for FighterProfileExtractor {
    type Record = StagingProfile;

    fn extract(&self, raw: &[u8]) -> Result<Extracted<StagingProfile>, ParseError> {
        let html = strip_soft_hyphens(decode_html(raw)?);
        let doc = Html::parse_document(&html);
        let sel = Selectors::new()?;

        let text_of = |s: &Selector| {
            doc.select(s)
                .map(visible_text)
                .find(|t| !t.is_empty())
        };

        let name_ru = text_of(&sel.name_ru).or_else(|| text_of(&sel.heading));
        let name_en = doc
            .select(&sel.name_en)
            .map(visible_text)
            .find(|t| is_latin_name(t));
        if name_ru.is_none() && name_en.is_none() {
            return Err(ParseError::MissingSection("fighter-name".into()));
        }

        let facts: Vec<(String, String)> = doc
            .select(&sel.fact)
            .filter_map(|li| fact(li, &sel))
            .collect();
        let fact_for = |labels: &[&str]| {
            facts
                .iter()
                .find(|(label, _)| labels.iter().any(|l| label.contains(l)))
                .map(|(_, value)| value.clone())
        };

        let birth_date = doc
            .select(&sel.birth_date)
            .find_map(|el| {
                let v = el.value();
                v.attr("content")
                    .or_else(|| v.attr("datetime"))
                    .map(str::to_string)
                    .or_else(|| Some(visible_text(el)))
                    .filter(|t| !t.trim().is_empty())
            })
            .or_else(|| fact_for(BIRTH_LABELS));

        let mut out = Extracted::default();
        out.push(StagingProfile {
            name_ru,
            name_en,
            country: text_of(&sel.country).or_else(|| fact_for(COUNTRY_LABELS)),
            record: text_of(&sel.record),
            birth_date,
        });
        Ok(out)
    }
}

fn fact(li: ElementRef<'_>, sel: &Selectors) -> Option<(String, String)> {
    let label = visible_text(li.select(&sel.fact_label).next()?).to_lowercase();
    let value = visible_text(li.select(&sel.fact_value).next()?);
    if label.is_empty() || value.is_empty() || value.chars().count() > 100 {
        return None;
    }
    Some((label, value))
}

fn is_latin_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().count() < 50
        && s.chars()
            .all(|c| c.is_ascii_alphabetic() || matches!(c, ' ' | '.' | '-' | '\''))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const PROFILE_HTML: &str = r#"<html><head>
<meta itemprop="birthDate" content="1991-10-27">
</head><body>
<h1 class="fighter-name">Ис&shy;лам Махачев</h1>
<div class="fighter-latin-name">Islam Makhachev</div>
<div class="fighter-country"><span class="fighter-country-name">Россия</span></div>
<div class="fight-score">26-1-0</div>
<ul>
  <li><span class="text">Рост / Вес</span><span class="sub">178 см / 70 кг</span></li>
  <li><span class="text">Ник</span><span class="sub">Ислам</span></li>
</ul>
</body></html>"#;

    #[test]
    fn names_country_record_and_birth_date() {
        let out = FighterProfileExtractor.extract(PROFILE_HTML.as_bytes()).unwrap();
        assert_eq!(out.records.len(), 1);
        let p = &out.records[0];
        assert_eq!(p.name_ru.as_deref(), Some("Ислам Махачев"));
        assert_eq!(p.name_en.as_deref(), Some("Islam Makhachev"));
        assert_eq!(p.country.as_deref(), Some("Россия"));
        assert_eq!(p.record.as_deref(), Some("26-1-0"));
        assert_eq!(p.birth_date.as_deref(), Some("1991-10-27"));
    }

    #[test]
    fn facts_list_fills_missing_microdata() {
        let html = "<h2>Умар Нурмагомедов</h2>\
            <span class=\"eng-name\">Умар</span>\
            <ul><li><span class=\"text\">Дата рождения</span><span class=\"sub\">1996-01-03</span></li>\
            <li><span class=\"text\">Страна</span><span class=\"sub\">Россия</span></li></ul>";
        let out = FighterProfileExtractor.extract(html.as_bytes()).unwrap();
        let p = &out.records[0];
        assert_eq!(p.name_ru.as_deref(), Some("Умар Нурмагомедов"));
        assert_eq!(p.name_en, None, "cyrillic text is not a latin name");
        assert_eq!(p.birth_date.as_deref(), Some("1996-01-03"));
        assert_eq!(p.country.as_deref(), Some("Россия"));
        assert_eq!(p.record, None);
    }

    #[test]
    fn page_without_a_name_is_a_parse_error() {
        let err = FighterProfileExtractor.extract(b"<html><body><p>404</p></body></html>").unwrap_err();
        assert_eq!(err, ParseError::MissingSection("fighter-name".into()));
    }
}
