//! DOM helpers shared by the HTML extractors.

use scraper::{ElementRef, Html, Selector};

use crate::error::ParseError;
use crate::normalize::clean_text;

pub fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::BadSelector(css.to_string()))
}

/// Text a reader would see: hidden sort keys, footnote superscripts and
/// `<style>` blocks are skipped, `<br>` becomes a space.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_visible(el, &mut out);
    clean_text(&out)
}

fn collect_visible(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if is_hidden(child_el) {
                continue;
            }
            if child_el.value().name() == "br" {
                out.push(' ');
                continue;
            }
            collect_visible(child_el, out);
        }
    }
}

fn is_hidden(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if matches!(v.name(), "style" | "script") {
        return true;
    }
    if v.name() == "sup" && v.classes().any(|c| c == "reference") {
        return true;
    }
    if v.classes().any(|c| c == "sortkey") {
        return true;
    }
    v.attr("style")
        .map(|s| s.replace(' ', "").to_lowercase().contains("display:none"))
        .unwrap_or(false)
}

pub fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// First `<table>` that follows (in document order) the element carrying `id`.
pub fn first_table_after_id<'a>(doc: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    let mut anchor_seen = false;
    for node in doc.root_element().descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if !anchor_seen {
            anchor_seen = el.value().id() == Some(id);
            continue;
        }
        if el.value().name() == "table" {
            return Some(el);
        }
    }
    None
}

pub fn has_id(doc: &Html, id: &str) -> bool {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().id() == Some(id))
}

/// `<td>`/`<th>` children of a row, in order.
pub fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

/// Rows that belong to `table` itself, skipping rows of nested tables.
pub fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|r| r.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

/// `href` of the first link inside `el`.
pub fn first_href(el: ElementRef<'_>) -> Option<String> {
    el.descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "a")
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("{base}{href}")
    } else {
        format!("{base}/{href}")
    }
}
