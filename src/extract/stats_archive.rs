//! Best-effort decoder for the round statistics archive.
//!
//! The archive is an R workspace (`.rda`): gzip around the XDR serialization of
//! one data frame. No R runtime is involved. Fighter names are recovered from
//! printable byte runs; numeric and string columns are recovered by scanning for
//! XDR vector headers and keeping the vectors whose length matches the most
//! common column length. Anything that cannot be recovered is left as `None`.

use std::collections::HashMap;
use std::io::Read;

use chrono::{Duration, NaiveDate};
use flate2::read::GzDecoder;

use crate::error::{ParseError, RecordError};
use crate::extract::{Extracted, Extractor};
use crate::types::{ArchiveRecord, RoundCounters, StagingRoundStat};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// XDR SEXP type codes.
const LGLSXP: u32 = 10;
const CHARSXP: u32 = 9;
const INTSXP: u32 = 13;
const REALSXP: u32 = 14;
const STRSXP: u32 = 16;

/// Attribute bit of the packed SEXP flags word.
const HAS_ATTR: u32 = 1 << 9;
/// Bits a plain column vector may carry: type, object, attribute.
const VECTOR_FLAG_MASK: u32 = 0xFF | (1 << 8) | HAS_ATTR;

const R_NA_INT: i32 = i32::MIN;

const NAME_RUN_MIN: usize = 10;
const NAME_RUN_MAX: usize = 50;
const NAME_BLACKLIST: &[&str] = &["bout", "title", "tournament", "ufc", "fight"];

/// Archive column → counter column.
const COUNTER_COLUMNS: &[(&str, &str)] = &[
    ("knockdowns", "knockdowns"),
    ("significant_strikes_landed", "significant_strikes_landed"),
    ("significant_strikes_attempted", "significant_strikes_attempted"),
    ("total_strikes_landed", "total_strikes_landed"),
    ("total_strikes_attempted", "total_strikes_attempted"),
    ("takedown_successful", "takedowns_successful"),
    ("takedown_attempted", "takedowns_attempted"),
    ("submission_attempt", "submission_attempts"),
    ("reversals", "reversals"),
    ("head_landed", "head_landed"),
    ("head_attempted", "head_attempted"),
    ("body_landed", "body_landed"),
    ("body_attempted", "body_attempted"),
    ("leg_landed", "leg_landed"),
    ("leg_attempted", "leg_attempted"),
    ("distance_landed", "distance_landed"),
    ("distance_attempted", "distance_attempted"),
    ("clinch_landed", "clinch_landed"),
    ("clinch_attempted", "clinch_attempted"),
    ("ground_landed", "ground_landed"),
    ("ground_attempted", "ground_attempted"),
    ("control_time_seconds", "control_time_seconds"),
];

/// Column names that identify the names attribute of the data frame.
const MARKER_COLUMNS: &[&str] = &["significant_strikes_landed", "knockdowns", "fighter"];

#[derive(Debug, Default, Clone, Copy)]
pub struct StatsArchiveExtractor;

impl Extractor for StatsArchiveExtractor {
    type Record = ArchiveRecord;

    fn extract(&self, raw: &[u8]) -> Result<Extracted<ArchiveRecord>, ParseError> {
        let data = if raw.starts_with(&GZIP_MAGIC) {
            let mut buf = Vec::new();
            GzDecoder::new(raw)
                .read_to_end(&mut buf)
                .map_err(|_| ParseError::Encoding)?;
            buf
        } else {
            raw.to_vec()
        };

        let mut out = Extracted::default();
        for name in scan_names(&data) {
            out.push(ArchiveRecord::FighterName(name));
        }
        if is_xdr(&data) {
            for row in decode_rows(&data, &mut out.rejected) {
                out.push(ArchiveRecord::Round(row));
            }
        } else {
            tracing::debug!("[STATS] archive is not XDR-serialized; names only");
        }
        Ok(out)
    }
}

fn is_xdr(data: &[u8]) -> bool {
    data.starts_with(b"RDX2\nX\n") || data.starts_with(b"RDX3\nX\n") || data.starts_with(b"X\n")
}

// ---------------------------------------------------------------------------
// Name scanning
// ---------------------------------------------------------------------------

/// Maximal printable-ASCII runs of 10..=50 bytes that pass the blacklist,
/// deduplicated in first-seen order.
pub fn scan_names(data: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut start = None;

    for (i, &b) in data.iter().chain(std::iter::once(&0u8)).enumerate() {
        let printable = (0x20..=0x7e).contains(&b);
        match (printable, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                start = None;
                let run = &data[s..i];
                if !(NAME_RUN_MIN..=NAME_RUN_MAX).contains(&run.len()) {
                    continue;
                }
                let text = String::from_utf8_lossy(run).trim().to_string();
                if text.len() >= NAME_RUN_MIN && !is_blacklisted(&text) && seen.insert(text.clone()) {
                    names.push(text);
                }
            }
            _ => {}
        }
    }
    names
}

fn is_blacklisted(text: &str) -> bool {
    let lc = text.to_lowercase();
    if lc.split(|c: char| !c.is_ascii_alphanumeric()).any(|w| w == "vs") {
        return true;
    }
    NAME_BLACKLIST.iter().any(|w| lc.contains(w))
}

// ---------------------------------------------------------------------------
// XDR vector scanning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum ColumnData {
    Real(Vec<f64>),
    Int(Vec<Option<i64>>),
    Str(Vec<Option<String>>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Real(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    fn int_at(&self, i: usize) -> Option<i64> {
        match self {
            ColumnData::Real(v) => v.get(i).filter(|x| x.is_finite()).map(|x| x.round() as i64),
            ColumnData::Int(v) => v.get(i).copied().flatten(),
            ColumnData::Str(v) => v.get(i).cloned().flatten().and_then(|s| s.trim().parse().ok()),
        }
    }

    fn str_at(&self, i: usize) -> Option<String> {
        match self {
            ColumnData::Str(v) => v.get(i).cloned().flatten().filter(|s| !s.is_empty()),
            ColumnData::Int(v) => v.get(i).copied().flatten().map(|x| x.to_string()),
            ColumnData::Real(v) => v.get(i).filter(|x| x.is_finite()).map(|x| {
                if x.fract() == 0.0 {
                    format!("{}", *x as i64)
                } else {
                    x.to_string()
                }
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct Vector {
    has_attr: bool,
    data: ColumnData,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u32(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> Option<i32> {
        self.u32().map(|v| v as i32)
    }

    fn f64(&mut self) -> Option<f64> {
        let bytes = self.data.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Some(f64::from_be_bytes(buf))
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(bytes)
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }
}

/// Try to read one atomic vector starting at `pos`. Returns the vector and the
/// offset just past it.
fn read_vector(data: &[u8], pos: usize) -> Option<(Vector, usize)> {
    let mut cur = Cursor { data, pos };
    let flags = cur.u32()?;
    if flags & !VECTOR_FLAG_MASK != 0 {
        return None;
    }
    let sexp_type = flags & 0xFF;
    let len = cur.i32()?;
    if len <= 0 {
        return None;
    }
    let len = len as usize;

    let data = match sexp_type {
        REALSXP => {
            if cur.remaining() < len.checked_mul(8)? {
                return None;
            }
            let values = (0..len).map(|_| cur.f64()).collect::<Option<Vec<_>>>()?;
            ColumnData::Real(values)
        }
        INTSXP | LGLSXP => {
            if cur.remaining() < len.checked_mul(4)? {
                return None;
            }
            let values = (0..len)
                .map(|_| cur.i32().map(|v| (v != R_NA_INT).then_some(i64::from(v))))
                .collect::<Option<Vec<_>>>()?;
            ColumnData::Int(values)
        }
        STRSXP => {
            if cur.remaining() < len.checked_mul(8)? {
                return None;
            }
            let mut values = Vec::with_capacity(len);
            for _ in 0..len {
                let char_flags = cur.u32()?;
                if char_flags & 0xFF != CHARSXP {
                    return None;
                }
                let n = cur.i32()?;
                if n == -1 {
                    values.push(None);
                    continue;
                }
                let n = usize::try_from(n).ok()?;
                let bytes = cur.bytes(n)?;
                values.push(Some(String::from_utf8_lossy(bytes).into_owned()));
            }
            ColumnData::Str(values)
        }
        _ => return None,
    };

    Some((
        Vector {
            has_attr: flags & HAS_ATTR != 0,
            data,
        },
        cur.pos,
    ))
}

fn scan_vectors(data: &[u8]) -> Vec<Vector> {
    let mut vectors = Vec::new();
    let mut pos = 0;
    while pos + 8 <= data.len() {
        match read_vector(data, pos) {
            Some((v, next)) => {
                vectors.push(v);
                pos = next;
            }
            None => pos += 1,
        }
    }
    vectors
}

/// Named columns of the data frame, factors decoded to their levels.
fn recover_columns(data: &[u8]) -> Option<HashMap<String, ColumnData>> {
    let vectors = scan_vectors(data);

    let names_idx = vectors.iter().position(|v| match &v.data {
        ColumnData::Str(values) => MARKER_COLUMNS
            .iter()
            .any(|m| values.iter().any(|s| s.as_deref() == Some(*m))),
        _ => false,
    })?;
    let names: Vec<String> = match &vectors[names_idx].data {
        ColumnData::Str(values) => values.iter().map(|s| s.clone().unwrap_or_default()).collect(),
        _ => return None,
    };

    let mut length_counts: HashMap<usize, usize> = HashMap::new();
    for v in &vectors[..names_idx] {
        if v.data.len() > 1 {
            *length_counts.entry(v.data.len()).or_default() += 1;
        }
    }
    let rows = length_counts
        .into_iter()
        .max_by_key(|&(len, count)| (count, len))
        .map(|(len, _)| len)?;

    let mut columns = Vec::new();
    let mut i = 0;
    while i < names_idx {
        let v = &vectors[i];
        if v.data.len() != rows {
            i += 1;
            continue;
        }
        // A factor is an integer vector whose attributes start with its levels.
        let levels = match (&v.data, vectors.get(i + 1)) {
            (ColumnData::Int(_), Some(next)) if v.has_attr && i + 1 < names_idx && next.data.len() != rows => {
                match &next.data {
                    ColumnData::Str(levels) => Some(levels),
                    _ => None,
                }
            }
            _ => None,
        };
        let column = match (levels, &v.data) {
            (Some(levels), ColumnData::Int(codes)) => ColumnData::Str(
                codes
                    .iter()
                    .map(|c| {
                        c.and_then(|c| usize::try_from(c - 1).ok())
                            .and_then(|idx| levels.get(idx).cloned().flatten())
                    })
                    .collect(),
            ),
            _ => v.data.clone(),
        };
        columns.push(column);
        i += 1;
    }

    if columns.len() != names.len() {
        tracing::debug!(
            "[STATS] recovered {} columns for {} names; skipping numeric series",
            columns.len(),
            names.len()
        );
        return None;
    }
    Some(names.into_iter().zip(columns).collect())
}

fn days_to_iso(days: i64) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    epoch
        .checked_add_signed(Duration::try_days(days)?)
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn decode_rows(data: &[u8], rejected: &mut Vec<RecordError>) -> Vec<StagingRoundStat> {
    let Some(columns) = recover_columns(data) else {
        return Vec::new();
    };
    let col = |name: &str| columns.get(name);
    let Some(fighter_col) = col("fighter") else {
        tracing::debug!("[STATS] no fighter column recovered");
        return Vec::new();
    };
    let rows = fighter_col.len();
    let key_col = col("id").or_else(|| col("fight_id"));
    let date_col = col("fight_date").or_else(|| col("date"));

    let mut out = Vec::with_capacity(rows);
    for i in 0..rows {
        let Some(fighter) = fighter_col.str_at(i) else {
            rejected.push(RecordError::Parse(format!("archive row {i} without a fighter")));
            continue;
        };

        let mut counters = RoundCounters::default();
        for (source, column) in COUNTER_COLUMNS {
            counters.set(column, col(*source).and_then(|c| c.int_at(i)));
        }

        let winner = col("winner").and_then(|c| match c.str_at(i)?.trim() {
            "W" | "w" | "1" | "TRUE" => Some(true),
            "L" | "l" | "0" | "FALSE" => Some(false),
            _ => None,
        });

        let fight_date = date_col.and_then(|c| match c {
            ColumnData::Str(_) => c.str_at(i),
            _ => c.int_at(i).and_then(days_to_iso),
        });

        out.push(StagingRoundStat {
            fight_key: key_col.and_then(|c| c.str_at(i)),
            event_name: col("event").and_then(|c| c.str_at(i)),
            fight_date,
            fighter,
            opponent: None,
            round: col("round").and_then(|c| c.int_at(i)),
            counters,
            winner,
        });
    }

    assign_opponents(&mut out);
    out
}

/// Rows sharing a fight key with exactly two distinct fighters face each other.
fn assign_opponents(rows: &mut [StagingRoundStat]) {
    let mut corners: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows.iter() {
        if let Some(key) = &row.fight_key {
            let names = corners.entry(key.clone()).or_default();
            if !names.contains(&row.fighter) {
                names.push(row.fighter.clone());
            }
        }
    }
    for row in rows.iter_mut() {
        let Some(names) = row.fight_key.as_ref().and_then(|k| corners.get(k)) else {
            continue;
        };
        if names.len() == 2 {
            row.opponent = names.iter().find(|n| **n != row.fighter).cloned();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Minimal XDR writer for building archive fixtures.
    pub(crate) struct Xdr(Vec<u8>);

    pub(crate) enum Col<'a> {
        Real(&'a [f64]),
        Int(&'a [i32]),
        Str(&'a [&'a str]),
        Factor(&'a [i32], &'a [&'a str]),
    }

    impl Xdr {
        pub(crate) fn new() -> Self {
            let mut x = Xdr(b"RDX3\nX\n".to_vec());
            x.int(3);
            x.int(0x0004_0300);
            x.int(0x0003_0500);
            x.int(5);
            x.0.extend_from_slice(b"UTF-8");
            x
        }

        fn int(&mut self, v: i32) {
            self.0.extend_from_slice(&v.to_be_bytes());
        }

        fn charsxp(&mut self, s: &str) {
            self.int(0x0004_0009);
            self.int(s.len() as i32);
            self.0.extend_from_slice(s.as_bytes());
        }

        fn symbol(&mut self, s: &str) {
            self.int(1);
            self.charsxp(s);
        }

        fn strsxp(&mut self, values: &[&str]) {
            self.int(STRSXP as i32);
            self.int(values.len() as i32);
            for v in values {
                self.charsxp(v);
            }
        }

        fn column(&mut self, col: &Col<'_>) {
            match col {
                Col::Real(values) => {
                    self.int(REALSXP as i32);
                    self.int(values.len() as i32);
                    for v in *values {
                        self.0.extend_from_slice(&v.to_be_bytes());
                    }
                }
                Col::Int(values) => {
                    self.int(INTSXP as i32);
                    self.int(values.len() as i32);
                    for v in *values {
                        self.int(*v);
                    }
                }
                Col::Str(values) => self.strsxp(values),
                Col::Factor(codes, levels) => {
                    self.int(INTSXP as i32 | HAS_ATTR as i32 | (1 << 8));
                    self.int(codes.len() as i32);
                    for c in *codes {
                        self.int(*c);
                    }
                    self.int(0x0000_0402);
                    self.symbol("levels");
                    self.strsxp(levels);
                    self.int(0x0000_0402);
                    self.symbol("class");
                    self.strsxp(&["factor"]);
                    self.int(0x0000_00FE);
                }
            }
        }

        /// Data frame with the given named columns, wrapped like `save()` does.
        pub(crate) fn data_frame(mut self, cols: &[(&str, Col<'_>)]) -> Vec<u8> {
            self.int(0x0000_0402);
            self.symbol("ufc_stats");
            self.int(19 | HAS_ATTR as i32 | (1 << 8));
            self.int(cols.len() as i32);
            for (_, c) in cols {
                self.column(c);
            }
            self.int(0x0000_0402);
            self.symbol("names");
            let names: Vec<&str> = cols.iter().map(|(n, _)| *n).collect();
            self.strsxp(&names);
            self.int(0x0000_00FE);
            self.0
        }
    }

    pub(crate) fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    /// Two fights, two rounds each for the first, one round for the second.
    pub(crate) fn sample_archive() -> Vec<u8> {
        let fighters = [
            "Alex Pereira",
            "Jamahal Hill",
            "Alex Pereira",
            "Jamahal Hill",
            "Justin Gaethje",
            "Max Holloway",
        ];
        let xdr = Xdr::new().data_frame(&[
            ("fighter", Col::Str(&fighters)),
            ("knockdowns", Col::Real(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0])),
            ("significant_strikes_landed", Col::Real(&[12.0, 5.0, 20.0, 18.0, 30.0, 25.0])),
            ("significant_strikes_attempted", Col::Real(&[20.0, 15.0, 40.0, 36.0, 60.0, 70.0])),
            ("takedown_successful", Col::Int(&[0, 0, 1, R_NA_INT, 0, 0])),
            ("takedown_attempted", Col::Int(&[0, 1, 2, R_NA_INT, 0, 3])),
            ("round", Col::Int(&[1, 1, 2, 2, 1, 1])),
            ("winner", Col::Factor(&[2, 1, 2, 1, 2, 1], &["L", "W"])),
            ("id", Col::Int(&[101, 101, 101, 101, 202, 202])),
            ("event", Col::Str(&[
                "UFC 300: Pereira vs. Hill",
                "UFC 300: Pereira vs. Hill",
                "UFC 300: Pereira vs. Hill",
                "UFC 300: Pereira vs. Hill",
                "UFC 300: Pereira vs. Hill",
                "UFC 300: Pereira vs. Hill",
            ])),
            ("fight_date", Col::Real(&[19826.0; 6])),
        ]);
        gzip(&xdr)
    }

    #[test]
    fn recovers_rows_opponents_and_factors() {
        let out = StatsArchiveExtractor.extract(&sample_archive()).unwrap();
        let rounds: Vec<&StagingRoundStat> = out
            .records
            .iter()
            .filter_map(|r| match r {
                ArchiveRecord::Round(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(rounds.len(), 6);

        let first = rounds[0];
        assert_eq!(first.fighter, "Alex Pereira");
        assert_eq!(first.opponent.as_deref(), Some("Jamahal Hill"));
        assert_eq!(first.round, Some(1));
        assert_eq!(first.winner, Some(true));
        assert_eq!(first.counters.knockdowns, Some(1));
        assert_eq!(first.counters.significant_strikes_landed, Some(12));
        assert_eq!(first.counters.significant_strikes_attempted, Some(20));
        assert_eq!(first.fight_key.as_deref(), Some("101"));
        assert_eq!(first.event_name.as_deref(), Some("UFC 300: Pereira vs. Hill"));
        assert_eq!(first.fight_date.as_deref(), Some("2024-04-13"));

        assert_eq!(rounds[1].winner, Some(false));
        assert_eq!(rounds[3].counters.takedowns_successful, None);
        assert_eq!(rounds[5].opponent.as_deref(), Some("Justin Gaethje"));
    }

    #[test]
    fn scanned_names_skip_blacklisted_runs() {
        let out = StatsArchiveExtractor.extract(&sample_archive()).unwrap();
        let names: Vec<&str> = out
            .records
            .iter()
            .filter_map(|r| match r {
                ArchiveRecord::FighterName(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"Alex Pereira"));
        assert!(names.contains(&"Justin Gaethje"));
        assert!(!names.iter().any(|n| n.contains("UFC 300")));
    }

    #[test]
    fn garbage_yields_names_only() {
        let mut bytes = b"\x00\x01Khabib Nurmagomedov\x00\xff\xfe".to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        let out = StatsArchiveExtractor.extract(&bytes).unwrap();
        assert_eq!(
            out.records,
            vec![ArchiveRecord::FighterName("Khabib Nurmagomedov".into())]
        );
    }

    #[test]
    fn out_of_range_dates_are_dropped() {
        let xdr = Xdr::new().data_frame(&[
            ("fighter", Col::Str(&["Alex Pereira", "Jamahal Hill"])),
            ("round", Col::Int(&[1, 1])),
            ("fight_date", Col::Real(&[1e300, 19826.0])),
        ]);
        let out = StatsArchiveExtractor.extract(&gzip(&xdr)).unwrap();
        let dates: Vec<Option<&str>> = out
            .records
            .iter()
            .filter_map(|r| match r {
                ArchiveRecord::Round(s) => Some(s.fight_date.as_deref()),
                _ => None,
            })
            .collect();
        assert_eq!(dates, vec![None, Some("2024-04-13")]);
        assert_eq!(days_to_iso(i64::MAX), None);
        assert_eq!(days_to_iso(-1), Some("1969-12-31".to_string()));
    }

    #[test]
    fn broken_gzip_is_a_parse_error() {
        let err = StatsArchiveExtractor.extract(&[0x1f, 0x8b, 0x00, 0x01]).unwrap_err();
        assert_eq!(err, ParseError::Encoding);
    }
}
