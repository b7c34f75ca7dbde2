//! Pronunciation lexicon helpers: CSV import/export and the built-in Bible
//! reference preset.
//!
//! CSV files carry an `original,replacement,is_regex` header. `is_regex` may
//! be omitted or blank; `true`, `yes` and `1` (any case) mark a regex rule.

use crate::config::LexiconRule;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Book abbreviation and spoken name. Rules only fire before a chapter
/// number, so `Rev. Smith` and `Gen. Lee` are left alone.
const BIBLE_BOOKS: &[(&str, &str)] = &[
    ("Gen", "Genesis"),
    ("Exod", "Exodus"),
    ("Lev", "Leviticus"),
    ("Num", "Numbers"),
    ("Deut", "Deuteronomy"),
    ("Josh", "Joshua"),
    ("Judg", "Judges"),
    ("Sam", "Samuel"),
    ("Kgs", "Kings"),
    ("Chron", "Chronicles"),
    ("Neh", "Nehemiah"),
    ("Esth", "Esther"),
    ("Ps", "Psalm"),
    ("Prov", "Proverbs"),
    ("Eccl", "Ecclesiastes"),
    ("Isa", "Isaiah"),
    ("Jer", "Jeremiah"),
    ("Lam", "Lamentations"),
    ("Ezek", "Ezekiel"),
    ("Dan", "Daniel"),
    ("Hos", "Hosea"),
    ("Obad", "Obadiah"),
    ("Mic", "Micah"),
    ("Nah", "Nahum"),
    ("Hab", "Habakkuk"),
    ("Zeph", "Zephaniah"),
    ("Hag", "Haggai"),
    ("Zech", "Zechariah"),
    ("Mal", "Malachi"),
    ("Matt", "Matthew"),
    ("Mt", "Matthew"),
    ("Mk", "Mark"),
    ("Lk", "Luke"),
    ("Jn", "John"),
    ("Rom", "Romans"),
    ("Cor", "Corinthians"),
    ("Gal", "Galatians"),
    ("Eph", "Ephesians"),
    ("Phil", "Philippians"),
    ("Col", "Colossians"),
    ("Thess", "Thessalonians"),
    ("Tim", "Timothy"),
    ("Tit", "Titus"),
    ("Philem", "Philemon"),
    ("Heb", "Hebrews"),
    ("Jas", "James"),
    ("Pet", "Peter"),
    ("Rev", "Revelation"),
];

// Also common first names; a sentence ending in "Tim." must still end there.
const NAME_LIKE: &[&str] = &["Dan", "Sam", "Mic", "Phil", "Tim", "Jas"];

/// Preset rules expanding book abbreviations in references
/// (`Matt. 5:15` -> `Matthew 5:15`).
pub fn bible_rules() -> Vec<LexiconRule> {
    BIBLE_BOOKS
        .iter()
        .map(|(abbr, name)| LexiconRule {
            original: format!(r"\b{}\.(\s*)(\d)", regex::escape(abbr)),
            replacement: format!("{name}${{1}}${{2}}"),
            is_regex: true,
        })
        .collect()
}

/// Book abbreviations that refinement should not treat as sentence ends.
pub fn bible_abbreviations() -> Vec<String> {
    BIBLE_BOOKS
        .iter()
        .filter(|(abbr, _)| !NAME_LIKE.contains(abbr))
        .map(|(abbr, _)| format!("{abbr}."))
        .collect()
}

#[derive(Debug, Deserialize)]
struct CsvRule {
    original: String,
    #[serde(default)]
    replacement: String,
    #[serde(default)]
    is_regex: Option<String>,
}

fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        )
    })
}

/// Read rules from CSV. Rows with an empty `original` are skipped; malformed
/// rows are skipped with a warning.
pub fn read_lexicon_csv(reader: impl Read) -> Result<Vec<LexiconRule>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);
    let mut rules = Vec::new();
    for (row, record) in csv_reader.deserialize::<CsvRule>().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(row = row + 1, "Skipping malformed lexicon row: {err}");
                continue;
            }
        };
        if record.original.trim().is_empty() {
            continue;
        }
        rules.push(LexiconRule {
            original: record.original,
            replacement: record.replacement,
            is_regex: parse_flag(record.is_regex.as_deref()),
        });
    }
    debug!(rules = rules.len(), "Read lexicon CSV");
    Ok(rules)
}

pub fn load_lexicon_csv(path: &Path) -> Result<Vec<LexiconRule>> {
    let file =
        File::open(path).with_context(|| format!("Opening lexicon CSV {}", path.display()))?;
    let rules = read_lexicon_csv(file)
        .with_context(|| format!("Reading lexicon CSV {}", path.display()))?;
    info!(path = %path.display(), rules = rules.len(), "Imported lexicon rules");
    Ok(rules)
}

/// Write rules as CSV with an `original,replacement,is_regex` header.
pub fn write_lexicon_csv_to(writer: impl Write, rules: &[LexiconRule]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if rules.is_empty() {
        csv_writer
            .write_record(["original", "replacement", "is_regex"])
            .context("Writing lexicon CSV header")?;
    }
    for rule in rules {
        csv_writer.serialize(rule).context("Writing lexicon rule")?;
    }
    csv_writer.flush().context("Flushing lexicon CSV")?;
    Ok(())
}

pub fn write_lexicon_csv(path: &Path, rules: &[LexiconRule]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Creating lexicon CSV {}", path.display()))?;
    write_lexicon_csv_to(file, rules)?;
    info!(path = %path.display(), rules = rules.len(), "Exported lexicon rules");
    Ok(())
}
