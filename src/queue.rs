//! Queue construction from refined sentence units.

use crate::position::PositionRange;
use crate::segmenter::TextUnit;
use crate::text_utils::{estimated_minutes, is_speakable, word_count};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One narratable entry in the playback queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub unit: TextUnit,
    pub title: Option<String>,
    pub author: Option<String>,
    pub cover: Option<String>,
    pub is_preroll: bool,
    pub is_skipped: bool,
}

impl QueueItem {
    pub fn from_unit(unit: TextUnit) -> Self {
        let is_skipped = !is_speakable(&unit.text);
        Self {
            unit,
            title: None,
            author: None,
            cover: None,
            is_preroll: false,
            is_skipped,
        }
    }

    pub fn text(&self) -> &str {
        &self.unit.text
    }

    pub fn position(&self) -> &PositionRange {
        &self.unit.position
    }
}

/// Metadata of the section being narrated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueOptions {
    pub preroll: bool,
    pub rate: f32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            preroll: false,
            rate: 1.0,
        }
    }
}

/// Announcement spoken before a section.
pub fn preroll_text(title: &str, words: usize, rate: f32) -> String {
    let minutes = estimated_minutes(words, rate);
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    let title = title.trim().trim_end_matches('.');
    if title.is_empty() {
        format!("Estimated reading time: {minutes} {unit}.")
    } else {
        format!("{title}. Estimated reading time: {minutes} {unit}.")
    }
}

/// Wrap refined units as queue items, tagging them with section metadata
/// and optionally prepending a preroll item. Units with nothing to say are
/// kept but marked skipped so positions stay addressable.
pub fn build_queue(
    units: Vec<TextUnit>,
    section: &SectionInfo,
    options: &QueueOptions,
) -> Vec<QueueItem> {
    let words: usize = units.iter().map(|unit| word_count(&unit.text)).sum();
    let mut items = Vec::with_capacity(units.len() + 1);

    if options.preroll && words > 0 {
        if let Some(first) = units.first() {
            let unit = TextUnit {
                text: preroll_text(&section.title, words, options.rate),
                position: first.position.clone(),
                source_indices: Vec::new(),
            };
            items.push(QueueItem {
                is_preroll: true,
                ..tag(QueueItem::from_unit(unit), section)
            });
        }
    }

    items.extend(
        units
            .into_iter()
            .map(|unit| tag(QueueItem::from_unit(unit), section)),
    );
    debug!(
        items = items.len(),
        words,
        preroll = options.preroll,
        "Built playback queue"
    );
    items
}

fn tag(item: QueueItem, section: &SectionInfo) -> QueueItem {
    let title = section.title.trim();
    QueueItem {
        title: (!title.is_empty()).then(|| title.to_string()),
        author: section.author.clone(),
        cover: section.cover.clone(),
        ..item
    }
}
