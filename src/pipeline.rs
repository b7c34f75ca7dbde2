//! From extracted document text to a playback queue.
//!
//! The text-extraction collaborator hands over the visible section as an
//! ordered list of `(text, cfi)` nodes. Each node is segmented on its own so
//! every raw sentence gets a precise sub-range of its node. Sentences split
//! by inline markup are rejoined first, then refinement merges across node
//! boundaries where needed.

use crate::config::{NarrationConfig, SegmentationLists};
use crate::position::PositionRange;
use crate::queue::{QueueItem, QueueOptions, SectionInfo, build_queue};
use crate::refine::{SentenceRefiner, join_inline_runs};
use crate::segmenter::{SentenceSegmenter, TextUnit};
use crate::text_utils::utf16_offset;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One text node as reported by the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedNode {
    pub text: String,
    pub cfi: String,
}

/// Input document for the binary: section metadata plus its nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionInput {
    #[serde(flatten)]
    pub section: SectionInfo,
    pub nodes: Vec<ExtractedNode>,
}

#[derive(Debug)]
pub struct NarrationPipeline {
    segmenter: SentenceSegmenter,
    refiner: SentenceRefiner,
    lists: SegmentationLists,
    options: QueueOptions,
}

impl NarrationPipeline {
    pub fn new(segmenter: SentenceSegmenter, lists: SegmentationLists, options: QueueOptions) -> Self {
        Self {
            segmenter,
            refiner: SentenceRefiner::new(),
            lists,
            options,
        }
    }

    pub fn from_config(config: &NarrationConfig) -> Self {
        Self::new(
            SentenceSegmenter::new(config.locale.clone()),
            config.segmentation_lists(),
            QueueOptions {
                preroll: config.preroll,
                rate: config.rate,
            },
        )
    }

    /// Swap the refinement lists; derived tries rebuild on next use only if
    /// the content changed.
    pub fn set_lists(&mut self, lists: SegmentationLists) {
        self.lists = lists;
    }

    pub fn set_options(&mut self, options: QueueOptions) {
        self.options = options;
    }

    pub fn lists(&self) -> &SegmentationLists {
        &self.lists
    }

    /// Raw sentence units, one run of segments per node. Provenance indices
    /// count raw segments across the whole section.
    pub fn raw_units(&self, nodes: &[ExtractedNode]) -> Vec<TextUnit> {
        let mut units = Vec::new();
        for node in nodes {
            let range = PositionRange::new(node.cfi.clone());
            for segment in self.segmenter.segment(&node.text) {
                let start = utf16_offset(&node.text, segment.index);
                let end = utf16_offset(&node.text, segment.index + segment.length);
                let index = units.len();
                units.push(TextUnit::new(segment.text, range.slice(start, end), index));
            }
        }
        debug!(nodes = nodes.len(), units = units.len(), "Segmented section");
        units
    }

    pub fn refine(&self, units: &[TextUnit]) -> Vec<TextUnit> {
        self.refiner.refine(units, &self.lists)
    }

    pub fn units(&self, nodes: &[ExtractedNode]) -> Vec<TextUnit> {
        let raw = self.raw_units(nodes);
        let refined = self.refine(&join_inline_runs(&raw));
        info!(raw = raw.len(), refined = refined.len(), "Refined sentences");
        refined
    }

    /// Full section preparation: segment, refine and build the queue.
    pub fn prepare_section(&self, input: &SectionInput) -> Vec<QueueItem> {
        build_queue(self.units(&input.nodes), &input.section, &self.options)
    }
}
