//! Narration engine for a document reader.
//!
//! Extracted text nodes flow through sentence segmentation and refinement
//! into a playback queue; the [`playback::PlaybackController`] then drives
//! synthesis, caching and audio output one item at a time.

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod lexicon;
pub mod normalizer;
pub mod output;
pub mod pipeline;
pub mod playback;
pub mod position;
pub mod provider;
pub mod queue;
pub mod refine;
pub mod segmenter;
pub mod text_utils;
pub mod trie;
