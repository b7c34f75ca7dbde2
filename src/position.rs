//! Position-range descriptors and the range merge algorithm.
//!
//! Descriptors use the EPUB CFI text form: `epubcfi(/6/4!/4/2,/1:0,/1:20)`
//! for a range (parent path, start, end) or `epubcfi(/6/4!/4/2/1:0)` for a
//! point. Any `name(...)` wrapper is accepted and written back unchanged.
//!
//! Merging two adjacent ranges takes a fast path when both share the same
//! parent path and otherwise recomputes the deepest common ancestor. A
//! merge that cannot be computed leaves the left range in place.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

const DEFAULT_SCHEME: &str = "epubcfi";

/// Opaque locator text carried by every text unit. Equality compares the
/// parsed structure; unparsable descriptors compare by text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionRange(String);

impl PositionRange {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Result<Locator> {
        Locator::parse(&self.0)
    }

    /// Step indices of the element holding the start of this range, with
    /// trailing text-node (odd) steps removed. `None` when unparsable.
    pub fn element_path(&self) -> Option<Vec<u32>> {
        let start = self.parse().ok()?.full_start();
        let mut steps: Vec<u32> = start.steps.iter().map(|step| step.index).collect();
        while steps.last().is_some_and(|index| index % 2 == 1) {
            steps.pop();
        }
        Some(steps)
    }

    /// Whether both ranges start inside the same block: one element path
    /// contains the other, as with inline markup inside a paragraph.
    pub fn shares_block(&self, other: &PositionRange) -> bool {
        match (self.element_path(), other.element_path()) {
            (Some(left), Some(right)) => {
                let shorter = left.len().min(right.len());
                shorter > 0 && left[..shorter] == right[..shorter]
            }
            _ => false,
        }
    }

    /// Spanning range from the start of `self` to the end of `right`.
    pub fn merge(&self, right: &PositionRange) -> PositionRange {
        merge_ranges(self, right)
    }

    /// Sub-range of a single text node, addressed by UTF-16 offsets relative
    /// to the start of this range. Ranges that span more than one node are
    /// returned unchanged.
    pub fn slice(&self, start: usize, end: usize) -> PositionRange {
        match self.parse().and_then(|locator| locator.slice(start, end)) {
            Ok(Some(locator)) => PositionRange(locator.to_string()),
            Ok(None) => self.clone(),
            Err(err) => {
                debug!(descriptor = %self.0, "Keeping node range for segment: {err}");
                self.clone()
            }
        }
    }
}

impl PartialEq for PositionRange {
    fn eq(&self, other: &Self) -> bool {
        match (self.parse(), other.parse()) {
            (Ok(left), Ok(right)) => left == right,
            _ => self.0 == other.0,
        }
    }
}

impl Eq for PositionRange {}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PositionRange {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One `/N[assertion]!` step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub index: u32,
    pub assertion: Option<String>,
    pub indirect: bool,
}

/// A sequence of steps with an optional terminal offset (`:12`, `~3.5`,
/// `@10:20`, possibly followed by a text assertion).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocatorPath {
    pub steps: Vec<Step>,
    pub offset: Option<String>,
}

impl LocatorPath {
    fn char_offset(&self) -> Option<usize> {
        let offset = self.offset.as_deref()?;
        let digits = offset.strip_prefix(':')?;
        let end = digits
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(digits.len());
        digits[..end].parse().ok()
    }

    fn joined(&self, local: &LocatorPath) -> LocatorPath {
        let mut steps = self.steps.clone();
        steps.extend(local.steps.iter().cloned());
        LocatorPath {
            steps,
            offset: local.offset.clone(),
        }
    }

    fn parse(text: &str) -> Result<Self> {
        let mut path = LocatorPath::default();
        let bytes = text.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            match bytes[pos] {
                b'/' => {
                    pos += 1;
                    let digits_start = pos;
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                    let digits = &text[digits_start..pos];
                    if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
                        bail!("invalid step index {digits:?} in {text:?}");
                    }
                    let index = digits
                        .parse()
                        .map_err(|err| anyhow!("step index {digits:?} in {text:?}: {err}"))?;
                    let mut assertion = None;
                    if pos < bytes.len() && bytes[pos] == b'[' {
                        let close = assertion_end(text, pos)?;
                        assertion = Some(text[pos..=close].to_string());
                        pos = close + 1;
                    }
                    let indirect = pos < bytes.len() && bytes[pos] == b'!';
                    if indirect {
                        pos += 1;
                    }
                    path.steps.push(Step {
                        index,
                        assertion,
                        indirect,
                    });
                }
                b':' | b'~' | b'@' => {
                    path.offset = Some(text[pos..].to_string());
                    break;
                }
                other => bail!("unexpected {:?} in locator path {text:?}", other as char),
            }
        }
        Ok(path)
    }
}

impl fmt::Display for LocatorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{}", step.index)?;
            if let Some(assertion) = &step.assertion {
                f.write_str(assertion)?;
            }
            if step.indirect {
                f.write_str("!")?;
            }
        }
        if let Some(offset) = &self.offset {
            f.write_str(offset)?;
        }
        Ok(())
    }
}

fn assertion_end(text: &str, open: usize) -> Result<usize> {
    let bytes = text.as_bytes();
    let mut pos = open + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'^' => pos += 2,
            b']' => return Ok(pos),
            _ => pos += 1,
        }
    }
    bail!("unterminated assertion in {text:?}")
}

/// Parsed descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub scheme: String,
    pub parent: LocatorPath,
    pub range: Option<(LocatorPath, LocatorPath)>,
}

impl Locator {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let open = text
            .find('(')
            .ok_or_else(|| anyhow!("missing '(' in locator {text:?}"))?;
        let scheme = &text[..open];
        if scheme.is_empty() || !scheme.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            bail!("invalid locator scheme {scheme:?}");
        }
        let inner = text[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| anyhow!("missing ')' in locator {text:?}"))?;
        let parts = split_top_level(inner);
        match parts.as_slice() {
            [path] => {
                let parent = LocatorPath::parse(path)?;
                if parent.steps.is_empty() {
                    bail!("empty locator path in {text:?}");
                }
                Ok(Self {
                    scheme: scheme.to_string(),
                    parent,
                    range: None,
                })
            }
            [parent, start, end] => {
                let parent = LocatorPath::parse(parent)?;
                if parent.offset.is_some() {
                    bail!("range parent carries an offset in {text:?}");
                }
                let start = LocatorPath::parse(start)?;
                let end = LocatorPath::parse(end)?;
                if (start.steps.is_empty() && start.offset.is_none())
                    || (end.steps.is_empty() && end.offset.is_none())
                {
                    bail!("empty range component in {text:?}");
                }
                Ok(Self {
                    scheme: scheme.to_string(),
                    parent,
                    range: Some((start, end)),
                })
            }
            _ => bail!("expected 1 or 3 comma-separated parts in {text:?}"),
        }
    }

    pub fn full_start(&self) -> LocatorPath {
        match &self.range {
            Some((start, _)) => self.parent.joined(start),
            None => self.parent.clone(),
        }
    }

    pub fn full_end(&self) -> LocatorPath {
        match &self.range {
            Some((_, end)) => self.parent.joined(end),
            None => self.parent.clone(),
        }
    }

    fn slice(&self, start: usize, end: usize) -> Result<Option<Locator>> {
        let full_start = self.full_start();
        let full_end = self.full_end();
        if full_start.steps != full_end.steps || full_start.steps.len() < 2 {
            return Ok(None);
        }
        if end < start {
            bail!("slice end {end} precedes start {start}");
        }
        let base = full_start.char_offset().unwrap_or(0);
        let split = full_start.steps.len() - 1;
        let node = vec![full_start.steps[split].clone()];
        Ok(Some(Locator {
            scheme: self.scheme.clone(),
            parent: LocatorPath {
                steps: full_start.steps[..split].to_vec(),
                offset: None,
            },
            range: Some((
                LocatorPath {
                    steps: node.clone(),
                    offset: Some(format!(":{}", base + start)),
                },
                LocatorPath {
                    steps: node,
                    offset: Some(format!(":{}", base + end)),
                },
            )),
        }))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.scheme, self.parent)?;
        if let Some((start, end)) = &self.range {
            write!(f, ",{start},{end}")?;
        }
        f.write_str(")")
    }
}

fn split_top_level(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut escaped = false;
    let mut start = 0;
    for (idx, ch) in inner.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '^' => escaped = true,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&inner[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

/// Merge two adjacent ranges (left before right) into one spanning range.
/// Never fails: an unmergeable pair yields `left` and a warning.
pub fn merge_ranges(left: &PositionRange, right: &PositionRange) -> PositionRange {
    match try_merge(left, right) {
        Ok(merged) => PositionRange(merged.to_string()),
        Err(err) => {
            warn!(left = %left, right = %right, "Keeping left position range: {err}");
            left.clone()
        }
    }
}

fn try_merge(left: &PositionRange, right: &PositionRange) -> Result<Locator> {
    let a = left.parse()?;
    let b = right.parse()?;
    if a.scheme != b.scheme {
        bail!("scheme mismatch {} vs {}", a.scheme, b.scheme);
    }

    if let (Some((a_start, _)), Some((_, b_end))) = (&a.range, &b.range) {
        if a.parent == b.parent {
            return Ok(Locator {
                scheme: a.scheme.clone(),
                parent: a.parent.clone(),
                range: Some((a_start.clone(), b_end.clone())),
            });
        }
    }

    let start = a.full_start();
    let end = b.full_end();
    let limit = start.steps.len().min(end.steps.len()).saturating_sub(1);
    let common = start
        .steps
        .iter()
        .zip(&end.steps)
        .take(limit)
        .take_while(|(x, y)| x == y)
        .count();
    if common == 0 {
        bail!("no common ancestor");
    }
    Ok(Locator {
        scheme: a.scheme,
        parent: LocatorPath {
            steps: start.steps[..common].to_vec(),
            offset: None,
        },
        range: Some((
            LocatorPath {
                steps: start.steps[common..].to_vec(),
                offset: start.offset,
            },
            LocatorPath {
                steps: end.steps[common..].to_vec(),
                offset: end.offset,
            },
        )),
    })
}

/// Point descriptor for a text node path, used when callers only know the
/// node and want ranges built with [`PositionRange::slice`].
pub fn node_descriptor(steps: &[u32]) -> PositionRange {
    let path: String = steps.iter().map(|step| format!("/{step}")).collect();
    PositionRange(format!("{DEFAULT_SCHEME}({path})"))
}
