use serde::{Deserialize, Serialize};

/// Inclusive, 1-based line range of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

/// Raw selection reported by the editing surface.
///
/// `location` and `length` are UTF-16 code unit offsets, which is what
/// the macOS text system reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOffsets {
    pub location: usize,
    pub length: usize,
}

/// Selection fields derived from an offset pair and the buffer text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub offsets: SelectionOffsets,
    pub text: String,
    pub line_range: Option<LineRange>,
}

const LINE_FEED: u16 = 0x0A;

impl Selection {
    /// Derive the selected text and its line range.
    ///
    /// Offsets past the end of `buffer` are clamped. A selection that is
    /// empty after clamping yields empty text and no line range.
    pub fn compute(buffer: &str, offsets: SelectionOffsets) -> Self {
        let units: Vec<u16> = buffer.encode_utf16().collect();
        let start = offsets.location.min(units.len());
        let end = offsets.location.saturating_add(offsets.length).min(units.len());

        if start == end {
            return Selection {
                offsets,
                text: String::new(),
                line_range: None,
            };
        }

        let start_line = 1 + count_line_feeds(&units[..start]);
        let end_line = start_line + count_line_feeds(&units[start..end]);

        Selection {
            offsets,
            text: String::from_utf16_lossy(&units[start..end]),
            line_range: Some(LineRange {
                start: start_line,
                end: end_line,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Offsets covering whole lines `start..=end` (1-based), as selected by
    /// clicking or dragging in the line number gutter.
    ///
    /// The range runs from the first unit of line `start` to just past the
    /// line feed that ends line `end`, or to the end of the buffer when that
    /// line is the last. Arguments may come in either order. A start line
    /// past the last line gives an empty selection at the end of the buffer.
    pub fn offsets_for_lines(buffer: &str, start: u32, end: u32) -> SelectionOffsets {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let start = start.max(1);
        let units: Vec<u16> = buffer.encode_utf16().collect();

        let mut line = 1;
        let mut start_index = (start == 1).then_some(0);
        let mut end_index = units.len();
        for (i, &unit) in units.iter().enumerate() {
            if unit != LINE_FEED {
                continue;
            }
            if line == end {
                end_index = i + 1;
                break;
            }
            line += 1;
            if line == start {
                start_index = Some(i + 1);
            }
        }

        let location = start_index.unwrap_or(units.len());
        SelectionOffsets {
            location,
            length: end_index.saturating_sub(location),
        }
    }
}

/// 1-based line containing the UTF-16 offset `index`. Offsets past the end
/// belong to the last line; an empty buffer has line 1.
pub fn line_at(buffer: &str, index: usize) -> u32 {
    let units: Vec<u16> = buffer.encode_utf16().collect();
    1 + count_line_feeds(&units[..index.min(units.len())])
}

fn count_line_feeds(units: &[u16]) -> u32 {
    units.iter().filter(|&&u| u == LINE_FEED).count() as u32
}
