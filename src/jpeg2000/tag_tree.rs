use crate::error::J2kError;
use crate::jpeg2000::bit_io::{J2kBitReader, J2kBitWriter};

const UNKNOWN: u32 = u32::MAX;

/// Tag Tree for JPEG 2000 packet header coding (ISO/IEC 15444-1, B.10.2).
///
/// Nodes live in one arena, level by level from the leaves up; every node's
/// parent index is computed once at construction. Each level has the
/// ceiling-halved dimensions of the level below it, so a `w × h` grid has
/// `ceil(log2(max(w, h))) + 1` levels.
#[derive(Debug, Clone)]
pub struct TagTree {
    nodes: Vec<TagTreeNode>,
    levels: Vec<TagTreeLevel>,
    // Walk cursor, leaf first.
    path: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct TagTreeLevel {
    offset: usize,
    width: usize,
    height: usize,
}

#[derive(Debug, Clone, Copy)]
struct TagTreeNode {
    value: u32,
    low: u32,
    known: bool,
    parent: Option<usize>,
}

impl Default for TagTreeNode {
    fn default() -> Self {
        Self {
            value: UNKNOWN,
            low: 0,
            known: false,
            parent: None,
        }
    }
}

impl TagTree {
    /// Create a new TagTree for a grid of `w` x `h` leaves.
    pub fn new(w: usize, h: usize) -> Self {
        let mut levels = Vec::new();
        let (mut width, mut height, mut offset) = (w, h, 0);
        loop {
            levels.push(TagTreeLevel {
                offset,
                width,
                height,
            });
            offset += width * height;
            if width <= 1 && height <= 1 {
                break;
            }
            width = width.div_ceil(2);
            height = height.div_ceil(2);
        }

        let mut nodes = vec![TagTreeNode::default(); offset];
        for pair in levels.windows(2) {
            let (child, parent) = (pair[0], pair[1]);
            for y in 0..child.height {
                for x in 0..child.width {
                    nodes[child.offset + y * child.width + x].parent =
                        Some(parent.offset + (y / 2) * parent.width + x / 2);
                }
            }
        }

        Self {
            nodes,
            levels,
            path: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.levels[0].width
    }

    pub fn height(&self) -> usize {
        self.levels[0].height
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Arena index of leaf `(x, y)`, or `None` outside the grid.
    pub fn node_index(&self, x: usize, y: usize) -> Option<usize> {
        let leaves = self.levels[0];
        (x < leaves.width && y < leaves.height).then(|| y * leaves.width + x)
    }

    /// Clears the walk cursor. Learned values and lower bounds persist, as
    /// later layers build on what earlier layers signalled.
    pub fn reset(&mut self) {
        self.path.clear();
    }

    /// Forgets everything, for reuse on a new tile.
    pub fn clear(&mut self) {
        self.path.clear();
        for node in &mut self.nodes {
            let parent = node.parent;
            *node = TagTreeNode {
                parent,
                ..TagTreeNode::default()
            };
        }
    }

    /// Value of a leaf, if it has been set or decoded.
    pub fn value(&self, x: usize, y: usize) -> Option<u32> {
        let index = self.node_index(x, y)?;
        let value = self.nodes[index].value;
        (value != UNKNOWN).then_some(value)
    }

    /// Sets a leaf and restores the parent-is-minimum-of-children invariant
    /// on its path to the root.
    pub fn set_value(&mut self, x: usize, y: usize, value: u32) {
        let Some(index) = self.node_index(x, y) else {
            debug_assert!(false, "tag tree leaf ({x}, {y}) out of range");
            return;
        };
        self.nodes[index].value = value;

        let (mut x, mut y) = (x, y);
        for pair in self.levels.windows(2) {
            let (child, parent) = (pair[0], pair[1]);
            let (px, py) = (x / 2, y / 2);
            let mut minimum = UNKNOWN;
            for cy in 2 * py..(2 * py + 2).min(child.height) {
                for cx in 2 * px..(2 * px + 2).min(child.width) {
                    minimum = minimum.min(self.nodes[child.offset + cy * child.width + cx].value);
                }
            }
            self.nodes[parent.offset + py * parent.width + px].value = minimum;
            (x, y) = (px, py);
        }
    }

    fn load_path(&mut self, leaf: usize) {
        self.path.clear();
        let mut index = leaf;
        self.path.push(index);
        while let Some(parent) = self.nodes[index].parent {
            self.path.push(parent);
            index = parent;
        }
    }

    /// Emits the bits telling a decoder whether the leaf value is at most
    /// `threshold`, skipping whatever earlier calls already signalled.
    pub fn encode(&mut self, writer: &mut J2kBitWriter, x: usize, y: usize, threshold: u32) {
        let Some(leaf) = self.node_index(x, y) else {
            return;
        };
        let limit = threshold.saturating_add(1);
        self.load_path(leaf);

        let mut low = 0;
        for &index in self.path.iter().rev() {
            let node = &mut self.nodes[index];
            if low > node.low {
                node.low = low;
            } else {
                low = node.low;
            }
            while low < limit {
                if low >= node.value {
                    if !node.known {
                        writer.write_bit(1);
                        node.known = true;
                    }
                    break;
                }
                writer.write_bit(0);
                low += 1;
            }
            node.low = low;
        }
        self.path.clear();
    }

    /// Emits the complete leaf value.
    pub fn encode_value(&mut self, writer: &mut J2kBitWriter, x: usize, y: usize) {
        if let Some(value) = self.value(x, y) {
            self.encode(writer, x, y, value);
        }
    }

    /// Decodes whether the leaf value is at most `threshold`. Bits are read
    /// only for nodes that are still unresolved below `threshold + 1`.
    pub fn decode(
        &mut self,
        reader: &mut J2kBitReader,
        x: usize,
        y: usize,
        threshold: u32,
    ) -> Result<bool, J2kError> {
        let leaf = self.node_index(x, y).ok_or(J2kError::InvalidGeometry)?;
        let limit = threshold.saturating_add(1);
        self.load_path(leaf);

        let mut low = 0;
        for i in (0..self.path.len()).rev() {
            let node = &mut self.nodes[self.path[i]];
            if low > node.low {
                node.low = low;
            } else {
                low = node.low;
            }
            while low < limit && low < node.value {
                if reader.read_bit()? == 1 {
                    node.value = low;
                    node.known = true;
                } else {
                    low += 1;
                }
            }
            node.low = low;
        }
        self.path.clear();
        Ok(self.nodes[leaf].value < limit)
    }

    /// Decodes the full leaf value (used for zero bit-plane counts).
    pub fn decode_value(
        &mut self,
        reader: &mut J2kBitReader,
        x: usize,
        y: usize,
    ) -> Result<u32, J2kError> {
        self.decode(reader, x, y, UNKNOWN - 1)?;
        self.value(x, y).ok_or(J2kError::InvalidGeometry)
    }
}
