/// A borrowed, read-only view of one node in the external block index.
///
/// The engine never constructs or mutates a node; it only walks `prev`
/// and reads `height`, `median_time_past`, and `version`. Implementors
/// are typically a cheap handle (an index, or a reference-counted
/// pointer) rather than an owned block header.
pub trait BlockIndexNode: Copy {
    /// Height of this block, genesis is `0`.
    fn height(&self) -> u32;
    /// Median of the timestamps of the preceding eleven blocks.
    fn median_time_past(&self) -> i64;
    /// The block's 32-bit signed version field.
    fn version(&self) -> i32;
    /// The parent of this block, or `None` at genesis.
    fn prev(&self) -> Option<Self>;

    /// Walks backward to the ancestor at exactly `height`, or `None` if
    /// `height` is above this node or below genesis.
    fn ancestor_at_height(&self, height: u32) -> Option<Self> {
        let mut current = *self;
        loop {
            if current.height() == height {
                return Some(current);
            }
            if current.height() < height {
                return None;
            }
            current = current.prev()?;
        }
    }
}
