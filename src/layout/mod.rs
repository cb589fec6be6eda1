// Assigns every node its absolute offset in the encoded file.
//
// A node's record is placed first, followed by the complete subtree of its
// first child, then the second child's subtree, and so on. A later sibling's
// offset depends on the full size of every earlier sibling subtree, so this
// always runs over the finished tree, right before encoding.
//
// The write cursor is threaded through the walk explicitly: pre-order
// placement means each node starts exactly where the previous node's record
// ended, so a running offset over an explicit stack is enough, and deep keys
// do not grow the call stack.

use crate::{node::Node, trie::Trie};

/// Plans the whole trie with the root at offset 0 and returns the encoded size.
pub fn plan(trie: &mut Trie) -> u64 {
    plan_node(trie.root_mut(), 0)
}

/// Places `node` at `offset` and returns its subtree size.
pub fn plan_node(node: &mut Node, offset: u64) -> u64 {
    let mut cursor = offset;
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        node.set_byte_pos(cursor);
        cursor += node.header_size();
        // Reversed, so the first child is popped first.
        stack.extend(node.children_mut().rev());
    }
    cursor - offset
}
