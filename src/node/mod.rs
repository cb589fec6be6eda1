use std::collections::HashMap;

/// value_len (2) + child_count (2).
pub const HEADER_FIELD_LENGTH: u64 = 4;
/// char (3) + offset (3).
pub const CHILD_FIELDS_LENGTH: u64 = 6;

/// An in-memory trie node.
///
/// Children are kept in insertion order; the encoded layout depends on it, so
/// iteration never follows hash order.
#[derive(Debug, Clone, Default)]
pub struct Node {
    value: Option<Vec<u8>>,
    children: Vec<(char, Node)>,
    index: HashMap<char, usize>,
    byte_pos: u64,
}

impl Node {
    pub fn new() -> Self {
        Node::default()
    }

    pub fn with_value<V: Into<Vec<u8>>>(value: V) -> Self {
        let mut node = Node::new();
        node.value = Some(value.into());
        node
    }

    pub fn has_child(&self, ch: char) -> bool {
        self.index.contains_key(&ch)
    }

    pub fn child_at(&self, ch: char) -> Option<&Node> {
        self.index.get(&ch).map(|&i| &self.children[i].1)
    }

    pub fn child_at_mut(&mut self, ch: char) -> Option<&mut Node> {
        match self.index.get(&ch) {
            Some(&i) => Some(&mut self.children[i].1),
            None => None,
        }
    }

    /// Stores `node` under `ch` and returns it. Replacing an existing child
    /// keeps that child's position.
    pub fn add_child(&mut self, ch: char, node: Node) -> &mut Node {
        let idx = match self.index.get(&ch) {
            Some(&i) => {
                self.children[i].1 = node;
                i
            }
            None => {
                self.children.push((ch, node));
                let i = self.children.len() - 1;
                self.index.insert(ch, i);
                i
            }
        };
        &mut self.children[idx].1
    }

    pub(crate) fn child_or_insert(&mut self, ch: char) -> &mut Node {
        let idx = match self.index.get(&ch) {
            Some(&i) => i,
            None => {
                self.children.push((ch, Node::new()));
                let i = self.children.len() - 1;
                self.index.insert(ch, i);
                i
            }
        };
        &mut self.children[idx].1
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = (char, &Node)> {
        self.children.iter().map(|(ch, node)| (*ch, node))
    }

    pub(crate) fn children_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut Node> {
        self.children.iter_mut().map(|(_, node)| node)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn set_value<V: Into<Vec<u8>>>(&mut self, value: V) {
        self.value = Some(value.into());
    }

    pub fn value_length(&self) -> u64 {
        self.value.as_ref().map_or(0, |v| v.len() as u64)
    }

    pub fn value_bytes(&self) -> &[u8] {
        self.value.as_deref().unwrap_or(&[])
    }

    /// Size of this node's own record, excluding descendants.
    pub fn header_size(&self) -> u64 {
        HEADER_FIELD_LENGTH + self.children.len() as u64 * CHILD_FIELDS_LENGTH + self.value_length()
    }

    /// Size of this node's record plus every descendant's. Walks an explicit
    /// stack, so a single very long key cannot exhaust the thread's stack.
    pub fn subtree_size(&self) -> u64 {
        let mut size = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            size += node.header_size();
            stack.extend(node.children.iter().map(|(_, child)| child));
        }
        size
    }

    /// Only meaningful once the node has been planned.
    pub fn byte_pos(&self) -> u64 {
        self.byte_pos
    }

    pub(crate) fn set_byte_pos(&mut self, pos: u64) {
        self.byte_pos = pos;
    }
}

// Structural equality: byte positions are layout bookkeeping and do not take
// part.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let mut stack = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if a.value != b.value || a.children.len() != b.children.len() {
                return false;
            }
            for ((ca, na), (cb, nb)) in a.children.iter().zip(&b.children) {
                if ca != cb {
                    return false;
                }
                stack.push((na, nb));
            }
        }
        true
    }
}

impl Eq for Node {}

// The derived drop recurses once per level. Unlink the children first so a
// deep chain is freed one node at a time.
impl Drop for Node {
    fn drop(&mut self) {
        let mut stack: Vec<Node> = self.children.drain(..).map(|(_, node)| node).collect();
        while let Some(mut node) = stack.pop() {
            stack.extend(node.children.drain(..).map(|(_, child)| child));
        }
    }
}
