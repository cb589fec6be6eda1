use std::{borrow::Cow, fmt, str::FromStr};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::node::Node;

/// Preprocessing applied to every key before it touches the trie.
///
/// The file format records nothing about it: a file written under `Md5` and
/// read under `None` simply misses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    #[default]
    None,
    Md5,
    Sha1,
}

impl FromStr for HashMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(HashMode::None),
            "md5" => Ok(HashMode::Md5),
            "sha1" => Ok(HashMode::Sha1),
            _ => Err(format!("unknown hash mode {:?}", s)),
        }
    }
}

impl fmt::Display for HashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashMode::None => "none",
            HashMode::Md5 => "md5",
            HashMode::Sha1 => "sha1",
        };
        f.write_str(name)
    }
}

pub fn hash_key(key: &str, mode: HashMode) -> Cow<'_, str> {
    match mode {
        HashMode::None => Cow::Borrowed(key),
        HashMode::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(key.as_bytes());
            Cow::Owned(format!("{:x}", hasher.finalize()))
        }
        HashMode::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(key.as_bytes());
            Cow::Owned(format!("{:x}", hasher.finalize()))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trie {
    root: Node,
    hash_mode: HashMode,
}

impl Trie {
    pub fn new(hash_mode: HashMode) -> Self {
        Trie {
            root: Node::new(),
            hash_mode,
        }
    }

    pub fn with_root(root: Node, hash_mode: HashMode) -> Self {
        Trie { root, hash_mode }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn hash_mode(&self) -> HashMode {
        self.hash_mode
    }

    pub fn hash_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        hash_key(key, self.hash_mode)
    }

    /// Inserts `value` under `key`, replacing any previous value.
    pub fn insert<V: Into<Vec<u8>>>(&mut self, key: &str, value: V) {
        let key = hash_key(key, self.hash_mode);
        let mut node = &mut self.root;
        for ch in key.chars() {
            node = node.child_or_insert(ch);
        }
        node.set_value(value);
    }

    /// The node reached by walking `key`, whether or not it holds a value.
    pub fn node_at(&self, key: &str) -> Option<&Node> {
        let key = hash_key(key, self.hash_mode);
        let mut node = &self.root;
        for ch in key.chars() {
            node = node.child_at(ch)?;
        }
        Some(node)
    }

    /// `None` when the path is missing or ends on a node without a value. A
    /// stored empty value comes back as `Some(&[])`.
    pub fn lookup(&self, key: &str) -> Option<&[u8]> {
        self.node_at(key)?.value()
    }

    /// Number of nodes holding a value.
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if node.value().is_some() {
                count += 1;
            }
            stack.extend(node.children().map(|(_, child)| child));
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
