pub mod reader;
pub mod writer;

// This package reads and writes the trie file format.
//
// A trie file is a pre-order sequence of node records. Each record is
//
//   value length     2 bytes
//   value            `value length` bytes
//   child count      2 bytes
//   per child:
//     letter         3 bytes, UTF-8, left-padded with zeros
//     child offset   3 bytes, absolute position of the child's record
//
// and is followed immediately by the records of its first child's subtree,
// then its second child's, and so on. The root record starts at byte 0. All
// integers are unsigned big-endian, left-padded with zeros to the field width.
//
// The writer expects a trie whose offsets were assigned by `layout::plan`.
// `check_node` validates every field of such a trie before any byte goes out.
// The reader can decode one record header (which is all a point lookup needs) or
// materialize the whole tree.

pub use reader::{read_node, read_node_header, read_value, ChildDescriptor, NodeHeader};
pub use writer::{check_node, write_node};
