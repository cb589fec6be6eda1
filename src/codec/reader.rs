use std::io::{Read, Seek};

use crate::{
    encoding::{
        decode_char, FieldReader, CHILD_COUNT_FIELD_LENGTH, LETTER_FIELD_LENGTH,
        POSITION_FIELD_LENGTH, VALUE_FIELD_LENGTH,
    },
    error::{Error, Result},
    node::Node,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDescriptor {
    /// Raw letter field, still padded. Lookups compare it against the padded
    /// encoding of the key's character without decoding.
    pub letter: [u8; LETTER_FIELD_LENGTH],
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHeader {
    pub value: Vec<u8>,
    pub children: Vec<ChildDescriptor>,
}

pub fn read_value<R: Read + Seek>(r: &mut FieldReader<R>) -> Result<Vec<u8>> {
    let len = r.read_int(VALUE_FIELD_LENGTH, "value length")?;
    r.read_bytes(len as usize, "value")
}

pub fn read_node_header<R: Read + Seek>(r: &mut FieldReader<R>) -> Result<NodeHeader> {
    let value = read_value(r)?;
    let count = r.read_int(CHILD_COUNT_FIELD_LENGTH, "child count")?;

    let mut children = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let letter = r.read_letter_field()?;
        let offset = r.read_int(POSITION_FIELD_LENGTH, "child offset")?;
        children.push(ChildDescriptor { letter, offset });
    }

    Ok(NodeHeader { value, children })
}

// A record being decoded, with the descriptors of the children not yet read.
struct Frame {
    start: u64,
    // The letter this record hangs under in its parent.
    letter: char,
    node: Node,
    pending: std::vec::IntoIter<ChildDescriptor>,
    // The next child must start here or later: the end of the record, then
    // the end of the last decoded sibling subtree.
    next: u64,
}

fn read_frame<R: Read + Seek>(r: &mut FieldReader<R>, letter: char) -> Result<Frame> {
    let start = r.position();
    let header = read_node_header(r)?;
    let mut node = if header.value.is_empty() {
        Node::new()
    } else {
        Node::with_value(header.value)
    };
    node.set_byte_pos(start);
    Ok(Frame {
        start,
        letter,
        node,
        pending: header.children.into_iter(),
        next: r.position(),
    })
}

/// Decodes the record at the reader's position and every descendant at the
/// offset its parent names. A zero-length value decodes as no value, since
/// the format cannot tell them apart.
///
/// Each child must start at or after the end of everything decoded so far
/// under its parent. A corrupt file therefore cannot loop, and cannot make
/// two descriptors share one subtree.
pub fn read_node<R: Read + Seek>(r: &mut FieldReader<R>) -> Result<Node> {
    let mut current = read_frame(r, '\0')?;
    let mut parents: Vec<Frame> = Vec::new();

    loop {
        match current.pending.next() {
            Some(desc) => {
                if desc.offset < current.next {
                    return Err(Error::malformed(
                        current.start,
                        format!(
                            "child offset {} overlaps bytes already decoded up to {}",
                            desc.offset, current.next
                        ),
                    ));
                }
                let letter = decode_char(&desc.letter, current.start)?;
                if current.node.has_child(letter) {
                    return Err(Error::malformed(
                        current.start,
                        format!("duplicate letter {:?}", letter),
                    ));
                }
                r.seek(desc.offset)?;
                let child = read_frame(r, letter)?;
                parents.push(std::mem::replace(&mut current, child));
            }
            None => {
                let end = r.position();
                match parents.pop() {
                    Some(mut parent) => {
                        parent.node.add_child(current.letter, current.node);
                        parent.next = end;
                        current = parent;
                    }
                    None => return Ok(current.node),
                }
            }
        }
    }
}
