use std::io::Write;

use crate::{
    encoding::{
        encode_char, field_max, FieldWriter, CHILD_COUNT_FIELD_LENGTH, POSITION_FIELD_LENGTH,
        VALUE_FIELD_LENGTH,
    },
    error::{Error, Result},
    node::Node,
};

fn check_int(field: &'static str, value: u64, width: usize) -> Result<()> {
    if value > field_max(width) {
        return Err(Error::FieldOverflow {
            field,
            value,
            width,
        });
    }
    Ok(())
}

/// Checks that every field of a planned tree fits its width, without writing
/// anything. Fields are visited in the order `write_node` emits them, so the
/// first error is the one encoding would have hit.
pub fn check_node(node: &Node) -> Result<()> {
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        check_int("value length", node.value_length(), VALUE_FIELD_LENGTH)?;
        check_int(
            "child count",
            node.child_count() as u64,
            CHILD_COUNT_FIELD_LENGTH,
        )?;
        for (letter, child) in node.children() {
            encode_char(letter)?;
            check_int("child offset", child.byte_pos(), POSITION_FIELD_LENGTH)?;
        }
        stack.extend(node.children().rev().map(|(_, child)| child));
    }
    Ok(())
}

/// Encodes `node` and its subtree in pre-order. Offsets come from
/// `byte_pos`, so the tree must have been planned, and `w` must start at the
/// root's position.
pub fn write_node<W: Write>(node: &Node, w: &mut FieldWriter<W>) -> Result<()> {
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        debug_assert_eq!(
            w.position(),
            node.byte_pos(),
            "record written away from its planned offset"
        );

        w.write_int("value length", node.value_length(), VALUE_FIELD_LENGTH)?;
        w.write_bytes(node.value_bytes())?;
        w.write_int(
            "child count",
            node.child_count() as u64,
            CHILD_COUNT_FIELD_LENGTH,
        )?;

        for (letter, child) in node.children() {
            w.write_char(letter)?;
            w.write_int("child offset", child.byte_pos(), POSITION_FIELD_LENGTH)?;
        }

        stack.extend(node.children().rev().map(|(_, child)| child));
    }

    Ok(())
}
