use crate::gateway::protocol::builder::MessageBuilder;
use crate::gateway::protocol::message::Messages;
use crate::gateway::protocol::tag::Tag;
use crate::gateway::protocol::types::type_len;

/// One column of a RowDescription, as synthesized by the catalog layer or
/// the backend executor's result-set metadata.
pub struct ColumnDescription {
    pub name: String,
    pub table_oid: i32,
    pub column_attr_num: i16,
    pub type_oid: i32,
    pub type_mod: i32,
    pub binary: bool,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, type_oid: i32) -> Self {
        Self { name: name.into(), table_oid: 0, column_attr_num: 0, type_oid, type_mod: -1, binary: false }
    }
}

/// Builds a RowDescription message ('T') from column metadata. Mirrors
/// the wire layout: i16 field count, then per field a null-terminated name
/// followed by table_oid(i32), attnum(i16), type_oid(i32), type_len(i16),
/// type_mod(i32), format_code(i16).
pub fn build_row_description(columns: &[ColumnDescription]) -> Messages {
    let mut mb = MessageBuilder::new(Tag::ROW_DESCRIPTION);
    write_row_description_body(&mut mb, columns);
    mb.finish()
}

/// Writes the RowDescription body into a builder already positioned at a
/// `ROW_DESCRIPTION` message (via `MessageBuilder::new` or a preceding
/// `add_new`) — used when RowDescription is one message among several
/// (DataRow, CommandComplete, ReadyForQuery) going out together.
pub fn write_row_description_body(mb: &mut MessageBuilder, columns: &[ColumnDescription]) {
    mb.write_i16(columns.len() as i16);
    for col in columns {
        mb.write_str(&col.name);
        mb.write_i32(col.table_oid);
        mb.write_i16(col.column_attr_num);
        mb.write_i32(col.type_oid);
        mb.write_i16(type_len(col.type_oid));
        mb.write_i32(col.type_mod);
        mb.write_i16(if col.binary { 1 } else { 0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::protocol::types::INT4;

    #[test]
    fn builds_expected_field_count() {
        let cols = vec![ColumnDescription::new("id", INT4)];
        let msg = build_row_description(&cols);
        let first = msg.first().unwrap();
        assert_eq!(first.tag(), Tag::ROW_DESCRIPTION);
        let mut r = first.reader();
        assert_eq!(r.read_i16(), 1);
    }
}
