//! JSON record export: an array with one object per row, keys in column
//! order. Missing cells become `null`, dates ISO strings.

use crate::error::ExportResult;
use crate::models::Table;

pub fn to_json(table: &Table) -> ExportResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&table.to_records())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use serde_json::{json, Value};

    #[test]
    fn test_records() {
        let table = parse_str("name,age,city\nAnn,30,\nBo,45,Oslo\n", ',').unwrap();
        let value: Value = serde_json::from_slice(&to_json(&table).unwrap()).unwrap();
        assert_eq!(
            value,
            json!([
                {"name": "Ann", "age": 30, "city": null},
                {"name": "Bo", "age": 45, "city": "Oslo"}
            ])
        );
    }

    #[test]
    fn test_key_order_follows_columns() {
        let table = parse_str("zeta,alpha\n1,2\n", ',').unwrap();
        let text = String::from_utf8(to_json(&table).unwrap()).unwrap();
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
    }

    #[test]
    fn test_pretty_printed_with_two_space_indent() {
        let table = parse_str("a,b\n1,x\n", ',').unwrap();
        let text = String::from_utf8(to_json(&table).unwrap()).unwrap();
        assert_eq!(text, "[\n  {\n    \"a\": 1,\n    \"b\": \"x\"\n  }\n]");
    }

    #[test]
    fn test_empty_table_is_empty_array() {
        let table = parse_str("a,b\n", ',').unwrap();
        assert_eq!(to_json(&table).unwrap(), b"[]");
    }
}
