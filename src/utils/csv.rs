// Minimal CSV writing for the result matrices. Fields containing a
// separator or quote are quoted per RFC 4180.

use std::io::{self, Write};

pub fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn write_row<W: Write>(writer: &mut W, fields: &[String]) -> io::Result<()> {
    let line = fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(writer, "{}", line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_fields_pass_through() {
        assert_eq!(escape_field("aph(6)-Id"), "aph(6)-Id");
        assert_eq!(escape_field("GCF_000123.1"), "GCF_000123.1");
    }

    #[test]
    fn test_fields_with_separators_are_quoted() {
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_write_row() {
        let mut buf = Vec::new();
        write_row(
            &mut buf,
            &["ACCESSION No.".to_string(), "GENUS".to_string(), "a,b".to_string()],
        )
        .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "ACCESSION No.,GENUS,\"a,b\"\n");
    }
}
