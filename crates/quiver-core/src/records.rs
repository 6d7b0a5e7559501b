//! Record files: a JSON array or JSON Lines.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Parse records from a JSON array or from JSON Lines.
///
/// Content whose first non-blank character is `[` is read as one array;
/// anything else is read one record per non-blank line. Line errors are
/// reported as `"{what} line N: ..."`, counting from 1.
pub fn parse_json_records<T: DeserializeOwned>(content: &str, what: &str) -> Result<Vec<T>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| Error::invalid_data(format!("{what} line {}: {e}", n + 1)))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Row {
        id: String,
    }

    #[test]
    fn test_parse_array_with_leading_whitespace() {
        let content = "\n  [{\"id\": \"a\"}, {\"id\": \"b\"}]";
        let rows: Vec<Row> = parse_json_records(content, "Rows").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, "b");
    }

    #[test]
    fn test_parse_lines_skips_blanks() {
        let content = "{\"id\": \"a\"}\n\n   \n{\"id\": \"b\"}\n";
        let rows: Vec<Row> = parse_json_records(content, "Rows").unwrap();
        assert_eq!(rows, vec![Row { id: "a".into() }, Row { id: "b".into() }]);
    }

    #[test]
    fn test_parse_empty_content() {
        let rows: Vec<Row> = parse_json_records("", "Rows").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_line_error_names_source_and_line() {
        let err =
            parse_json_records::<Row>("{\"id\": \"a\"}\n{oops\n", "Document file").unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)), "{err:?}");
        assert!(err.to_string().contains("Document file line 2"), "{err}");
    }

    #[test]
    fn test_array_error_is_serialization() {
        let err = parse_json_records::<Row>("[{\"id\": 1}]", "Rows").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)), "{err:?}");
    }
}
