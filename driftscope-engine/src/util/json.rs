use std::fmt::Display;

use serde::de::DeserializeOwned;

/// A JSON decode error that remembers where in the (pretty printed) document
/// it happened.
#[derive(Debug, thiserror::Error)]
pub struct PrettyJsonError {
    #[source]
    source: serde_json::Error,
    pretty: Option<(usize, usize, String)>,
}

impl PrettyJsonError {
    pub fn pretty_json(&self) -> Option<&str> {
        self.pretty.as_ref().map(|(_, _, json)| json.as_str())
    }

    /// Zero-based line and column into [`pretty_json`][Self::pretty_json].
    pub fn position(&self) -> Option<(usize, usize)> {
        self.pretty.as_ref().map(|(line, column, _)| (*line, *column))
    }

    pub fn is_syntax(&self) -> bool {
        self.source.is_syntax() || self.source.is_eof()
    }
}

impl Display for PrettyJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", &self.source)?;

        if let Some((line, column, pretty)) = &self.pretty {
            for (line_num, line_str) in pretty.lines().enumerate() {
                if line.abs_diff(line_num) < 5 {
                    writeln!(f, "{:>4} {line_str}", line_num + 1)?;
                }
                if *line == line_num {
                    writeln!(f, "     {}^", "-".repeat(*column))?;
                }
            }
        }

        Ok(())
    }
}

/// Decodes JSON. On failure the document is pretty printed and decoded
/// again, so the error can point at a readable excerpt.
///
/// Documents that aren't even syntactically valid JSON can't be pretty
/// printed and only carry serde's position.
pub fn json_decode<T: DeserializeOwned>(json: impl AsRef<[u8]>) -> Result<T, PrettyJsonError> {
    let json = json.as_ref();
    serde_json::from_slice(json).map_err(|source| {
        let pretty = serde_json::from_slice::<serde_json::Value>(json)
            .and_then(|value| serde_json::to_string_pretty(&value))
            .ok()
            .and_then(|pretty_json| {
                serde_json::from_str::<T>(&pretty_json).err().map(|error| {
                    (
                        error.line().saturating_sub(1),
                        error.column().saturating_sub(1),
                        pretty_json,
                    )
                })
            });

        PrettyJsonError { source, pretty }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::util::json::json_decode;

    #[test]
    fn it_points_at_the_offending_line() {
        let error = json_decode::<BTreeMap<String, Vec<u64>>>(br#"{"a":[1,2],"b":[3,"x"]}"#)
            .unwrap_err();

        let (line, _) = error.position().unwrap();
        let pretty = error.pretty_json().unwrap();
        assert_eq!(pretty.lines().nth(line).unwrap().trim(), "\"x\"");
        assert!(error.to_string().contains("^"));
    }

    #[test]
    fn syntax_errors_have_no_excerpt() {
        let error = json_decode::<BTreeMap<String, u64>>(b"{\"a\": 1").unwrap_err();
        assert!(error.is_syntax());
        assert!(error.pretty_json().is_none());
    }
}
