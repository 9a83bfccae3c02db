use crate::directory::{DirectoryEntry, DirectoryError, DirectoryResult};
use crate::pushdown::ENTRY_DN_ATTRIBUTE;

/// A parsed search filter in the string representation of RFC 4515.
///
/// Only the subset needed for evaluating searches in memory is supported:
/// `&`, `|`, `!`, equality, presence and substrings.
/// Matching ignores case for both attribute names and values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    And(Vec<SearchFilter>),
    Or(Vec<SearchFilter>),
    Not(Box<SearchFilter>),
    Equality { attribute: String, value: String },
    Present { attribute: String },
    Substrings { attribute: String, parts: Vec<String> },
}

impl SearchFilter {
    pub fn parse(input: &str) -> DirectoryResult<Self> {
        let mut parser = FilterParser {
            input: input.trim().as_bytes(),
            position: 0,
        };
        let filter = parser.parse_filter()?;
        if parser.position != parser.input.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(filter)
    }

    pub fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            SearchFilter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            SearchFilter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            SearchFilter::Not(filter) => !filter.matches(entry),
            SearchFilter::Equality { attribute, value } => entry_values(entry, attribute)
                .iter()
                .any(|v| values_equal(attribute, v, value)),
            SearchFilter::Present { attribute } => {
                attribute.eq_ignore_ascii_case("objectClass")
                    || !entry_values(entry, attribute).is_empty()
            }
            SearchFilter::Substrings { attribute, parts } => entry_values(entry, attribute)
                .iter()
                .any(|v| substrings_match(&v.to_lowercase(), parts)),
        }
    }
}

fn entry_values<'a>(entry: &'a DirectoryEntry, attribute: &str) -> Vec<&'a str> {
    if attribute.eq_ignore_ascii_case(ENTRY_DN_ATTRIBUTE) {
        return vec![entry.dn()];
    }
    entry
        .attribute(attribute)
        .map(|a| a.values.values().iter().map(String::as_str).collect())
        .unwrap_or_default()
}

fn values_equal(attribute: &str, left: &str, right: &str) -> bool {
    if attribute.eq_ignore_ascii_case(ENTRY_DN_ATTRIBUTE) {
        normalize_dn(left) == normalize_dn(right)
    } else {
        left.eq_ignore_ascii_case(right)
    }
}

/// Normalizes a distinguished name for comparison: lowercase, and no
/// spaces around RDN separators. Escaped separators are not handled.
pub(crate) fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| {
            rdn.split('=')
                .map(|s| s.trim().to_lowercase())
                .collect::<Vec<_>>()
                .join("=")
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn substrings_match(value: &str, parts: &[String]) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return true;
    };
    let Some((last, middle)) = rest.split_last() else {
        return value == first.as_str();
    };
    let Some(mut remaining) = value.strip_prefix(first.as_str()) else {
        return false;
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(i) => remaining = &remaining[i + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last.as_str())
}

struct FilterParser<'a> {
    input: &'a [u8],
    position: usize,
}

impl FilterParser<'_> {
    fn error(&self, message: &str) -> DirectoryError {
        DirectoryError::new(format!(
            "bad search filter at position {}: {message}",
            self.position
        ))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn expect(&mut self, c: u8) -> DirectoryResult<()> {
        if self.peek() == Some(c) {
            self.position += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c as char)))
        }
    }

    fn parse_filter(&mut self) -> DirectoryResult<SearchFilter> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.position += 1;
                SearchFilter::And(self.parse_filter_list()?)
            }
            Some(b'|') => {
                self.position += 1;
                SearchFilter::Or(self.parse_filter_list()?)
            }
            Some(b'!') => {
                self.position += 1;
                SearchFilter::Not(Box::new(self.parse_filter()?))
            }
            _ => self.parse_item()?,
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_filter_list(&mut self) -> DirectoryResult<Vec<SearchFilter>> {
        let mut filters = vec![];
        while self.peek() == Some(b'(') {
            filters.push(self.parse_filter()?);
        }
        if filters.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(filters)
    }

    fn parse_item(&mut self) -> DirectoryResult<SearchFilter> {
        let input = self.input;
        let start = self.position;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b';' {
                self.position += 1;
            } else {
                break;
            }
        }
        if self.position == start {
            return Err(self.error("missing attribute description"));
        }
        let attribute = String::from_utf8_lossy(&input[start..self.position]).to_string();
        self.expect(b'=')?;
        let start = self.position;
        while let Some(c) = self.peek() {
            if c == b')' || c == b'(' {
                break;
            }
            self.position += 1;
        }
        let raw = &input[start..self.position];
        if raw == b"*" {
            return Ok(SearchFilter::Present { attribute });
        }
        let parts = raw
            .split(|c| *c == b'*')
            .map(|part| self.unescape(part))
            .collect::<DirectoryResult<Vec<_>>>()?;
        if parts.len() == 1 {
            let value = parts.into_iter().next().unwrap_or_default();
            Ok(SearchFilter::Equality { attribute, value })
        } else {
            Ok(SearchFilter::Substrings {
                attribute,
                parts: parts.into_iter().map(|p| p.to_lowercase()).collect(),
            })
        }
    }

    fn unescape(&self, raw: &[u8]) -> DirectoryResult<String> {
        let mut output = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'\\' {
                let hex = raw
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| self.error("invalid escape sequence"))?;
                output.push(hex);
                i += 3;
            } else {
                output.push(raw[i]);
                i += 1;
            }
        }
        String::from_utf8(output).map_err(|_| self.error("value is not valid UTF-8"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn alice() -> DirectoryEntry {
        DirectoryEntry::new("uid=alice,ou=people,dc=example,dc=org")
            .with_attribute("objectClass", ["inetOrgPerson"])
            .with_attribute("cn", ["Alice"])
            .with_attribute("mail", ["alice@example.org", "a@example.org"])
    }

    #[test]
    fn test_parse_nested_filter() {
        let filter = SearchFilter::parse("(&(objectClass=*)(|(cn=bob)(!(mail=x))))").unwrap();
        assert_eq!(
            filter,
            SearchFilter::And(vec![
                SearchFilter::Present {
                    attribute: "objectClass".to_string()
                },
                SearchFilter::Or(vec![
                    SearchFilter::Equality {
                        attribute: "cn".to_string(),
                        value: "bob".to_string()
                    },
                    SearchFilter::Not(Box::new(SearchFilter::Equality {
                        attribute: "mail".to_string(),
                        value: "x".to_string()
                    })),
                ]),
            ])
        );
    }

    #[test]
    fn test_parse_rejects_malformed_filters() {
        for filter in ["cn=alice", "(cn=alice", "(&)", "(=x)", "(cn=a\\zz)", "(cn=a))"] {
            assert!(SearchFilter::parse(filter).is_err(), "{filter}");
        }
    }

    #[test]
    fn test_equality_ignores_case_and_matches_any_value() {
        let entry = alice();
        assert!(SearchFilter::parse("(CN=alice)").unwrap().matches(&entry));
        assert!(SearchFilter::parse("(mail=a@example.org)")
            .unwrap()
            .matches(&entry));
        assert!(!SearchFilter::parse("(cn=bob)").unwrap().matches(&entry));
    }

    #[test]
    fn test_entry_dn_matches_distinguished_name() {
        let entry = alice();
        let filter =
            SearchFilter::parse("(entryDN=UID=alice, ou=people,dc=example,dc=org)").unwrap();
        assert!(filter.matches(&entry));
        let filter = SearchFilter::parse("(entryDN=uid=bob,ou=people,dc=example,dc=org)").unwrap();
        assert!(!filter.matches(&entry));
    }

    #[test]
    fn test_escaped_value() {
        let entry = DirectoryEntry::new("cn=a*b,dc=org").with_attribute("cn", ["a*b"]);
        assert!(SearchFilter::parse("(cn=a\\2ab)").unwrap().matches(&entry));
        assert!(SearchFilter::parse("(cn=a*)").unwrap().matches(&entry));
    }

    #[test]
    fn test_substrings() {
        let entry = alice();
        assert!(SearchFilter::parse("(mail=*@example.org)")
            .unwrap()
            .matches(&entry));
        assert!(SearchFilter::parse("(cn=a*i*e)").unwrap().matches(&entry));
        assert!(!SearchFilter::parse("(cn=b*)").unwrap().matches(&entry));
    }
}
