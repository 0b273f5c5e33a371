//! Boolean contains-expressions over literal substrings.
//!
//! `timeout|refused` matches either word, `db&!retry` requires `db` without
//! `retry`. `|` binds loosest, then `&`, then the `!` prefix. Matching is
//! case-insensitive and blank terms are ignored.

/// A parsed message expression in disjunctive normal form
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageExpr {
    /// OR of AND-groups
    groups: Vec<Vec<Term>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Term {
    needle: String,
    negated: bool,
}

impl MessageExpr {
    pub fn parse(expr: &str) -> Self {
        let groups = expr
            .split('|')
            .map(|group| {
                group
                    .split('&')
                    .filter_map(|raw| {
                        let raw = raw.trim();
                        let (negated, needle) = match raw.strip_prefix('!') {
                            Some(rest) => (true, rest.trim()),
                            None => (false, raw),
                        };
                        (!needle.is_empty()).then(|| Term {
                            needle: needle.to_lowercase(),
                            negated,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect();

        Self { groups }
    }

    /// An expression with no terms matches everything
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn matches(&self, message: &str) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        let haystack = message.to_lowercase();
        self.groups.iter().any(|group| {
            group
                .iter()
                .all(|term| haystack.contains(&term.needle) != term.negated)
        })
    }
}

/// One-shot helper: does `message` satisfy `expr`?
pub fn message_matches(message: &str, expr: &str) -> bool {
    MessageExpr::parse(expr).matches(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_substring() {
        assert!(message_matches("Connection refused by peer", "refused"));
        assert!(message_matches("Connection REFUSED", "refused"));
        assert!(!message_matches("all good", "refused"));
    }

    #[test]
    fn test_or_and_not() {
        assert!(message_matches("db timeout", "timeout|refused"));
        assert!(message_matches("db refused", "timeout|refused"));
        assert!(message_matches("db timeout", "db & !retry"));
        assert!(!message_matches("db timeout, retry 3", "db&!retry"));
        assert!(message_matches("cache miss", "db&!retry | cache"));
    }

    #[test]
    fn test_empty_and_blank_terms() {
        assert!(MessageExpr::parse("").is_empty());
        assert!(MessageExpr::parse(" | & ! ").is_empty());
        assert!(message_matches("anything", ""));
        assert!(message_matches("db", "db&"));
    }

    #[test]
    fn test_negation_only() {
        assert!(message_matches("healthy", "!error"));
        assert!(!message_matches("error here", "!error"));
    }
}
