//! Pure helpers: mention extraction, sender classification, kebab-case, ids.
//!
//! These have no suspension points and no I/O, so they are tested with plain
//! `#[test]` functions rather than `#[tokio::test]`.

/// Classification of a message's `sender` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenderType {
    Human,
    System,
    Agent,
}

/// Returns at most one mention — the first `@name` match where `name` matches
/// `[A-Za-z0-9]+([-_][A-Za-z0-9]+)*`, lowercased. `None` means broadcast.
///
/// A regex search for that grammar takes the *longest conforming prefix* of
/// whatever follows `@`, not "the whole run of mention characters or
/// nothing" — a trailing separator (`"@bad-"`) or a doubled one (`"@a--b"`)
/// can't be part of the match, so the match stops one character short of
/// them rather than failing outright.
pub fn extract_mentions(content: &str) -> Option<String> {
    let bytes = content.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'@' {
            let start = i + 1;
            let mut pos = start;
            let mut last_valid_end = start;
            let mut prev_was_sep = false;
            let mut saw_alnum = false;
            while pos < bytes.len() && is_mention_char(bytes[pos]) {
                let c = bytes[pos];
                if c == b'-' || c == b'_' {
                    if pos == start || prev_was_sep || !saw_alnum {
                        break;
                    }
                    prev_was_sep = true;
                } else {
                    prev_was_sep = false;
                    saw_alnum = true;
                    last_valid_end = pos + 1;
                }
                pos += 1;
            }
            if last_valid_end > start {
                return Some(content[start..last_valid_end].to_lowercase());
            }
        }
        i += 1;
    }
    None
}

fn is_mention_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Classifies a `sender` string per spec §4.3.
pub fn determine_sender_type(sender: &str) -> SenderType {
    let lower = sender.to_lowercase();
    match lower.as_str() {
        "human" | "user" | "you" => SenderType::Human,
        "system" | "world" | "" => SenderType::System,
        _ => SenderType::Agent,
    }
}

/// Converts a string to kebab-case: trims, inserts a hyphen between a
/// lowercase/digit and a following uppercase letter, collapses runs of
/// non-alphanumeric characters into a single hyphen, strips leading/trailing
/// hyphens, and lowercases.
pub fn to_kebab_case(s: &str) -> String {
    let trimmed = s.trim();
    let mut out = String::with_capacity(trimmed.len() + 4);
    let mut prev: Option<char> = None;
    for c in trimmed.chars() {
        if c.is_ascii_alphanumeric() {
            if let Some(p) = prev {
                if (p.is_ascii_lowercase() || p.is_ascii_digit()) && c.is_ascii_uppercase() {
                    out.push('-');
                }
            }
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
        prev = Some(c);
    }
    let trimmed_hyphens = out.trim_matches('-');
    trimmed_hyphens.to_lowercase()
}

/// `world.turnLimit` with the spec's default of 5.
pub fn world_turn_limit(turn_limit: Option<u32>) -> u32 {
    turn_limit.unwrap_or(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_mentions_returns_first_valid_mention_lowercased() {
        assert_eq!(extract_mentions("@Alice ping @bob"), Some("alice".into()));
        assert_eq!(extract_mentions("hello there"), None);
        assert_eq!(extract_mentions("@multi-word_name hi"), Some("multi-word_name".into()));
    }

    #[test]
    fn extract_mentions_matches_longest_valid_prefix() {
        assert_eq!(extract_mentions("@-bad"), None);
        assert_eq!(extract_mentions("@bad-"), Some("bad".into()));
        assert_eq!(extract_mentions("@alice- hello"), Some("alice".into()));
        assert_eq!(extract_mentions("@a--b"), Some("a".into()));
        assert_eq!(extract_mentions("@"), None);
    }

    #[test]
    fn determine_sender_type_classifies_known_values() {
        assert_eq!(determine_sender_type("HUMAN"), SenderType::Human);
        assert_eq!(determine_sender_type("you"), SenderType::Human);
        assert_eq!(determine_sender_type("system"), SenderType::System);
        assert_eq!(determine_sender_type(""), SenderType::System);
        assert_eq!(determine_sender_type("alice"), SenderType::Agent);
    }

    #[test]
    fn to_kebab_case_handles_camel_case_and_separators() {
        assert_eq!(to_kebab_case("HelloWorld"), "hello-world");
        assert_eq!(to_kebab_case("  My Agent Name  "), "my-agent-name");
        assert_eq!(to_kebab_case("already-kebab"), "already-kebab");
        assert_eq!(to_kebab_case("multi___underscore"), "multi-underscore");
    }

    #[test]
    fn to_kebab_case_is_idempotent() {
        for s in ["HelloWorld", "My Agent Name", "already-kebab", "weird__mix--Case"] {
            let once = to_kebab_case(s);
            let twice = to_kebab_case(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn world_turn_limit_defaults_to_five() {
        assert_eq!(world_turn_limit(None), 5);
        assert_eq!(world_turn_limit(Some(3)), 3);
    }
}
