//! Human-readable digests and change detection between cycles

use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{CheckOutcome, Country, ReachabilityChange, Target};

const REACHABLE: &str = "✅";
const UNREACHABLE: &str = "❌";

fn mark(is_active: bool) -> &'static str {
    if is_active {
        REACHABLE
    } else {
        UNREACHABLE
    }
}

/// Reachability flags of every (target, country) pair before a cycle
#[derive(Debug, Clone, Default)]
pub struct ReachabilitySnapshot {
    flags: HashMap<(i64, Country), bool>,
}

impl ReachabilitySnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the stored outcomes of one country
    pub fn record(&mut self, country: &Country, rows: &[(Target, CheckOutcome)]) {
        for (target, outcome) in rows {
            self.flags
                .insert((target.id, country.clone()), outcome.is_active);
        }
    }

    /// Flag recorded for a pair, `None` when it was never checked
    pub fn previous(&self, target_id: i64, country: &Country) -> Option<bool> {
        self.flags.get(&(target_id, country.clone())).copied()
    }

    /// Number of recorded pairs
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Compare fresh outcomes against the snapshot
    ///
    /// A pair is reported when its flag flipped, or when it is seen for the
    /// first time and is unreachable.
    pub fn changes<'a>(
        &self,
        targets: &[Target],
        outcomes: impl IntoIterator<Item = &'a CheckOutcome>,
    ) -> Vec<ReachabilityChange> {
        let urls: HashMap<i64, &str> = targets.iter().map(|t| (t.id, t.url.as_str())).collect();

        outcomes
            .into_iter()
            .filter_map(|outcome| {
                let url = urls.get(&outcome.target_id)?;
                let previous = self.previous(outcome.target_id, &outcome.country);

                let changed = match previous {
                    Some(was_active) => was_active != outcome.is_active,
                    None => !outcome.is_active,
                };

                changed.then(|| ReachabilityChange {
                    url: url.to_string(),
                    country: outcome.country.clone(),
                    previous,
                    current: outcome.is_active,
                })
            })
            .collect()
    }
}

/// Longest text a single Telegram message may carry
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Render a change digest, grouped by country in `countries` order
///
/// The digest is split on line boundaries into messages of at most
/// [`MAX_MESSAGE_CHARS`] characters. Empty when there is nothing to report.
pub fn format_changes(changes: &[ReachabilityChange], countries: &[Country]) -> Vec<String> {
    if changes.is_empty() {
        return Vec::new();
    }

    let mut text = String::from("Site availability changed\n\n");

    let mut ordered: Vec<&Country> = countries.iter().collect();
    for change in changes {
        if !ordered.contains(&&change.country) {
            ordered.push(&change.country);
        }
    }

    for country in ordered {
        for change in changes.iter().filter(|c| &c.country == country) {
            let _ = writeln!(text, "{} {} ({})", mark(change.current), change.url, country);
        }
    }

    split_message(&text, MAX_MESSAGE_CHARS)
}

/// Split `text` into chunks of at most `limit` characters
///
/// Chunks break after a newline; a single line longer than `limit` is cut
/// at the limit.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let len = line.chars().count();

        if current_len + len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if len > limit {
            let chars: Vec<char> = line.chars().collect();
            chunks.extend(chars.chunks(limit).map(|piece| piece.iter().collect::<String>()));
            continue;
        }

        current.push_str(line);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Render the registry listing of one country
pub fn format_registry(country: &Country, rows: &[(Target, CheckOutcome)]) -> String {
    let mut text = format!("Site registry for {}\n\n", country.display_name());
    for (target, outcome) in rows {
        let _ = writeln!(text, "{}{}", mark(outcome.is_active), target.url);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ru() -> Country {
        Country::parse("RU").unwrap()
    }

    fn by() -> Country {
        Country::parse("BY").unwrap()
    }

    fn target(id: i64, url: &str) -> Target {
        Target {
            id,
            url: url.to_string(),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn outcome(target_id: i64, country: Country, is_active: bool) -> CheckOutcome {
        CheckOutcome {
            target_id,
            country,
            proxy_id: Some(1),
            is_active,
            status_code: if is_active { 200 } else { 451 },
            body: String::new(),
            error_text: String::new(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_changes_detects_flips_and_new_failures() {
        let targets = vec![
            target(1, "https://a.example/"),
            target(2, "https://b.example/"),
            target(3, "https://c.example/"),
            target(4, "https://d.example/"),
        ];

        let mut snapshot = ReachabilitySnapshot::new();
        snapshot.record(
            &ru(),
            &[
                (targets[0].clone(), outcome(1, ru(), true)),
                (targets[1].clone(), outcome(2, ru(), false)),
            ],
        );
        assert_eq!(snapshot.len(), 2);

        let fresh = vec![
            outcome(1, ru(), false), // flipped to blocked
            outcome(2, ru(), false), // unchanged
            outcome(3, ru(), true),  // new and reachable
            outcome(4, ru(), false), // new and blocked
        ];

        let changes = snapshot.changes(&targets, &fresh);
        let urls: Vec<&str> = changes.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/", "https://d.example/"]);
        assert_eq!(changes[0].previous, Some(true));
        assert_eq!(changes[1].previous, None);
    }

    #[test]
    fn test_changes_are_per_country() {
        let targets = vec![target(1, "https://a.example/")];
        let mut snapshot = ReachabilitySnapshot::new();
        snapshot.record(&ru(), &[(targets[0].clone(), outcome(1, ru(), false))]);

        let fresh = vec![outcome(1, by(), false)];
        let changes = snapshot.changes(&targets, &fresh);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].country, by());
    }

    #[test]
    fn test_format_changes_groups_by_country() {
        let changes = vec![
            ReachabilityChange {
                url: "https://a.example/".to_string(),
                country: by(),
                previous: Some(true),
                current: false,
            },
            ReachabilityChange {
                url: "https://b.example/".to_string(),
                country: ru(),
                previous: Some(false),
                current: true,
            },
        ];

        let digests = format_changes(&changes, &[ru(), by()]);
        assert_eq!(digests.len(), 1);
        let text = &digests[0];
        let lines: Vec<&str> = text.lines().skip(2).collect();
        assert_eq!(
            lines,
            vec!["✅ https://b.example/ (RU)", "❌ https://a.example/ (BY)"]
        );
    }

    #[test]
    fn test_format_changes_empty() {
        assert!(format_changes(&[], &[ru()]).is_empty());
    }

    #[test]
    fn test_large_digest_is_split_on_lines() {
        let changes: Vec<ReachabilityChange> = (0..200)
            .map(|i| ReachabilityChange {
                url: format!("https://site-{i:03}.example/some/longer/path/to/page"),
                country: if i % 2 == 0 { ru() } else { by() },
                previous: None,
                current: false,
            })
            .collect();

        let digests = format_changes(&changes, &[ru(), by()]);
        assert!(digests.len() > 1);
        assert!(digests.iter().all(|d| d.chars().count() <= MAX_MESSAGE_CHARS));
        assert!(digests.iter().all(|d| d.ends_with('\n')));
        assert!(digests[0].starts_with("Site availability changed\n\n"));

        let lines: usize = digests.iter().map(|d| d.lines().filter(|l| l.contains("://")).count()).sum();
        assert_eq!(lines, 200);
    }

    #[test]
    fn test_split_message() {
        assert_eq!(split_message("a\nb\nc\n", 4), vec!["a\nb\n", "c\n"]);
        assert_eq!(split_message("short", 10), vec!["short"]);
        assert_eq!(split_message("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(split_message("x\nabcdef\ny", 4), vec!["x\n", "abcd", "ef\n", "y"]);
        assert!(split_message("", 4).is_empty());
    }

    #[test]
    fn test_format_registry() {
        let rows = vec![
            (target(1, "https://a.example/"), outcome(1, ru(), true)),
            (target(2, "https://b.example/"), outcome(2, ru(), false)),
        ];

        let text = format_registry(&ru(), &rows);
        assert_eq!(
            text,
            "Site registry for Russia\n\n✅https://a.example/\n❌https://b.example/\n"
        );
    }
}
