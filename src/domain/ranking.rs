//! Keyword usage ranking.

use std::collections::HashMap;

use serde::Serialize;

use super::entities::UsageEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordTally {
    pub keyword: String,
    pub count: u64,
}

/// Tally keyword occurrences and order them by count, highest first.
///
/// Keywords with equal counts keep the order in which they first appear in
/// the input, so the result is deterministic for a given sequence.
pub fn rank_keywords<I, S>(keywords: I) -> Vec<KeywordTally>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut tallies: Vec<KeywordTally> = Vec::new();

    for keyword in keywords {
        let keyword = keyword.as_ref();
        match positions.get(keyword) {
            Some(&index) => tallies[index].count += 1,
            None => {
                positions.insert(keyword.to_string(), tallies.len());
                tallies.push(KeywordTally {
                    keyword: keyword.to_string(),
                    count: 1,
                });
            }
        }
    }

    // sort_by is stable; first-occurrence order survives among equal counts
    tallies.sort_by(|a, b| b.count.cmp(&a.count));
    tallies
}

pub fn rank_usage(events: &[UsageEvent]) -> Vec<KeywordTally> {
    rank_keywords(events.iter().map(|event| event.keyword.as_str()))
}
