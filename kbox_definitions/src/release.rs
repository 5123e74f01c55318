//! Release history records.

use chrono::{DateTime, Utc};

use crate::manifest::Config;

/// At most this many releases are retained per `(namespace, app)`;
/// pruning discards the oldest.
pub const MAX_HISTORY: usize = 10;

/// One persisted deployment of one `(namespace, app)`. Revisions are
/// strictly increasing and never reused, even once pruned from history.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Release {
    pub revision: u32,
    pub timestamp: DateTime<Utc>,
    pub image: String,
    /// The exact `Config` that was rendered and applied for this
    /// revision, so rollback can re-render it against current renderer
    /// rules rather than replaying stale cluster objects.
    pub config: Config,
}

/// The revision the *next* `Save` should use: one past the highest
/// revision on record, or `1` for an empty history.
pub fn next_revision(existing: &[Release]) -> u32 {
    existing.iter().map(|r| r.revision).max().unwrap_or(0) + 1
}

/// Appends `release` to `existing` and truncates to [`MAX_HISTORY`],
/// discarding the oldest when the list overflows. Assumes
/// `existing` is already sorted ascending by revision.
pub fn append_release(mut existing: Vec<Release>, release: Release) -> Vec<Release> {
    existing.push(release);
    if existing.len() > MAX_HISTORY {
        let overflow = existing.len() - MAX_HISTORY;
        existing.drain(0..overflow);
    }
    existing
}

/// `Get(revision)`.
pub fn find_revision(releases: &[Release], revision: u32) -> Option<&Release> {
    releases.iter().find(|r| r.revision == revision)
}

/// `GetLatest()`.
pub fn latest(releases: &[Release]) -> Option<&Release> {
    releases.iter().max_by_key(|r| r.revision)
}

/// `GetPrevious()`: requires at least two releases.
pub fn previous(releases: &[Release]) -> Option<&Release> {
    if releases.len() < 2 {
        return None;
    }
    let mut sorted: Vec<&Release> = releases.iter().collect();
    sorted.sort_by_key(|r| r.revision);
    sorted.get(sorted.len() - 2).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let r = Release {
            revision: 1,
            timestamp: Utc::now(),
            image: "myapp:v1".into(),
            config: Config { name: "myapp".into(), image: Some("myapp:v1".into()), ..Config::default() },
        };
        let json = serde_json::to_string(&r).unwrap();
        let back: Release = serde_json::from_str(&json).unwrap();
        assert_eq!(back.revision, 1);
        assert_eq!(back.config.name, "myapp");
    }

    fn release_at(revision: u32) -> Release {
        Release { revision, timestamp: Utc::now(), image: format!("myapp:v{}", revision), config: Config::default() }
    }

    #[test]
    fn next_revision_starts_at_one() {
        assert_eq!(next_revision(&[]), 1);
        assert_eq!(next_revision(&[release_at(1), release_at(2)]), 3);
    }

    #[test]
    fn append_truncates_to_max_history() {
        let mut releases = Vec::new();
        for i in 1..=MAX_HISTORY as u32 {
            releases = append_release(releases, release_at(i));
        }
        assert_eq!(releases.len(), MAX_HISTORY);
        releases = append_release(releases, release_at(MAX_HISTORY as u32 + 1));
        assert_eq!(releases.len(), MAX_HISTORY);
        assert_eq!(releases.first().unwrap().revision, 2);
        assert_eq!(releases.last().unwrap().revision, MAX_HISTORY as u32 + 1);
    }

    #[test]
    fn latest_and_previous_and_find() {
        let releases = vec![release_at(1), release_at(2), release_at(3)];
        assert_eq!(latest(&releases).unwrap().revision, 3);
        assert_eq!(previous(&releases).unwrap().revision, 2);
        assert_eq!(find_revision(&releases, 1).unwrap().image, "myapp:v1");
        assert!(find_revision(&releases, 99).is_none());
    }

    #[test]
    fn previous_requires_two_releases() {
        assert!(previous(&[release_at(1)]).is_none());
        assert!(previous(&[]).is_none());
    }
}
