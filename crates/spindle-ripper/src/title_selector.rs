//! Title Selector: chooses which MakeMKV titles to rip from a disc's
//! candidate list, for both the movie branch (single feature) and the TV
//! branch (one title per episode).

use regex::Regex;
use serde::{Deserialize, Serialize};
use spindle_core::{Episode, MediaType, RipSpecEnvelope, Title};
use std::sync::LazyLock;

/// Runtime-tunable thresholds for the movie-branch title selector (spec
/// §9's Open Question: these are calibrated empirically and must be
/// configuration, not hard-coded constants).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionThresholds {
    /// Minimum duration, in seconds, for a title to be considered
    /// feature-length.
    pub min_primary_runtime: f64,
    /// Maximum duration drift, in seconds, tolerated when comparing
    /// candidates against the longest title in the current pool.
    pub duration_tolerance: f64,
}

impl Default for SelectionThresholds {
    fn default() -> Self {
        Self {
            min_primary_runtime: 20.0 * 60.0,
            duration_tolerance: 2.0,
        }
    }
}

static MULTI_LANGUAGE_PLAYLIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^00([8-9]\d\d)\.mpls$").unwrap());

static TITLE_FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_t(\d{2,3})\.").unwrap());

/// Human-readable record of why a candidate was kept or dropped, used for
/// logging.
#[derive(Debug, Clone)]
pub struct SelectionReport {
    /// Filter stage names applied in order, each paired with the candidate
    /// count remaining after it ran.
    pub narrowing: Vec<(&'static str, usize)>,
    /// The final chosen title ids.
    pub selected: Vec<i64>,
}

/// Parse a title id out of a ripped file name produced by the external
/// ripper, e.g. `"South Park Season 5 - Disc 1_t07.mkv"` → `(7, true)`.
#[must_use]
pub fn parse_title_id(file_name: &str) -> (i64, bool) {
    match TITLE_FILE_PATTERN.captures(file_name) {
        Some(captures) => match captures[1].parse::<i64>() {
            Ok(id) => (id, true),
            Err(_) => (0, false),
        },
        None => (0, false),
    }
}

/// Select the set of title ids to rip for `envelope` using the default
/// [`SelectionThresholds`]. See [`select_titles_with_thresholds`] for the
/// configurable form.
#[must_use]
pub fn select_titles(envelope: &RipSpecEnvelope) -> (Vec<i64>, SelectionReport) {
    select_titles_with_thresholds(envelope, &SelectionThresholds::default())
}

/// Select the set of title ids to rip for `envelope`, dispatching on its
/// recorded media type.
///
/// Returns an empty list when nothing qualifies: for TV, when no episode has
/// `title_id >= 0`; for movies, when no candidate has `id >= 0 && duration >
/// 0`.
#[must_use]
pub fn select_titles_with_thresholds(
    envelope: &RipSpecEnvelope,
    thresholds: &SelectionThresholds,
) -> (Vec<i64>, SelectionReport) {
    match envelope.media_type() {
        Some(MediaType::Tv) => select_tv_titles(&envelope.episodes),
        Some(MediaType::Movie) | None => select_movie_titles(&envelope.titles, thresholds),
    }
}

fn select_tv_titles(episodes: &[Episode]) -> (Vec<i64>, SelectionReport) {
    let mut ids: Vec<i64> = episodes
        .iter()
        .map(|episode| episode.title_id)
        .filter(|&id| id >= 0)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    let report = SelectionReport {
        narrowing: vec![("tv_episode_titles", ids.len())],
        selected: ids.clone(),
    };
    (ids, report)
}

fn select_movie_titles(titles: &[Title], thresholds: &SelectionThresholds) -> (Vec<i64>, SelectionReport) {
    let mut narrowing = Vec::new();
    let mut candidates: Vec<&Title> = titles
        .iter()
        .filter(|title| title.id >= 0 && title.duration_seconds > 0.0)
        .collect();
    narrowing.push(("initial", candidates.len()));
    if candidates.is_empty() {
        return (Vec::new(), SelectionReport { narrowing, selected: Vec::new() });
    }

    candidates = apply_multi_language_heuristic(candidates, thresholds, &mut narrowing);
    candidates = apply_duration_window(candidates, thresholds, &mut narrowing);
    candidates = apply_feature_length(candidates, thresholds, &mut narrowing);
    candidates = apply_chapter_count(candidates, &mut narrowing);
    candidates = apply_playlist_format(candidates, &mut narrowing);
    candidates = apply_segment_count(candidates, &mut narrowing);
    candidates = apply_title_hash_majority(candidates, &mut narrowing);

    candidates.sort_by(|a, b| {
        b.duration_seconds
            .partial_cmp(&a.duration_seconds)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    narrowing.push(("tie_break", candidates.len()));

    let selected: Vec<i64> = candidates.first().map(|title| title.id).into_iter().collect();
    let report = SelectionReport { narrowing, selected: selected.clone() };
    (selected, report)
}

/// Narrow `candidates` by `keep`, falling back to the original set when the
/// filter would otherwise yield nothing.
fn narrow<'a, F>(candidates: Vec<&'a Title>, keep: F) -> Vec<&'a Title>
where
    F: Fn(&&Title) -> bool,
{
    let filtered: Vec<&Title> = candidates.iter().copied().filter(keep).collect();
    if filtered.is_empty() { candidates } else { filtered }
}

fn apply_multi_language_heuristic<'a>(
    candidates: Vec<&'a Title>,
    thresholds: &SelectionThresholds,
    narrowing: &mut Vec<(&'static str, usize)>,
) -> Vec<&'a Title> {
    let mut numbered: Vec<(u32, &Title)> = candidates
        .iter()
        .filter_map(|title| {
            MULTI_LANGUAGE_PLAYLIST
                .captures(&title.playlist)
                .and_then(|captures| captures[1].parse::<u32>().ok())
                .filter(|_| title.duration_seconds >= thresholds.min_primary_runtime)
                .map(|value| (value, *title))
        })
        .collect();
    numbered.sort_by_key(|(value, _)| *value);
    numbered.dedup_by_key(|(value, _)| *value);

    let result = if numbered.len() >= 2 {
        let min_value = numbered.first().map(|(value, _)| *value);
        min_value.map_or_else(
            || candidates.clone(),
            |min_value| {
                candidates
                    .iter()
                    .copied()
                    .filter(|title| {
                        MULTI_LANGUAGE_PLAYLIST
                            .captures(&title.playlist)
                            .and_then(|captures| captures[1].parse::<u32>().ok())
                            == Some(min_value)
                    })
                    .collect()
            },
        )
    } else {
        candidates
    };
    narrowing.push(("multi_language_playlist", result.len()));
    result
}

fn apply_duration_window<'a>(
    candidates: Vec<&'a Title>,
    thresholds: &SelectionThresholds,
    narrowing: &mut Vec<(&'static str, usize)>,
) -> Vec<&'a Title> {
    let max_duration = candidates
        .iter()
        .map(|title| title.duration_seconds)
        .fold(0.0_f64, f64::max);
    let result = narrow(candidates, |title| {
        (max_duration - title.duration_seconds).abs() <= thresholds.duration_tolerance
    });
    narrowing.push(("duration_window", result.len()));
    result
}

fn apply_feature_length<'a>(
    candidates: Vec<&'a Title>,
    thresholds: &SelectionThresholds,
    narrowing: &mut Vec<(&'static str, usize)>,
) -> Vec<&'a Title> {
    let has_feature_length = candidates
        .iter()
        .any(|title| title.duration_seconds >= thresholds.min_primary_runtime);
    let result = if has_feature_length {
        narrow(candidates, |title| title.duration_seconds >= thresholds.min_primary_runtime)
    } else {
        candidates
    };
    narrowing.push(("feature_length", result.len()));
    result
}

fn apply_chapter_count<'a>(
    candidates: Vec<&'a Title>,
    narrowing: &mut Vec<(&'static str, usize)>,
) -> Vec<&'a Title> {
    let max_chapters = candidates.iter().map(|title| title.chapters).max().unwrap_or(0);
    let result = if max_chapters > 0 {
        narrow(candidates, |title| title.chapters == max_chapters)
    } else {
        candidates
    };
    narrowing.push(("chapter_count", result.len()));
    result
}

fn apply_playlist_format<'a>(
    candidates: Vec<&'a Title>,
    narrowing: &mut Vec<(&'static str, usize)>,
) -> Vec<&'a Title> {
    let result = narrow(candidates, |title| title.playlist.ends_with(".mpls"));
    narrowing.push(("playlist_format", result.len()));
    result
}

fn apply_segment_count<'a>(
    candidates: Vec<&'a Title>,
    narrowing: &mut Vec<(&'static str, usize)>,
) -> Vec<&'a Title> {
    let max_segments = candidates.iter().map(|title| title.segment_count).max().unwrap_or(0);
    let result = if max_segments > 0 {
        narrow(candidates, |title| title.segment_count == max_segments)
    } else {
        candidates
    };
    narrowing.push(("segment_count", result.len()));
    result
}

fn apply_title_hash_majority<'a>(
    candidates: Vec<&'a Title>,
    narrowing: &mut Vec<(&'static str, usize)>,
) -> Vec<&'a Title> {
    use std::collections::HashMap;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for title in &candidates {
        if !title.title_hash.is_empty() {
            *counts.entry(title.title_hash.as_str()).or_insert(0) += 1;
        }
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    let result = if max_count > 1 {
        let majority_hashes: Vec<&str> = counts
            .iter()
            .filter(|(_, &count)| count == max_count)
            .map(|(hash, _)| *hash)
            .collect();
        narrow(candidates, |title| majority_hashes.contains(&title.title_hash.as_str()))
    } else {
        candidates
    };
    narrowing.push(("title_hash_majority", result.len()));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn title(id: i64, duration: f64, playlist: &str) -> Title {
        Title {
            id,
            name: format!("title-{id}"),
            duration_seconds: duration,
            chapters: 0,
            playlist: playlist.to_string(),
            segment_count: 0,
            title_hash: String::new(),
        }
    }

    fn envelope_with_titles(titles: Vec<Title>) -> RipSpecEnvelope {
        RipSpecEnvelope {
            fingerprint: "fp".into(),
            metadata: BTreeMap::new(),
            titles,
            episodes: Vec::new(),
            assets: BTreeMap::new(),
        }
    }

    #[test]
    fn parse_title_id_matches_known_pattern() {
        assert_eq!(
            parse_title_id("South Park Season 5 - Disc 1_t07.mkv"),
            (7, true)
        );
        assert_eq!(parse_title_id("bonus-feature.mkv"), (0, false));
    }

    #[test]
    fn disney_multi_language_pick() {
        let envelope = envelope_with_titles(vec![
            title(0, 7200.0, "00800.mpls"),
            title(1, 7205.0, "00801.mpls"),
            title(2, 7203.0, "00802.mpls"),
        ]);
        let (selected, _) = select_titles(&envelope);
        assert_eq!(selected, vec![0]);
    }

    #[test]
    fn directors_cut_vs_theatrical() {
        let envelope = envelope_with_titles(vec![
            title(0, 6783.0, "00800.mpls"),
            title(1, 6991.0, "00801.mpls"),
        ]);
        let (selected, _) = select_titles(&envelope);
        assert_eq!(selected, vec![1]);
    }

    #[test]
    fn tv_branch_returns_sorted_deduplicated_title_ids() {
        let mut envelope = envelope_with_titles(Vec::new());
        envelope
            .metadata
            .insert("media_type".into(), spindle_core::MetadataValue::String("tv".into()));
        envelope.episodes = vec![
            Episode {
                key: "s01e02".into(),
                title_id: 2,
                season: 1,
                episode: 2,
                episode_title: None,
                output_basename: "s01e02".into(),
            },
            Episode {
                key: "s01e01".into(),
                title_id: 1,
                season: 1,
                episode: 1,
                episode_title: None,
                output_basename: "s01e01".into(),
            },
        ];
        let (selected, _) = select_titles(&envelope);
        assert_eq!(selected, vec![1, 2]);
    }

    #[test]
    fn empty_candidates_yield_empty_selection() {
        let envelope = envelope_with_titles(vec![title(0, 0.0, "00800.mpls")]);
        let (selected, _) = select_titles(&envelope);
        assert!(selected.is_empty());
    }

    #[test]
    fn tv_branch_with_no_assigned_titles_is_empty() {
        let mut envelope = envelope_with_titles(Vec::new());
        envelope
            .metadata
            .insert("media_type".into(), spindle_core::MetadataValue::String("tv".into()));
        envelope.episodes = vec![Episode {
            key: "s01e01".into(),
            title_id: -1,
            season: 1,
            episode: 1,
            episode_title: None,
            output_basename: "s01e01".into(),
        }];
        let (selected, _) = select_titles(&envelope);
        assert!(selected.is_empty());
    }
}
