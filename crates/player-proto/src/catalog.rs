use serde::{Deserialize, Serialize};

use crate::error::PlayerError;

/// Label shown while neither a nominal nor a real duration is known.
pub const UNKNOWN_DURATION: &str = "--:--";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    /// Ordinal position in the catalog (0-based).
    pub index: usize,
    pub title: String,
    /// Opaque source locator handed to the audio engine.
    pub locator: String,
    /// Label shown before the real duration is known, e.g. `"1:03"`.
    #[serde(default)]
    pub nominal_duration: Option<String>,
}

impl Track {
    /// Two-digit 1-based number printed on track cards (`01`, `02`, ...).
    pub fn number_label(&self) -> String {
        format!("{:02}", self.index + 1)
    }

    pub fn duration_label(&self) -> &str {
        self.nominal_duration.as_deref().unwrap_or(UNKNOWN_DURATION)
    }
}

const BUILTIN_TRACKS: [(&str, &str, Option<&str>); 6] = [
    ("Once Upon a Time", "./Audio/01. Once Upon A Time.mp3", Some("1:03")),
    ("Fallen Down", "./Audio/02. Fallen Down.mp3", Some("0:58")),
    ("Your Best Friend", "./Audio/03. Your Best Friend.mp3", Some("0:20")),
    ("Ruins", "./Audio/04. Ruins.mp3", Some("1:30")),
    ("Heartache", "./Audio/05. Heartache.mp3", Some("1:34")),
    ("Snowdin Town", "./Audio/06. Snowdin Town.mp3", Some("1:17")),
];

fn index_entries<'a, I, T, L>(entries: I) -> Vec<Track>
where
    I: IntoIterator<Item = (T, L, Option<&'a str>)>,
    T: Into<String>,
    L: Into<String>,
{
    entries
        .into_iter()
        .enumerate()
        .map(|(index, (title, locator, duration))| Track {
            index,
            title: title.into(),
            locator: locator.into(),
            nominal_duration: duration.map(str::to_string),
        })
        .collect()
}

/// Fixed, ordered list of tracks.  Built once at startup and never mutated.
/// Only `new` and `builtin` construct one, so it is never empty.
#[derive(Debug, Clone)]
pub struct Catalog {
    artist: String,
    tracks: Vec<Track>,
}

impl Catalog {
    /// Build a catalog from `(title, locator, nominal_duration)` entries.
    /// Indices are assigned in order.
    pub fn new<'a, I, T, L>(artist: impl Into<String>, entries: I) -> Result<Self, PlayerError>
    where
        I: IntoIterator<Item = (T, L, Option<&'a str>)>,
        T: Into<String>,
        L: Into<String>,
    {
        let tracks = index_entries(entries);
        if tracks.is_empty() {
            return Err(PlayerError::EmptyCatalog);
        }
        Ok(Self {
            artist: artist.into(),
            tracks,
        })
    }

    /// The compiled-in catalog the player ships with.
    pub fn builtin(artist: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            tracks: index_entries(BUILTIN_TRACKS.iter().copied()),
        }
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false for a constructed catalog; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Look up `index`, failing with `IndexOutOfRange`.
    pub fn track(&self, index: usize) -> Result<&Track, PlayerError> {
        self.tracks.get(index).ok_or(PlayerError::IndexOutOfRange {
            index,
            len: self.tracks.len(),
        })
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Subtitle shown under the title: `"<artist> · <duration>"`.
    pub fn credit_line(&self, duration_label: &str) -> String {
        format!("{} · {}", self.artist, duration_label)
    }
}

/// Format seconds as `m:ss` (both parts floored).  Returns `None` for
/// non-finite or negative input.
pub fn format_duration(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let total = seconds.floor() as u64;
    Some(format!("{}:{:02}", total / 60, total % 60))
}

/// Inverse of [`format_duration`]: `"1:03"` → `63.0`.  `None` for anything
/// that is not `m:ss`, including the `--:--` placeholder.
pub fn parse_duration(label: &str) -> Option<f64> {
    let (minutes, seconds) = label.trim().split_once(':')?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    Some((minutes * 60 + seconds) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_indexed_in_order() {
        let catalog = Catalog::builtin("Toby Fox");
        assert_eq!(catalog.len(), 6);
        for (i, track) in catalog.tracks().iter().enumerate() {
            assert_eq!(track.index, i);
        }
        assert_eq!(catalog.tracks()[3].title, "Ruins");
        assert_eq!(catalog.tracks()[0].number_label(), "01");
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let entries: Vec<(&str, &str, Option<&str>)> = Vec::new();
        assert_eq!(
            Catalog::new("nobody", entries).unwrap_err(),
            PlayerError::EmptyCatalog
        );
    }

    #[test]
    fn track_lookup_out_of_range() {
        let catalog = Catalog::new("x", [("A", "a.mp3", None)]).unwrap();
        assert_eq!(
            catalog.track(1).unwrap_err(),
            PlayerError::IndexOutOfRange { index: 1, len: 1 }
        );
        assert_eq!(catalog.track(0).unwrap().duration_label(), UNKNOWN_DURATION);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(63.9).as_deref(), Some("1:03"));
        assert_eq!(format_duration(0.0).as_deref(), Some("0:00"));
        assert_eq!(format_duration(3600.0).as_deref(), Some("60:00"));
        assert_eq!(format_duration(f64::NAN), None);
        assert_eq!(format_duration(f64::INFINITY), None);
    }

    #[test]
    fn duration_labels_parse_back() {
        assert_eq!(parse_duration("1:03"), Some(63.0));
        assert_eq!(parse_duration("0:20"), Some(20.0));
        assert_eq!(parse_duration(UNKNOWN_DURATION), None);
        assert_eq!(parse_duration("1:75"), None);
        assert_eq!(parse_duration("90"), None);
    }

    #[test]
    fn credit_line_joins_artist_and_duration() {
        let catalog = Catalog::builtin("Toby Fox");
        assert_eq!(catalog.credit_line("1:03"), "Toby Fox · 1:03");
    }
}
