use serde::{Deserialize, Serialize};

/// Seconds of recording kept after the last lyric line.
pub const TRACK_TAIL_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub start_seconds: f64,
    pub duration_seconds: f64,
    pub frequency_hz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Track information supplied by the song catalog.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    pub id: String,
    pub expected_duration_seconds: f64,
    #[serde(default)]
    pub reference_melody: Vec<Note>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl TrackMetadata {
    /// Derives the recording length from the lyric sheet: the last lyric
    /// timestamp plus a fixed tail.
    pub fn from_lyrics(
        id: impl Into<String>,
        lyric_timestamps: &[f64],
        reference_melody: Vec<Note>,
        difficulty: Difficulty,
    ) -> Self {
        let last_lyric = lyric_timestamps
            .iter()
            .copied()
            .fold(0.0f64, f64::max);
        Self {
            id: id.into(),
            expected_duration_seconds: last_lyric + TRACK_TAIL_SECONDS,
            reference_melody,
            difficulty,
        }
    }

    pub fn note_count(&self) -> usize {
        self.reference_melody.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_last_lyric_plus_tail() {
        let track = TrackMetadata::from_lyrics("song-1", &[1.0, 12.5, 7.0], Vec::new(), Difficulty::Easy);
        assert_eq!(track.expected_duration_seconds, 17.5);
    }

    #[test]
    fn no_lyrics_still_records_the_tail() {
        let track = TrackMetadata::from_lyrics("song-2", &[], Vec::new(), Difficulty::Hard);
        assert_eq!(track.expected_duration_seconds, TRACK_TAIL_SECONDS);
    }
}
