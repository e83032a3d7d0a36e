//! Merger and naming tests through the public API.

use voxcut::segment::{merge_turns, normalize_turns, RawTurn, Segment};

fn turn(speaker: &str, start: f64, end: f64) -> RawTurn {
    RawTurn::new(speaker, start, end)
}

// ============================================================================
// Merge Scenarios
// ============================================================================

mod merge_scenarios {
    use super::*;

    #[test]
    fn test_consecutive_same_speaker_collapse() {
        let turns = [turn("A", 0.0, 2.0), turn("A", 2.0, 5.0), turn("B", 5.0, 7.0)];
        let segments = merge_turns(&turns);

        assert_eq!(
            segments,
            vec![
                Segment {
                    speaker: "A".to_string(),
                    start: 0.0,
                    end: 5.0
                },
                Segment {
                    speaker: "B".to_string(),
                    start: 5.0,
                    end: 7.0
                },
            ]
        );
    }

    #[test]
    fn test_alternating_speakers_pass_through() {
        let turns = [turn("A", 0.0, 1.0), turn("B", 1.0, 2.0), turn("A", 2.0, 3.0)];
        let segments = merge_turns(&turns);

        assert_eq!(segments.len(), 3);
        for (segment, original) in segments.iter().zip(&turns) {
            assert_eq!(segment.speaker, original.speaker);
            assert_eq!(segment.start, original.start);
            assert_eq!(segment.end, original.end);
        }
    }

    #[test]
    fn test_single_turn_identity() {
        let segments = merge_turns(&[turn("SPEAKER_00", 2.25, 8.75)]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 2.25);
        assert_eq!(segments[0].end, 8.75);
    }

    #[test]
    fn test_empty_input_returns_empty() {
        assert!(merge_turns(&[]).is_empty());
    }

    #[test]
    fn test_long_same_speaker_run_collapses_to_one() {
        let turns: Vec<RawTurn> = (0..50)
            .map(|i| turn("SPEAKER_00", i as f64, (i + 1) as f64))
            .collect();
        let segments = merge_turns(&turns);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, 50.0);
    }
}

// ============================================================================
// Merge Properties
// ============================================================================

mod merge_properties {
    use super::*;

    fn as_turns(segments: &[Segment]) -> Vec<RawTurn> {
        segments
            .iter()
            .map(|s| RawTurn::new(s.speaker.clone(), s.start, s.end))
            .collect()
    }

    fn sample_runs() -> Vec<Vec<RawTurn>> {
        vec![
            vec![turn("A", 0.0, 2.0)],
            vec![turn("A", 0.0, 2.0), turn("A", 2.0, 5.0), turn("B", 5.0, 7.0)],
            vec![turn("A", 0.0, 1.0), turn("B", 1.0, 2.0), turn("A", 2.0, 3.0)],
            vec![
                turn("A", 0.0, 1.0),
                turn("A", 1.0, 2.5),
                turn("B", 2.5, 3.0),
                turn("B", 3.0, 4.0),
                turn("C", 4.5, 6.0),
                turn("A", 6.0, 9.0),
            ],
        ]
    }

    #[test]
    fn test_output_never_longer_than_input() {
        for turns in sample_runs() {
            assert!(merge_turns(&turns).len() <= turns.len());
        }
    }

    #[test]
    fn test_no_consecutive_segments_share_speaker() {
        for turns in sample_runs() {
            let segments = merge_turns(&turns);
            for pair in segments.windows(2) {
                assert_ne!(pair[0].speaker, pair[1].speaker);
            }
        }
    }

    #[test]
    fn test_bounds_preserved() {
        for turns in sample_runs() {
            let segments = merge_turns(&turns);
            assert_eq!(segments.first().unwrap().start, turns.first().unwrap().start);
            assert_eq!(segments.last().unwrap().end, turns.last().unwrap().end);
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        for turns in sample_runs() {
            let once = merge_turns(&turns);
            let twice = merge_turns(&as_turns(&once));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_normalize_then_merge_handles_unsorted_input() {
        let turns = normalize_turns(vec![
            turn("B", 5.0, 7.0),
            turn("A", 2.0, 5.0),
            turn("A", 0.0, 2.0),
        ]);
        let segments = merge_turns(&turns);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].speaker, "A");
        assert_eq!(segments[0].end, 5.0);
    }
}

// ============================================================================
// Artifact Naming
// ============================================================================

mod naming_tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_stems_unique_across_run() {
        // Same speaker appearing in several segments must still produce
        // distinct artifact names.
        let turns = [
            turn("A", 0.0, 1.0),
            turn("B", 1.0, 2.0),
            turn("A", 2.0, 3.0),
            turn("B", 3.0, 4.0),
        ];
        let segments = merge_turns(&turns);

        let stems: HashSet<String> = segments
            .iter()
            .enumerate()
            .map(|(i, s)| s.artifact_stem(i))
            .collect();

        assert_eq!(stems.len(), segments.len());
    }

    #[test]
    fn test_stems_deterministic_across_runs() {
        let turns = [turn("A", 0.0, 2.0), turn("A", 2.0, 5.0), turn("B", 5.0, 7.0)];

        let first: Vec<String> = merge_turns(&turns)
            .iter()
            .enumerate()
            .map(|(i, s)| s.artifact_stem(i))
            .collect();
        let second: Vec<String> = merge_turns(&turns)
            .iter()
            .enumerate()
            .map(|(i, s)| s.artifact_stem(i))
            .collect();

        assert_eq!(first, second);
        assert_eq!(first, vec!["A_segment_0", "B_segment_1"]);
    }

    #[test]
    fn test_derived_filenames_share_the_stem() {
        let segment = Segment {
            speaker: "SPEAKER_00".to_string(),
            start: 0.0,
            end: 5.0,
        };
        let stem = segment.artifact_stem(0);

        assert_eq!(format!("{stem}.mp4"), "SPEAKER_00_segment_0.mp4");
        assert_eq!(format!("{stem}.wav"), "SPEAKER_00_segment_0.wav");
        assert_eq!(
            format!("{stem}_refined.wav"),
            "SPEAKER_00_segment_0_refined.wav"
        );
        assert_eq!(
            format!("{stem}_back_music.wav"),
            "SPEAKER_00_segment_0_back_music.wav"
        );
        assert_eq!(
            format!("{stem}_refined_transcript.txt"),
            "SPEAKER_00_segment_0_refined_transcript.txt"
        );
    }
}
