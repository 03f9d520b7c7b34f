//! Integration tests for queue ordering under shuffle and repeat
//!
//! Shuffles use seeded generators so every run sees the same permutations.

use jelly_session::jellyfin::Track;
use jelly_session::player::{Queue, RepeatMode, ShuffleMode};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[cfg(test)]
mod queue_integration_tests {
    use super::*;

    fn tracks(n: usize) -> Vec<Track> {
        (0..n).map(|i| Track::new(format!("t{}", i), format!("Track {}", i), None)).collect()
    }

    fn current_id(queue: &Queue) -> Option<String> {
        queue.current_item().map(|t| t.id.clone())
    }

    #[test]
    fn test_shuffle_round_trip_across_seeds() {
        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut queue = Queue::new();
            let start = (seed as usize) % 12;
            queue.set_queue(tracks(12), start);
            let original = queue.item_ids();

            queue.set_shuffle_mode_with_rng(ShuffleMode::On, &mut rng);
            assert_eq!(current_id(&queue), Some(format!("t{}", start)), "seed {}", seed);
            let mut sorted = queue.item_ids();
            sorted.sort();
            let mut expected = original.clone();
            expected.sort();
            assert_eq!(sorted, expected, "shuffle must be a permutation (seed {})", seed);

            queue.set_shuffle_mode_with_rng(ShuffleMode::Off, &mut rng);
            assert_eq!(queue.item_ids(), original, "seed {}", seed);
            assert_eq!(queue.current_index(), Some(start));
        }
    }

    #[test]
    fn test_edits_under_shuffle_survive_restore() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = Queue::new();
        queue.set_queue(tracks(5), 2);
        queue.set_shuffle_mode_with_rng(ShuffleMode::On, &mut rng);

        queue.add_to_queue(Track::new("late", "Late", None));
        queue.insert_at(Track::new("front", "Front", None), 0);
        let removed = queue.remove_at(queue.len() - 2).map(|t| t.id);
        assert!(removed.is_some());

        queue.set_shuffle_mode_with_rng(ShuffleMode::Off, &mut rng);
        let ids = queue.item_ids();
        assert_eq!(ids.len(), 6);
        assert!(ids.contains(&"late".to_string()));
        assert!(ids.contains(&"front".to_string()));
        assert!(!ids.contains(&removed.unwrap()));
        assert_eq!(current_id(&queue), Some("t2".to_string()));
    }

    #[test]
    fn test_walk_with_repeat_all_visits_every_track() {
        let mut queue = Queue::new();
        queue.set_queue(tracks(4), 0);
        queue.set_repeat_mode(RepeatMode::All);

        let mut seen = vec![current_id(&queue).unwrap()];
        for _ in 0..7 {
            seen.push(queue.next().unwrap().id);
        }
        assert_eq!(seen, vec!["t0", "t1", "t2", "t3", "t0", "t1", "t2", "t3"]);
        assert_eq!(queue.previous().map(|t| t.id), Some("t2".to_string()));
    }

    #[test]
    fn test_duplicate_tracks_keep_distinct_positions() {
        let mut rng = StdRng::seed_from_u64(3);
        let same = Track::new("dup", "Dup", None);
        let mut queue = Queue::new();
        queue.set_queue(vec![same.clone(), Track::new("x", "X", None), same], 2);

        queue.set_shuffle_mode_with_rng(ShuffleMode::On, &mut rng);
        queue.set_shuffle_mode_with_rng(ShuffleMode::Off, &mut rng);
        assert_eq!(queue.item_ids(), vec!["dup", "x", "dup"]);
        assert_eq!(queue.current_index(), Some(2));
    }
}
