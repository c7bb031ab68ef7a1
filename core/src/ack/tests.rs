#[cfg(test)]
mod interval_tests {
    use crate::ack::{AckRange, IntervalSet};

    fn set_of(ranges: &[(u32, u32)]) -> IntervalSet {
        let mut set = IntervalSet::new();
        for (first, last) in ranges {
            set.add_unacked(*first, *last);
        }
        set
    }

    fn ranges(pairs: &[(u32, u32)]) -> Vec<AckRange> {
        pairs.iter().map(|(f, l)| AckRange::new(*f, *l)).collect()
    }

    #[test]
    fn test_add_merges_contiguous_extension() {
        let set = set_of(&[(0, 5), (5, 9)]);
        assert_eq!(set.snapshot(), ranges(&[(0, 9)]));
    }

    #[test]
    fn test_add_keeps_gap_separate() {
        let set = set_of(&[(0, 5), (6, 9)]);
        assert_eq!(set.snapshot(), ranges(&[(0, 5), (6, 9)]));
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        // Wraparound hands the set non-monotonic but disjoint intervals.
        let set = set_of(&[(5, 9), (0, 5)]);
        assert_eq!(set.snapshot(), ranges(&[(5, 9), (0, 5)]));
    }

    #[test]
    fn test_ack_interior_splits() {
        let mut set = set_of(&[(0, 5)]);
        assert!(set.acknowledge(1, 4));
        assert_eq!(set.snapshot(), ranges(&[(0, 1), (4, 5)]));
    }

    #[test]
    fn test_ack_left_aligned_shrinks() {
        let mut set = set_of(&[(0, 5)]);
        assert!(set.acknowledge(0, 4));
        assert_eq!(set.snapshot(), ranges(&[(4, 5)]));
    }

    #[test]
    fn test_ack_right_aligned_shrinks() {
        let mut set = set_of(&[(0, 5)]);
        assert!(set.acknowledge(3, 5));
        assert_eq!(set.snapshot(), ranges(&[(0, 3)]));
    }

    #[test]
    fn test_ack_exact_removes() {
        let mut set = set_of(&[(0, 5)]);
        assert!(set.acknowledge(0, 5));
        assert!(set.is_empty());
    }

    #[test]
    fn test_ack_roundtrip_empties() {
        let mut set = set_of(&[(17, 42)]);
        assert!(set.acknowledge(17, 42));
        assert!(set.is_empty());
    }

    #[test]
    fn test_duplicate_ack_is_noop() {
        let mut set = set_of(&[(0, 9)]);
        assert!(set.acknowledge(0, 4));
        assert!(!set.acknowledge(0, 4));
        assert_eq!(set.snapshot(), ranges(&[(4, 9)]));
    }

    #[test]
    fn test_nonoverlapping_acks_cover_everything() {
        // Any partition of [0, N) into non-overlapping acks must empty the
        // set, in whatever order the pieces arrive.
        let pieces: &[(u32, u32)] = &[(4, 7), (0, 2), (9, 12), (2, 4), (7, 9)];
        let mut set = set_of(&[(0, 12)]);
        for (first, last) in pieces {
            assert!(set.acknowledge(*first, *last), "ack {}-{} missed", first, last);
        }
        assert!(set.is_empty());
    }

    #[test]
    fn test_difference_removes_contained_candidate() {
        let set = set_of(&[(0, 9)]);
        let mut candidates = ranges(&[(2, 5)]);
        set.difference(&mut candidates);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_difference_skips_disjoint_candidate() {
        let set = set_of(&[(119, 1000)]);
        let mut candidates = ranges(&[(0, 2)]);
        set.difference(&mut candidates);
        assert_eq!(candidates, ranges(&[(0, 2)]));
    }

    #[test]
    fn test_difference_clips_overlapping_edges() {
        // Set still owes [3,4), [5,6), [7,9); candidate [1,8) keeps only the
        // portions outside those plus the split-off left part.
        let mut set = set_of(&[(0, 9)]);
        set.acknowledge(0, 3);
        set.acknowledge(4, 5);
        set.acknowledge(6, 7);

        let mut candidates = ranges(&[(1, 8)]);
        set.difference(&mut candidates);
        candidates.sort_by_key(|r| r.first);
        assert_eq!(candidates, ranges(&[(1, 3), (4, 5), (6, 7)]));
    }

    #[test]
    fn test_difference_is_idempotent() {
        let mut set = set_of(&[(0, 10)]);
        set.acknowledge(0, 4);
        set.acknowledge(6, 10);

        let mut candidates = ranges(&[(1, 9)]);
        set.difference(&mut candidates);
        let refined = candidates.clone();

        set.difference(&mut candidates);
        assert_eq!(candidates, refined);
    }

    #[test]
    fn test_difference_empty_set_keeps_candidates() {
        let set = IntervalSet::new();
        let mut candidates = ranges(&[(0, 5), (7, 9)]);
        set.difference(&mut candidates);
        assert_eq!(candidates, ranges(&[(0, 5), (7, 9)]));
    }
}

#[cfg(test)]
mod tracker_tests {
    use crate::ack::{AckRange, AckTracker};
    use crate::protocol::SubscriberId;
    use crate::BusError;

    const TIMEOUT_BUCKETS: u16 = 6;

    fn tracker_with(subscribers: u64) -> AckTracker {
        let tracker = AckTracker::new(1, TIMEOUT_BUCKETS);
        for id in 0..subscribers {
            tracker.register_subscriber(id);
        }
        tracker
    }

    fn sorted(mut ranges: Vec<AckRange>) -> Vec<AckRange> {
        ranges.sort_by_key(|r| r.first);
        ranges
    }

    fn ranges(pairs: &[(u32, u32)]) -> Vec<AckRange> {
        pairs.iter().map(|(f, l)| AckRange::new(*f, *l)).collect()
    }

    /// Drives one consensus scenario: mark `unacked` for everyone, apply the
    /// per-subscriber acks in order, then compute what the last ack released.
    fn run_consensus(
        subscribers: u64,
        unacked: &[(u32, u32)],
        acks: &[(SubscriberId, (u32, u32))],
    ) -> Vec<AckRange> {
        let tracker = tracker_with(subscribers);
        let ids: Vec<SubscriberId> = (0..subscribers).collect();

        for (first, last) in unacked {
            tracker.mark_unacked(AckRange::new(*first, *last), &ids);
        }

        for (subscriber, (first, last)) in acks {
            tracker
                .acknowledge(AckRange::new(*first, *last), *subscriber, 0)
                .expect("ack failed");
        }

        let (source, (first, last)) = *acks.last().expect("no acks given");
        sorted(tracker.compute_releasable(AckRange::new(first, last), source))
    }

    #[test]
    fn test_single_subscriber_releases_whole_range() {
        let tracker = tracker_with(1);
        tracker.mark_unacked(AckRange::new(0, 9), &[0]);
        tracker.acknowledge(AckRange::new(0, 9), 0, 0).unwrap();

        let releasable = tracker.compute_releasable(AckRange::new(0, 9), 0);
        assert_eq!(releasable, ranges(&[(0, 9)]));
    }

    #[test]
    fn test_two_subscribers_left_space_multiple_unacked() {
        let releasable = run_consensus(
            2,
            &[(0, 9)],
            &[(0, (0, 3)), (0, (4, 5)), (0, (6, 7)), (1, (1, 8))],
        );
        assert_eq!(releasable, ranges(&[(1, 3), (4, 5), (6, 7)]));
    }

    #[test]
    fn test_two_subscribers_consensus_overlap() {
        let releasable = run_consensus(
            2,
            &[(0, 9)],
            &[(0, (0, 3)), (0, (4, 5)), (0, (6, 7)), (1, (3, 9))],
        );
        assert_eq!(releasable, ranges(&[(4, 5), (6, 7)]));
    }

    #[test]
    fn test_two_subscribers_left_and_right_space() {
        let releasable = run_consensus(
            2,
            &[(0, 9)],
            &[
                (0, (0, 3)),
                (0, (4, 5)),
                (0, (6, 7)),
                (0, (8, 9)),
                (1, (1, 9)),
            ],
        );
        assert_eq!(releasable, ranges(&[(1, 3), (4, 5), (6, 7), (8, 9)]));
    }

    #[test]
    fn test_two_subscribers_single_gap() {
        let releasable = run_consensus(2, &[(0, 10)], &[(0, (0, 4)), (0, (6, 10)), (1, (1, 9))]);
        assert_eq!(releasable, ranges(&[(1, 4), (6, 9)]));
    }

    #[test]
    fn test_two_subscribers_aligned_start() {
        let releasable = run_consensus(2, &[(0, 9)], &[(0, (0, 3)), (0, (4, 9)), (1, (3, 5))]);
        assert_eq!(releasable, ranges(&[(4, 5)]));
    }

    #[test]
    fn test_two_subscribers_interior_overlap() {
        let releasable = run_consensus(2, &[(0, 9)], &[(0, (2, 5)), (1, (1, 7))]);
        assert_eq!(releasable, ranges(&[(2, 5)]));
    }

    #[test]
    fn test_nothing_releasable_without_peer_acks() {
        let releasable = run_consensus(2, &[(0, 9)], &[(0, (0, 9))]);
        assert!(releasable.is_empty());
    }

    #[test]
    fn test_three_subscribers_intersection() {
        let releasable = run_consensus(
            3,
            &[(0, 9)],
            &[
                (0, (1, 3)),
                (0, (4, 5)),
                (1, (0, 3)),
                (1, (4, 5)),
                (2, (0, 5)),
            ],
        );
        assert_eq!(releasable, ranges(&[(1, 3), (4, 5)]));
    }

    #[test]
    fn test_disjoint_ack_far_left_of_peer_gap() {
        let releasable = run_consensus(2, &[(0, 1000)], &[(0, (0, 119)), (1, (0, 2))]);
        assert_eq!(releasable, ranges(&[(0, 2)]));
    }

    #[test]
    fn test_disjoint_ack_right_of_peer_gap() {
        let releasable = run_consensus(2, &[(0, 1000)], &[(0, (100, 119)), (1, (101, 102))]);
        assert_eq!(releasable, ranges(&[(101, 102)]));
    }

    #[test]
    fn test_no_overlap_between_subscriber_acks() {
        let releasable = run_consensus(2, &[(0, 9)], &[(0, (0, 2)), (1, (3, 9))]);
        assert!(releasable.is_empty());
    }

    #[test]
    fn test_non_monotonic_unacked_insertion() {
        // Wraparound ordering: the 5-9 batch lands before 0-5.
        let releasable = run_consensus(
            2,
            &[(5, 9), (0, 5)],
            &[(0, (5, 6)), (0, (1, 3)), (1, (0, 9))],
        );
        assert_eq!(releasable, ranges(&[(1, 3), (5, 6)]));
    }

    #[test]
    fn test_tick_migrates_expired_bucket_to_redelivery() {
        let tracker = tracker_with(2);
        tracker.mark_unacked(AckRange::new(0, 9), &[0, 1]);

        for _ in 0..TIMEOUT_BUCKETS {
            tracker.tick();
        }

        assert_eq!(tracker.redelivery_ranges(0), ranges(&[(0, 9)]));
        assert_eq!(tracker.redelivery_ranges(1), ranges(&[(0, 9)]));

        // Re-ticking must not duplicate what already migrated.
        for _ in 0..TIMEOUT_BUCKETS {
            tracker.tick();
        }
        assert_eq!(tracker.redelivery_ranges(0), ranges(&[(0, 9)]));
    }

    #[test]
    fn test_ack_after_migration_clears_redelivery() {
        let tracker = tracker_with(1);
        let epoch = tracker.mark_unacked(AckRange::new(0, 9), &[0]);

        for _ in 0..TIMEOUT_BUCKETS {
            tracker.tick();
        }
        assert!(!tracker.redelivery_ranges(0).is_empty());

        // The subscriber echoes the epoch it was sent; the bucket is empty by
        // now but the redelivery set still holds the range.
        tracker.acknowledge(AckRange::new(0, 9), 0, epoch).unwrap();
        assert!(tracker.redelivery_ranges(0).is_empty());
    }

    #[test]
    fn test_partial_ack_before_timeout_migrates_remainder() {
        let tracker = tracker_with(1);
        tracker.mark_unacked(AckRange::new(0, 9), &[0]);
        tracker.acknowledge(AckRange::new(0, 4), 0, 0).unwrap();

        for _ in 0..TIMEOUT_BUCKETS {
            tracker.tick();
        }

        assert_eq!(tracker.redelivery_ranges(0), ranges(&[(4, 9)]));
    }

    #[test]
    fn test_redelivery_blocks_consensus_release() {
        let tracker = tracker_with(2);
        tracker.mark_unacked(AckRange::new(0, 9), &[0, 1]);

        // Subscriber 0 times out; its outstanding range now lives in the
        // redelivery set, which must still veto the release.
        for _ in 0..TIMEOUT_BUCKETS {
            tracker.tick();
        }

        tracker
            .acknowledge(AckRange::new(0, 9), 1, tracker.current_epoch())
            .unwrap();
        let releasable = tracker.compute_releasable(AckRange::new(0, 9), 1);
        assert!(releasable.is_empty());
    }

    #[test]
    fn test_remove_subscriber_discards_state() {
        let tracker = tracker_with(2);
        tracker.mark_unacked(AckRange::new(0, 9), &[0, 1]);
        tracker.remove_subscriber(0);

        assert_eq!(tracker.subscriber_count(), 1);
        assert!(tracker.redelivery_ranges(0).is_empty());

        // With subscriber 0 gone, subscriber 1 alone decides the release.
        tracker.acknowledge(AckRange::new(0, 9), 1, 0).unwrap();
        let releasable = tracker.compute_releasable(AckRange::new(0, 9), 1);
        assert_eq!(releasable, ranges(&[(0, 9)]));
    }

    #[test]
    fn test_unknown_subscriber_is_an_error() {
        let tracker = tracker_with(1);
        let result = tracker.acknowledge(AckRange::new(0, 1), 42, 0);
        assert!(matches!(
            result,
            Err(BusError::UnknownSubscriber { subscriber: 42, .. })
        ));
    }

    #[test]
    fn test_out_of_range_epoch_is_malformed() {
        let tracker = tracker_with(1);
        let result = tracker.acknowledge(AckRange::new(0, 1), 0, TIMEOUT_BUCKETS);
        assert!(matches!(result, Err(BusError::MalformedFrame(_))));
    }

    #[test]
    fn test_stale_ack_is_silently_ignored() {
        let tracker = tracker_with(1);
        tracker.mark_unacked(AckRange::new(0, 9), &[0]);
        assert!(tracker.acknowledge(AckRange::new(0, 9), 0, 0).unwrap());

        // Network retransmission delivers the same ack again.
        assert!(!tracker.acknowledge(AckRange::new(0, 9), 0, 0).unwrap());
    }
}
