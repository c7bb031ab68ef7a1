use crate::protocol::SeqId;

/// A contiguous run of sequence ids, half-open `[first, last)`.
///
/// Invariant: `first < last`. Empty ranges are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRange {
    pub first: SeqId,
    pub last: SeqId,
}

impl AckRange {
    pub fn new(first: SeqId, last: SeqId) -> Self {
        debug_assert!(first < last, "empty range {}-{}", first, last);
        Self { first, last }
    }

    pub fn len(&self) -> usize {
        (self.last - self.first) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.first >= self.last
    }

    /// Closed-hull containment: `other` lies entirely within `[first, last]`.
    /// Boundary-inclusive on purpose, so an adjacent range "touches".
    fn contains(&self, other: &AckRange) -> bool {
        other.first >= self.first
            && other.first <= self.last
            && other.last >= self.first
            && other.last <= self.last
    }

    fn contains_seq(&self, seq: SeqId) -> bool {
        seq >= self.first && seq <= self.last
    }

    /// True when either endpoint of `other` falls inside `[first, last]`.
    /// Used symmetrically to skip disjoint pairs cheaply.
    fn touches(&self, other: &AckRange) -> bool {
        (other.first >= self.first && other.first <= self.last)
            || (other.last >= self.first && other.last <= self.last)
    }
}

impl std::fmt::Display for AckRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// Ordered set of disjoint half-open intervals tracking not-yet-acknowledged
/// sequence ids for one (topic, subscriber, epoch-bucket).
///
/// Intervals are kept in insertion order, not sorted by value: the fan-out
/// path appends monotonically, and redelivery migration preserves whatever
/// order the buckets held. All synchronization lives in the owning
/// [`super::AckTracker`]; this type is plain data.
#[derive(Debug, Default, Clone)]
pub struct IntervalSet {
    ranges: Vec<AckRange>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `[first, last)` as outstanding. Extends the most recently added
    /// interval when contiguous with it; non-adjacent intervals are never
    /// merged.
    pub fn add_unacked(&mut self, first: SeqId, last: SeqId) {
        debug_assert!(first < last, "empty unacked range {}-{}", first, last);

        if let Some(prev) = self.ranges.last_mut() {
            if prev.last == first {
                prev.last = last;
                return;
            }
        }

        self.ranges.push(AckRange::new(first, last));
    }

    /// Remove `[first, last)` from the set. The range must match, be
    /// contained by, or align with one edge of exactly one stored interval;
    /// the first matching interval wins.
    ///
    /// Returns `false` when nothing matched, which is a legitimate no-op:
    /// at-least-once delivery means duplicate and late acks are expected.
    pub fn acknowledge(&mut self, first: SeqId, last: SeqId) -> bool {
        for i in 0..self.ranges.len() {
            let stored = self.ranges[i];

            // 0-5, ack 1-4 => (0-1),(4-5)
            if stored.first < first && stored.last > last {
                self.ranges[i].last = first;
                self.ranges.insert(i + 1, AckRange::new(last, stored.last));
                return true;
            }

            // 0-5, ack 0-4 => (4-5)
            if stored.first == first && stored.last > last {
                self.ranges[i].first = last;
                return true;
            }

            // 0-5, ack 3-5 => (0-3)
            if stored.first < first && stored.last == last {
                self.ranges[i].last = first;
                return true;
            }

            // 0-5, ack 0-5 => gone
            if stored.first == first && stored.last == last {
                self.ranges.remove(i);
                return true;
            }
        }

        false
    }

    /// Refine an external candidate release list against this set.
    ///
    /// Candidates fully contained here (still entirely unacknowledged by this
    /// subscriber) are removed; partial overlaps are clipped; when one of our
    /// intervals sits strictly inside a candidate, the un-overlapped left
    /// part is split off as its own candidate so it still competes for
    /// release. Disjoint pairs are skipped without mutation.
    pub fn difference(&self, candidates: &mut Vec<AckRange>) {
        let mut i = 0;

        while i < candidates.len() {
            let mut advance = true;

            for stored in &self.ranges {
                let candidate = candidates[i];

                // Entirely unacknowledged here: nothing of it is releasable.
                if *stored == candidate || stored.contains(&candidate) {
                    candidates.remove(i);
                    // The next candidate slid into index i.
                    advance = false;
                    break;
                }

                if !stored.touches(&candidate) && !candidate.touches(stored) {
                    continue;
                }

                // Left space: candidate starts before this interval.
                // candidate [0,3) vs stored [2,5) leaves [0,2) releasable.
                if stored.first > candidate.first {
                    let clipped = AckRange {
                        first: stored.first,
                        last: candidate.last,
                    };

                    // The clipped remainder would be empty, equal to the
                    // stored interval, or contained in it: shrink in place.
                    if candidate.last == stored.first
                        || *stored == clipped
                        || stored.contains(&clipped)
                    {
                        candidates[i].last = stored.first;
                        continue;
                    }

                    // Split off the releasable left part and keep refining
                    // the remainder against the rest of the set.
                    candidates.push(AckRange::new(candidate.first, stored.first));
                    candidates[i].first = stored.first;
                }

                // Right space: the candidate's start is swallowed by this
                // interval, so it resumes past its end.
                if stored.contains_seq(candidates[i].first) {
                    candidates[i].first = stored.last;
                }
            }

            if advance {
                i += 1;
            }
        }
    }

    /// Copy of the current intervals, for inspection and the timer migration.
    pub fn snapshot(&self) -> Vec<AckRange> {
        self.ranges.clone()
    }

    /// Drain all intervals, leaving the set empty.
    pub fn take_all(&mut self) -> Vec<AckRange> {
        std::mem::take(&mut self.ranges)
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }
}
