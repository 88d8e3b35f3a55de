//! Byte range accounting.
//!
//! A [`RangeSet`] keeps half-open ranges sorted and merged, so [`RangeSet::sum`]
//! counts every byte once no matter how many operations touched it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `range`, merging it with every range it overlaps or touches.
    pub fn add(&mut self, range: Range) {
        if range.is_empty() {
            return;
        }

        // First range that ends at or after the new start may be merged.
        let first = self.ranges.partition_point(|r| r.end < range.start);
        // Ranges starting after the new end are untouched.
        let last = self.ranges.partition_point(|r| r.start <= range.end);

        let mut merged = range;
        if first < last {
            merged.start = merged.start.min(self.ranges[first].start);
            merged.end = merged.end.max(self.ranges[last - 1].end);
        }
        self.ranges.splice(first..last, [merged]);
    }

    pub fn update<I>(&mut self, ranges: I)
    where
        I: IntoIterator<Item = Range>,
    {
        for range in ranges {
            self.add(range);
        }
    }

    /// Total number of bytes covered.
    pub fn sum(&self) -> u64 {
        self.ranges.iter().map(Range::len).sum()
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl FromIterator<Range> for RangeSet {
    fn from_iter<I: IntoIterator<Item = Range>>(iter: I) -> Self {
        let mut set = RangeSet::new();
        set.update(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set() {
        let set = RangeSet::new();
        assert!(set.is_empty());
        assert_eq!(set.sum(), 0);
    }

    #[test]
    fn empty_range_ignored() {
        let mut set = RangeSet::new();
        set.add(Range::new(10, 10));
        assert!(set.is_empty());
    }

    #[test]
    fn adjacent_ranges_merge() {
        let set: RangeSet = [Range::new(0, 100), Range::new(100, 250)]
            .into_iter()
            .collect();
        assert_eq!(set.ranges(), &[Range::new(0, 250)]);
        assert_eq!(set.sum(), 250);
    }

    #[test]
    fn overlapping_ranges_count_once() {
        let mut set = RangeSet::new();
        set.add(Range::new(0, 100));
        set.add(Range::new(50, 150));
        set.add(Range::new(0, 10));
        assert_eq!(set.ranges(), &[Range::new(0, 150)]);
        assert_eq!(set.sum(), 150);
    }

    #[test]
    fn disjoint_ranges_stay_sorted() {
        let mut set = RangeSet::new();
        set.add(Range::new(300, 400));
        set.add(Range::new(0, 100));
        set.add(Range::new(150, 200));
        assert_eq!(
            set.ranges(),
            &[Range::new(0, 100), Range::new(150, 200), Range::new(300, 400)]
        );
        assert_eq!(set.sum(), 250);
    }

    #[test]
    fn bridging_range_merges_neighbours() {
        let mut set: RangeSet = [Range::new(0, 100), Range::new(200, 300), Range::new(500, 600)]
            .into_iter()
            .collect();
        set.add(Range::new(50, 250));
        assert_eq!(set.ranges(), &[Range::new(0, 300), Range::new(500, 600)]);
        assert_eq!(set.sum(), 400);
    }

    #[test]
    fn copy_is_independent() {
        let original: RangeSet = [Range::new(0, 100)].into_iter().collect();
        let mut copy = original.clone();
        copy.update([Range::new(100, 200)]);
        assert_eq!(original.sum(), 100);
        assert_eq!(copy.sum(), 200);
    }
}
