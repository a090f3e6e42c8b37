use std::{ops::AddAssign, sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{debug, error};

use super::error::CacheError;
use crate::{
    channel::Channel,
    telem::{AlignmentBounds, Series, TimeRange},
};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Arc<Series>,
    pub added_at: Instant,
}

impl CacheEntry {
    fn bounds(&self) -> AlignmentBounds {
        self.data.alignment_bounds()
    }
}

/// How to merge a new series into the entry list without creating overlaps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPlan {
    /// index the new entry lands at
    pub insert_into: usize,
    /// existing entries starting at `insert_into` that the new series fully covers
    pub delete_in_between: usize,
    /// leading samples of the new series already held by the previous entry
    pub remove_before: usize,
    /// trailing samples of the new series already held by the next entry
    pub remove_after: usize,
    /// time range of the trimmed series
    pub time_range: TimeRange,
}

/// Result of [`StaticCache::dirty_read`]. Series may extend past the queried range.
#[derive(Debug, Clone, Default)]
pub struct DirtyRead {
    pub series: Vec<Arc<Series>>,
    pub gaps: Vec<TimeRange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcResult {
    pub purged_count: usize,
    pub purged_bytes: usize,
}

impl AddAssign for GcResult {
    fn add_assign(&mut self, rhs: Self) {
        self.purged_count += rhs.purged_count;
        self.purged_bytes += rhs.purged_bytes;
    }
}

/// Historical data for one channel: immutable series kept sorted and
/// non-overlapping by alignment.
#[derive(Debug)]
pub struct StaticCache {
    channel: Channel,
    entries: Vec<CacheEntry>,
    stale_after: Duration,
}

impl StaticCache {
    pub fn new(channel: Channel, stale_after: Duration) -> Self {
        Self {
            channel,
            entries: Vec::new(),
            stale_after,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        self.entries.iter().map(|e| e.data.byte_size()).sum()
    }

    pub fn alignment_bounds(&self) -> AlignmentBounds {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => AlignmentBounds {
                lower: first.bounds().lower,
                upper: last.bounds().upper,
            },
            _ => AlignmentBounds::default(),
        }
    }

    pub fn write(&mut self, series: impl IntoIterator<Item = Series>) -> Result<(), CacheError> {
        for s in series {
            if s.is_empty() {
                continue;
            }
            if s.data_type() != self.channel.data_type {
                return Err(CacheError::DataTypeMismatch {
                    key: self.channel.key,
                    expected: self.channel.data_type,
                    actual: s.data_type(),
                });
            }

            let redundant = insertion_plan(&self.entries, &s).is_none();
            self.check_alignment(&s, redundant)?;
            if redundant {
                debug!(
                    key = self.channel.key,
                    "skipping redundant write of {}",
                    s.alignment_bounds()
                );
                continue;
            }

            self.evict_superseded(&s);
            let Some(plan) = insertion_plan(&self.entries, &s) else {
                continue;
            };

            let trimmed = s
                .slice(plan.remove_before, s.len() - plan.remove_after)?
                .with_time_range(plan.time_range);
            let entry = CacheEntry {
                data: Arc::new(trimmed),
                added_at: Instant::now(),
            };
            self.entries.splice(
                plan.insert_into..plan.insert_into + plan.delete_in_between,
                [entry],
            );
            self.check_integrity()?;
        }
        Ok(())
    }

    /// Every entry overlapping `range` plus the sub-ranges no entry covers
    pub fn dirty_read(&self, range: TimeRange) -> DirtyRead {
        let mut res = DirtyRead::default();
        if !range.is_valid() {
            return res;
        }

        // alignment order need not follow time order
        let mut hits: Vec<&Arc<Series>> = self
            .entries
            .iter()
            .map(|e| &e.data)
            .filter(|s| s.time_range().overlaps_with(&range))
            .collect();
        hits.sort_by_key(|s| s.time_range().start);

        let mut cursor = range.start;
        for s in hits {
            let tr = s.time_range();
            if tr.start > cursor {
                res.gaps.push(TimeRange {
                    start: cursor,
                    end: tr.start,
                });
            }
            cursor = cursor.max(tr.end);
            res.series.push(s.clone());
        }
        if cursor < range.end {
            res.gaps.push(TimeRange {
                start: cursor,
                end: range.end,
            });
        }
        res
    }

    /// Drops stale entries no caller holds a reference to
    pub fn gc(&mut self) -> GcResult {
        let mut res = GcResult::default();
        let stale_after = self.stale_after;
        self.entries.retain(|e| {
            let keep = Arc::strong_count(&e.data) > 1 || e.added_at.elapsed() <= stale_after;
            if !keep {
                res.purged_count += 1;
                res.purged_bytes += e.data.byte_size();
            }
            keep
        });
        res
    }

    pub fn close(&mut self) {
        self.entries.clear();
    }

    /// Entries sharing alignment with `series` must also share time with it, and
    /// when `series` is redundant they must hold its whole time range.
    fn check_alignment(&self, series: &Series, redundant: bool) -> Result<(), CacheError> {
        let bounds = series.alignment_bounds();
        let tr = series.time_range();
        let start = self.entries.partition_point(|e| e.bounds().upper <= bounds.lower);
        let mut held: Vec<TimeRange> = self.entries[start..]
            .iter()
            .take_while(|e| e.bounds().lower < bounds.upper)
            .map(|e| e.data.time_range())
            .collect();

        let disjoint = held
            .iter()
            .any(|h| !h.is_zero() && !tr.is_zero() && !h.overlaps_with(&tr));
        let uncovered = redundant && !covers(&mut held, tr);
        if disjoint || uncovered {
            error!(
                key = self.channel.key,
                "series {bounds} over {tr} disagrees with cached alignment"
            );
            return Err(CacheError::Misaligned {
                key: self.channel.key,
                alignment: bounds,
                time_range: tr,
            });
        }
        Ok(())
    }

    /// Drops entries in another alignment span whose time range `series` covers
    fn evict_superseded(&mut self, series: &Series) {
        let bounds = series.alignment_bounds();
        let tr = series.time_range();
        let before = self.entries.len();
        self.entries.retain(|e| {
            e.bounds().overlaps_with(&bounds) || !tr.contains_range(&e.data.time_range())
        });
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(key = self.channel.key, evicted, "superseded by {tr}");
        }
    }

    fn check_integrity(&self) -> Result<(), CacheError> {
        for pair in self.entries.windows(2) {
            let (prev, next) = (pair[0].bounds(), pair[1].bounds());
            if prev.upper > next.lower {
                error!(
                    key = self.channel.key,
                    "overlapping cache entries {prev} and {next}"
                );
                return Err(CacheError::Integrity {
                    key: self.channel.key,
                    prev,
                    next,
                });
            }
        }
        Ok(())
    }
}

fn covers(ranges: &mut [TimeRange], tr: TimeRange) -> bool {
    ranges.sort_by_key(|r| r.start);
    let mut cursor = tr.start;
    for r in ranges.iter() {
        if r.start > cursor {
            break;
        }
        cursor = cursor.max(r.end);
    }
    cursor >= tr.end
}

/// `None` when every sample of `series` is already cached
pub fn insertion_plan(entries: &[CacheEntry], series: &Series) -> Option<InsertionPlan> {
    let bounds = series.alignment_bounds();
    if bounds.is_empty() {
        return None;
    }

    let mut plan = InsertionPlan {
        insert_into: entries.partition_point(|e| e.bounds().upper <= bounds.lower),
        delete_in_between: 0,
        remove_before: 0,
        remove_after: 0,
        time_range: series.time_range(),
    };

    let mut i = plan.insert_into;
    while let Some(entry) = entries.get(i) {
        let existing = entry.bounds();
        if existing.lower >= bounds.upper {
            break;
        }
        if existing.contains(&bounds) {
            return None;
        }

        let tr = entry.data.time_range();
        if existing.lower <= bounds.lower {
            // keep the earlier entry, trim our front
            plan.remove_before = (existing.upper.0 - bounds.lower.0) as usize;
            plan.time_range.start = plan.time_range.start.max(tr.end);
            plan.insert_into = i + 1;
        } else if existing.upper > bounds.upper {
            // keep the later entry, trim our back
            plan.remove_after = (bounds.upper.0 - existing.lower.0) as usize;
            plan.time_range.end = plan.time_range.end.min(tr.start);
            break;
        } else {
            plan.delete_in_between += 1;
        }
        i += 1;
    }

    if plan.remove_before + plan.remove_after >= series.len() {
        return None;
    }
    plan.time_range.end = plan.time_range.end.max(plan.time_range.start);
    Some(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telem::{Alignment, DataType, TimeStamp};

    fn cache() -> StaticCache {
        StaticCache::new(
            Channel {
                key: 1,
                name: "a".to_string(),
                data_type: DataType::Float64,
                index: Some(2),
            },
            Duration::from_secs(20),
        )
    }

    /// `len` samples at alignment `start` spanning `[start, start + len)` in time
    fn series(start: u64, len: usize) -> Series {
        let values: Vec<f64> = (0..len).map(|i| (start as usize + i) as f64).collect();
        Series::from_values(
            &values,
            TimeRange::new(start as i64, (start as usize + len) as i64),
        )
        .with_alignment(Alignment(start))
    }

    /// `len` samples at `align` spanning `[start, start + len)` in time
    fn placed(align: Alignment, start: i64, len: usize) -> Series {
        let values = vec![0.0f64; len];
        Series::from_values(&values, TimeRange::new(start, start + len as i64))
            .with_alignment(align)
    }

    fn ranges(series: &[Arc<Series>]) -> Vec<TimeRange> {
        series.iter().map(|s| s.time_range()).collect()
    }

    fn assert_no_overlap(cache: &StaticCache) {
        for pair in cache.entries().windows(2) {
            assert!(
                pair[0].data.alignment_bounds().upper <= pair[1].data.alignment_bounds().lower
            );
        }
    }

    /// Clamped series ranges and gaps must cover `range` exactly once
    fn assert_tiles(read: &DirtyRead, range: TimeRange) {
        let mut pieces: Vec<TimeRange> = read
            .series
            .iter()
            .map(|s| s.time_range().bound(&range))
            .chain(read.gaps.iter().copied())
            .filter(|tr| !tr.is_zero())
            .collect();
        pieces.sort_by_key(|tr| tr.start);
        let mut cursor = range.start;
        for piece in pieces {
            assert_eq!(piece.start, cursor, "gap or overlap at {cursor}");
            cursor = piece.end;
        }
        assert_eq!(cursor, range.end);
    }

    #[test]
    fn test_dirty_read_with_gap() {
        let mut cache = cache();
        cache.write([series(0, 100), series(150, 50)]).unwrap();
        let read = cache.dirty_read(TimeRange::new(0, 200));
        assert_eq!(
            ranges(&read.series),
            vec![TimeRange::new(0, 100), TimeRange::new(150, 200)]
        );
        assert_eq!(read.gaps, vec![TimeRange::new(100, 150)]);
        assert_tiles(&read, TimeRange::new(0, 200));
    }

    #[test]
    fn test_write_trims_leading_overlap() {
        let mut cache = cache();
        cache.write([series(0, 100)]).unwrap();
        cache.write([series(50, 100)]).unwrap();
        assert_eq!(cache.len(), 2);
        let read = cache.dirty_read(TimeRange::new(0, 150));
        assert_eq!(
            ranges(&read.series),
            vec![TimeRange::new(0, 100), TimeRange::new(100, 150)]
        );
        assert!(read.gaps.is_empty());
        let second = &read.series[1];
        assert_eq!(second.len(), 50);
        assert_eq!(second.alignment(), Alignment(100));
        assert_eq!(second.at::<f64>(0), Some(100.0));
        assert_no_overlap(&cache);
    }

    #[test]
    fn test_write_trims_trailing_overlap() {
        let mut cache = cache();
        cache.write([series(100, 100)]).unwrap();
        cache.write([series(50, 100)]).unwrap();
        let read = cache.dirty_read(TimeRange::new(0, 300));
        assert_eq!(
            ranges(&read.series),
            vec![TimeRange::new(50, 100), TimeRange::new(100, 200)]
        );
        assert_eq!(
            read.gaps,
            vec![TimeRange::new(0, 50), TimeRange::new(200, 300)]
        );
        assert_eq!(read.series[0].values::<f64>().unwrap().last(), Some(&99.0));
        assert_no_overlap(&cache);
    }

    #[test]
    fn test_write_fills_hole_between_entries() {
        let mut cache = cache();
        cache.write([series(0, 100), series(150, 50)]).unwrap();
        cache.write([series(80, 100)]).unwrap();
        assert_eq!(cache.len(), 3);
        let read = cache.dirty_read(TimeRange::new(0, 200));
        assert_eq!(
            ranges(&read.series),
            vec![
                TimeRange::new(0, 100),
                TimeRange::new(100, 150),
                TimeRange::new(150, 200)
            ]
        );
        assert!(read.gaps.is_empty());
        assert_no_overlap(&cache);
    }

    #[test]
    fn test_write_replaces_covered_entries() {
        let mut cache = cache();
        cache.write([series(10, 10), series(30, 10)]).unwrap();
        cache.write([series(0, 100)]).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.alignment_bounds(),
            AlignmentBounds {
                lower: Alignment(0),
                upper: Alignment(100)
            }
        );
    }

    #[test]
    fn test_write_idempotent() {
        let mut once = cache();
        once.write([series(0, 100), series(150, 50)]).unwrap();
        let mut twice = cache();
        twice.write([series(0, 100), series(150, 50)]).unwrap();
        twice.write([series(0, 100), series(150, 50)]).unwrap();

        let range = TimeRange::new(-10, 300);
        let (a, b) = (once.dirty_read(range), twice.dirty_read(range));
        assert_eq!(a.gaps, b.gaps);
        assert_eq!(
            a.series.iter().map(|s| s.as_ref()).collect::<Vec<_>>(),
            b.series.iter().map(|s| s.as_ref()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_write_redundant_subset() {
        let mut cache = cache();
        cache.write([series(0, 100)]).unwrap();
        cache.write([series(20, 30)]).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(
            insertion_plan(cache.entries(), &series(20, 30)),
            None
        );
    }

    #[test]
    fn test_insertion_plan() {
        let mut cache = cache();
        cache.write([series(0, 100), series(150, 50), series(300, 10)]).unwrap();
        let plan = insertion_plan(cache.entries(), &series(50, 250)).unwrap();
        assert_eq!(
            plan,
            InsertionPlan {
                insert_into: 1,
                delete_in_between: 1,
                remove_before: 50,
                remove_after: 0,
                time_range: TimeRange::new(100, 300),
            }
        );
    }

    #[test]
    fn test_no_overlap_after_many_writes() {
        let mut cache = cache();
        let writes = [
            (0, 10),
            (5, 10),
            (40, 5),
            (30, 20),
            (12, 30),
            (0, 60),
            (55, 3),
            (100, 1),
            (90, 20),
        ];
        for (start, len) in writes {
            cache.write([series(start, len)]).unwrap();
            assert_no_overlap(&cache);
        }
        for range in [
            TimeRange::new(0, 200),
            TimeRange::new(7, 8),
            TimeRange::new(59, 101),
            TimeRange::new(-50, -10),
        ] {
            assert_tiles(&cache.dirty_read(range), range);
        }
    }

    #[test]
    fn test_dirty_read_edges() {
        let mut cache = cache();
        assert_eq!(
            cache.dirty_read(TimeRange::new(0, 10)).gaps,
            vec![TimeRange::new(0, 10)]
        );
        cache.write([series(10, 10)]).unwrap();

        // series extending past the query are returned whole
        let read = cache.dirty_read(TimeRange::new(15, 17));
        assert_eq!(ranges(&read.series), vec![TimeRange::new(10, 20)]);
        assert!(read.gaps.is_empty());

        assert!(cache.dirty_read(TimeRange::new(5, 5)).gaps.is_empty());
        let invalid = cache.dirty_read(TimeRange::new(20, 0));
        assert!(invalid.series.is_empty() && invalid.gaps.is_empty());
    }

    #[test]
    fn test_alignment_order_differs_from_time() {
        let mut cache = cache();
        cache
            .write([
                placed(Alignment(0), 100, 100),
                placed(Alignment(100), 0, 100),
                placed(Alignment(500), 300, 10),
            ])
            .unwrap();
        assert_eq!(cache.len(), 3);
        assert_no_overlap(&cache);

        let range = TimeRange::new(-10, 400);
        let read = cache.dirty_read(range);
        assert_eq!(
            ranges(&read.series),
            vec![
                TimeRange::new(0, 100),
                TimeRange::new(100, 200),
                TimeRange::new(300, 310)
            ]
        );
        assert_eq!(
            read.gaps,
            vec![
                TimeRange::new(-10, 0),
                TimeRange::new(200, 300),
                TimeRange::new(310, 400)
            ]
        );
        assert_tiles(&read, range);
        assert_tiles(&cache.dirty_read(TimeRange::new(50, 150)), TimeRange::new(50, 150));
    }

    #[test]
    fn test_default_alignment_is_not_dropped() {
        let mut cache = cache();
        cache
            .write([Series::from_values(&[1.0f64; 100], TimeRange::new(0, 100))])
            .unwrap();
        let res = cache.write([Series::from_values(&[2.0f64; 100], TimeRange::new(100, 200))]);
        assert_eq!(
            res,
            Err(CacheError::Misaligned {
                key: 1,
                alignment: AlignmentBounds {
                    lower: Alignment(0),
                    upper: Alignment(100)
                },
                time_range: TimeRange::new(100, 200),
            })
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.dirty_read(TimeRange::new(0, 200)).gaps,
            vec![TimeRange::new(100, 200)]
        );
    }

    #[test]
    fn test_overlapping_alignment_with_disjoint_time() {
        let mut cache = cache();
        cache.write([placed(Alignment(0), 0, 100)]).unwrap();
        let res = cache.write([placed(Alignment(50), 500, 100)]);
        assert!(matches!(res, Err(CacheError::Misaligned { key: 1, .. })));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_time_derived_alignment() {
        let mut cache = cache();
        for (start, len) in [(100, 50), (0, 100), (400, 100), (150, 10)] {
            cache
                .write([placed(Alignment::from_time(TimeStamp(start)), start, len)])
                .unwrap();
            assert_no_overlap(&cache);
        }
        assert_eq!(cache.len(), 4);
        let range = TimeRange::new(0, 500);
        let read = cache.dirty_read(range);
        assert_eq!(read.gaps, vec![TimeRange::new(160, 400)]);
        assert_tiles(&read, range);
    }

    #[test]
    fn test_write_supersedes_entries_from_other_domains() {
        let mut cache = cache();
        cache.write([placed(Alignment::new(5, 0), 10, 10)]).unwrap();
        cache.write([placed(Alignment::new(1, 0), 0, 100)]).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entries()[0].data.alignment(), Alignment::new(1, 0));
        assert_no_overlap(&cache);

        // partial time overlap keeps both
        cache.write([placed(Alignment::new(7, 0), 90, 20)]).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_write_data_type_mismatch() {
        let mut cache = cache();
        let res = cache.write([Series::from_values(&[1i32], TimeRange::new(0, 1))]);
        assert!(matches!(res, Err(CacheError::DataTypeMismatch { key: 1, .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_integrity_violation_is_reported() {
        let mut cache = cache();
        cache.entries = vec![
            CacheEntry {
                data: Arc::new(series(0, 10)),
                added_at: Instant::now(),
            },
            CacheEntry {
                data: Arc::new(series(5, 10)),
                added_at: Instant::now(),
            },
        ];
        assert!(matches!(
            cache.check_integrity(),
            Err(CacheError::Integrity { key: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc() {
        let mut cache = cache();
        cache.write([series(0, 10), series(20, 10)]).unwrap();
        assert_eq!(cache.gc(), GcResult::default());

        let held = cache.dirty_read(TimeRange::new(0, 5)).series;
        tokio::time::advance(Duration::from_secs(21)).await;

        let res = cache.gc();
        assert_eq!(
            res,
            GcResult {
                purged_count: 1,
                purged_bytes: 80
            }
        );
        assert_eq!(cache.len(), 1);

        drop(held);
        assert_eq!(cache.gc().purged_count, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_close() {
        let mut cache = cache();
        cache.write([series(0, 10)]).unwrap();
        cache.close();
        assert!(cache.is_empty());
        assert_eq!(cache.byte_size(), 0);
    }
}
