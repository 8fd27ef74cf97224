//! Grouping and roll-up statistics over an already filtered record set.
//!
//! Everything here is a pure function of its input; callers recompute on every
//! filter change.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{DailyRecord, FarmRecord, IncomeRecord, IncomeType};

/// Per-kind roll-up.
pub trait Summarize: FarmRecord {
    type Stats: Default + Clone + std::fmt::Debug + PartialEq + Serialize;

    fn accumulate(&self, stats: &mut Self::Stats);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyStats {
    pub record_count: usize,
    pub total_eggs: u64,
    pub total_mortality: u64,
    /// Unrounded; rounding happens in `format`.
    pub total_feed: f64,
    pub vaccination_entries: usize,
    pub medicine_entries: usize,
}

impl Summarize for DailyRecord {
    type Stats = DailyStats;

    fn accumulate(&self, stats: &mut DailyStats) {
        stats.record_count += 1;
        stats.total_eggs += u64::from(self.egg_count);
        stats.total_mortality += u64::from(self.mortality);
        stats.total_feed += self.feed;
        stats.vaccination_entries += usize::from(self.has_vaccination());
        stats.medicine_entries += usize::from(self.has_medicine());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncomeStats {
    pub record_count: usize,
    pub total_amount: f64,
    pub total_quantity: f64,
    pub egg_sales: f64,
    pub meat_sales: f64,
}

impl IncomeStats {
    pub fn total_for(&self, income_type: IncomeType) -> f64 {
        match income_type {
            IncomeType::EggSale => self.egg_sales,
            IncomeType::MeatSale => self.meat_sales,
        }
    }
}

impl Summarize for IncomeRecord {
    type Stats = IncomeStats;

    fn accumulate(&self, stats: &mut IncomeStats) {
        stats.record_count += 1;
        stats.total_amount += self.amount;
        stats.total_quantity += self.quantity;
        match self.income_type {
            IncomeType::EggSale => stats.egg_sales += self.amount,
            IncomeType::MeatSale => stats.meat_sales += self.amount,
        }
    }
}

/// Roll-up of the records dated `day`. Callers pass the viewer's local day; it
/// is never cached.
pub fn summarize_on<T: Summarize>(records: &[T], day: NaiveDate) -> T::Stats {
    let mut stats = T::Stats::default();
    for record in records.iter().filter(|record| record.date() == day) {
        record.accumulate(&mut stats);
    }
    stats
}

/// A leaf of the grouping tree: one owner's records sharing a secondary key.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafGroup<T: Summarize> {
    pub key: String,
    records: Vec<T>,
    pub stats: T::Stats,
}

impl<T: Summarize> LeafGroup<T> {
    /// Oldest first, for chart series.
    pub fn ascending(&self) -> &[T] {
        &self.records
    }

    /// Most recent first, for tables.
    pub fn descending(&self) -> impl Iterator<Item = &T> + '_ {
        self.records.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnerGroup<T: Summarize> {
    pub owner_id: String,
    pub owner_name: String,
    pub farm_name: String,
    pub groups: Vec<LeafGroup<T>>,
    pub stats: T::Stats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedResult<T: Summarize> {
    pub owners: Vec<OwnerGroup<T>>,
    pub stats: T::Stats,
}

impl<T: Summarize> GroupedResult<T> {
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn leaves(&self) -> impl Iterator<Item = (&OwnerGroup<T>, &LeafGroup<T>)> + '_ {
        self.owners
            .iter()
            .flat_map(|owner| owner.groups.iter().map(move |leaf| (owner, leaf)))
    }

    pub fn leaf(&self, owner_id: &str, key: &str) -> Option<&LeafGroup<T>> {
        self.owners
            .iter()
            .find(|owner| owner.owner_id == owner_id)
            .and_then(|owner| owner.groups.iter().find(|leaf| leaf.key == key))
    }

    pub fn record_count(&self) -> usize {
        self.leaves().map(|(_, leaf)| leaf.len()).sum()
    }
}

/// Secondary grouping keys used by the dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Batch,
    /// `YYYY-MM`
    Month,
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Two-level stable partition: owners in first-seen order, then `group_key`
/// values in first-seen order within each owner. Each leaf is sorted by
/// `date_key` ascending; ties keep input order.
pub fn group_and_summarize<T, K, D>(records: &[T], group_key: K, date_key: D) -> GroupedResult<T>
where
    T: Summarize,
    K: Fn(&T) -> String,
    D: Fn(&T) -> NaiveDate,
{
    struct Pending<T> {
        owner_id: String,
        owner_name: String,
        farm_name: String,
        leaves: Vec<(String, Vec<T>)>,
        leaf_index: HashMap<String, usize>,
    }

    let mut pending: Vec<Pending<T>> = Vec::new();
    let mut owner_index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let slot = *owner_index.entry(record.owner_id()).or_insert_with(|| {
            pending.push(Pending {
                owner_id: record.owner_id().to_string(),
                owner_name: record.owner_name().to_string(),
                farm_name: record.farm_name().to_string(),
                leaves: Vec::new(),
                leaf_index: HashMap::new(),
            });
            pending.len() - 1
        });

        let owner = &mut pending[slot];
        let key = group_key(record);
        let leaf = match owner.leaf_index.get(&key) {
            Some(index) => *index,
            None => {
                owner.leaves.push((key.clone(), Vec::new()));
                owner.leaf_index.insert(key, owner.leaves.len() - 1);
                owner.leaves.len() - 1
            }
        };
        owner.leaves[leaf].1.push(record.clone());
    }

    let mut total = T::Stats::default();
    let owners = pending
        .into_iter()
        .map(|owner| {
            let mut owner_stats = T::Stats::default();
            let groups = owner
                .leaves
                .into_iter()
                .map(|(key, mut records)| {
                    records.sort_by_key(|record| date_key(record));
                    let mut stats = T::Stats::default();
                    for record in &records {
                        record.accumulate(&mut stats);
                        record.accumulate(&mut owner_stats);
                        record.accumulate(&mut total);
                    }
                    LeafGroup {
                        key,
                        records,
                        stats,
                    }
                })
                .collect();

            OwnerGroup {
                owner_id: owner.owner_id,
                owner_name: owner.owner_name,
                farm_name: owner.farm_name,
                groups,
                stats: owner_stats,
            }
        })
        .collect();

    GroupedResult {
        owners,
        stats: total,
    }
}

pub fn group_by<T: Summarize>(records: &[T], key: GroupKey) -> GroupedResult<T> {
    match key {
        GroupKey::Batch => group_and_summarize(
            records,
            |record| record.batch_id().to_string(),
            |record| record.date(),
        ),
        GroupKey::Month => group_and_summarize(
            records,
            |record| month_key(record.date()),
            |record| record.date(),
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub key: String,
    pub label: String,
    pub values: Vec<f64>,
}

/// Several series sharing one date axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlignedSeries {
    pub dates: Vec<NaiveDate>,
    pub series: Vec<Series>,
}

/// Sums `value` per (series, date) and lays every series onto the union of all
/// dates in `records`, ascending. Absent points are `0.0`, so every series has
/// exactly `dates.len()` values. Series appear in first-seen order.
pub fn align_series<T, K, L, V>(records: &[T], series_key: K, label: L, value: V) -> AlignedSeries
where
    T: FarmRecord,
    K: Fn(&T) -> String,
    L: Fn(&T) -> String,
    V: Fn(&T) -> f64,
{
    let dates: BTreeSet<NaiveDate> = records.iter().map(|record| record.date()).collect();
    let mut order: Vec<(String, String)> = Vec::new();
    let mut points: HashMap<String, BTreeMap<NaiveDate, f64>> = HashMap::new();

    for record in records {
        let key = series_key(record);
        let per_date = points.entry(key.clone()).or_insert_with(|| {
            order.push((key, label(record)));
            BTreeMap::new()
        });
        *per_date.entry(record.date()).or_insert(0.0) += value(record);
    }

    let series = order
        .into_iter()
        .map(|(key, label)| {
            let per_date = points.remove(&key).unwrap_or_default();
            let values = dates
                .iter()
                .map(|date| per_date.get(date).copied().unwrap_or(0.0))
                .collect();
            Series { key, label, values }
        })
        .collect();

    AlignedSeries {
        dates: dates.into_iter().collect(),
        series,
    }
}

/// Headline counters of the supervisor dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeadlineStats {
    pub users: usize,
    /// Distinct (owner, batch id) pairs.
    pub batches: usize,
    pub today_eggs: u64,
    pub today_mortality: u64,
    pub today_feed: f64,
}

pub fn headline(records: &[DailyRecord], today: NaiveDate) -> HeadlineStats {
    let users: HashSet<&str> = records.iter().map(|r| r.owner_id.as_str()).collect();
    let batches: HashSet<(&str, &str)> = records
        .iter()
        .map(|r| (r.owner_id.as_str(), r.batch_id.as_str()))
        .collect();
    let today_stats = summarize_on(records, today);

    HeadlineStats {
        users: users.len(),
        batches: batches.len(),
        today_eggs: today_stats.total_eggs,
        today_mortality: today_stats.total_mortality,
        today_feed: today_stats.total_feed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{daily, day, income};

    #[test]
    fn batch_group_totals_are_exact_sums() {
        let records = vec![
            daily("u-1", "B1", "2024-01-10", 10, 1, 12.5),
            daily("u-1", "B1", "2024-01-11", 20, 0, 12.25),
        ];
        let grouped = group_by(&records, GroupKey::Batch);

        let leaf = grouped.leaf("u-1", "B1").unwrap();
        assert_eq!(leaf.stats.total_eggs, 30);
        assert_eq!(leaf.stats.total_mortality, 1);
        assert!((leaf.stats.total_feed - 24.75).abs() < 1e-9);
        assert_eq!(grouped.stats.record_count, 2);
    }

    #[test]
    fn owners_and_keys_keep_first_seen_order() {
        let records = vec![
            daily("u-2", "B9", "2024-01-10", 1, 0, 1.0),
            daily("u-1", "B2", "2024-01-10", 2, 0, 1.0),
            daily("u-2", "B3", "2024-01-10", 3, 0, 1.0),
            daily("u-1", "B1", "2024-01-10", 4, 0, 1.0),
            daily("u-2", "B9", "2024-01-11", 5, 0, 1.0),
        ];
        let grouped = group_by(&records, GroupKey::Batch);

        let owners: Vec<&str> = grouped.owners.iter().map(|o| o.owner_id.as_str()).collect();
        assert_eq!(owners, vec!["u-2", "u-1"]);
        let keys: Vec<&str> = grouped.owners[0].groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["B9", "B3"]);
        assert_eq!(grouped.owners[0].stats.total_eggs, 9);
        assert_eq!(grouped.record_count(), 5);
    }

    #[test]
    fn leaves_support_both_orderings() {
        let records = vec![
            daily("u-1", "B1", "2024-01-12", 3, 0, 1.0),
            daily("u-1", "B1", "2024-01-10", 1, 0, 1.0),
            daily("u-1", "B1", "2024-01-11", 2, 0, 1.0),
        ];
        let grouped = group_by(&records, GroupKey::Batch);
        let leaf = grouped.leaf("u-1", "B1").unwrap();

        let up: Vec<u32> = leaf.ascending().iter().map(|r| r.egg_count).collect();
        let down: Vec<u32> = leaf.descending().map(|r| r.egg_count).collect();
        assert_eq!(up, vec![1, 2, 3]);
        assert_eq!(down, vec![3, 2, 1]);
    }

    #[test]
    fn month_grouping_truncates_dates() {
        let records = vec![
            daily("u-1", "B1", "2024-01-30", 1, 0, 1.0),
            daily("u-1", "B2", "2024-02-01", 2, 0, 1.0),
            daily("u-1", "B1", "2024-01-02", 4, 0, 1.0),
        ];
        let grouped = group_by(&records, GroupKey::Month);
        let keys: Vec<&str> = grouped.owners[0].groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-01", "2024-02"]);
        assert_eq!(grouped.leaf("u-1", "2024-01").unwrap().stats.total_eggs, 5);
    }

    #[test]
    fn income_groups_split_totals_by_type() {
        let records = vec![
            income("u-1", "B1", "2024-01-10", IncomeType::EggSale, 120.5),
            income("u-1", "B1", "2024-01-11", IncomeType::MeatSale, 80.25),
            income("u-1", "B1", "2024-01-12", IncomeType::EggSale, 10.0),
        ];
        let grouped = group_by(&records, GroupKey::Batch);
        let stats = &grouped.leaf("u-1", "B1").unwrap().stats;
        assert!((stats.total_amount - 210.75).abs() < 1e-9);
        assert!((stats.total_for(IncomeType::EggSale) - 130.5).abs() < 1e-9);
        assert!((stats.total_for(IncomeType::MeatSale) - 80.25).abs() < 1e-9);
    }

    #[test]
    fn aligned_series_zero_fill_on_date_union() {
        let records = vec![
            daily("A", "B1", "2024-01-01", 5, 0, 1.0),
            daily("B", "B1", "2024-01-02", 7, 0, 1.0),
            daily("A", "B1", "2024-01-03", 9, 0, 1.0),
        ];
        let aligned = align_series(
            &records,
            |r| r.owner_id.clone(),
            |r| r.owner_name.clone(),
            |r| f64::from(r.egg_count),
        );

        assert_eq!(aligned.dates, vec![day("2024-01-01"), day("2024-01-02"), day("2024-01-03")]);
        assert_eq!(aligned.series.len(), 2);
        assert!(aligned.series.iter().all(|s| s.values.len() == 3));
        assert_eq!(aligned.series[0].values, vec![5.0, 0.0, 9.0]);
        assert_eq!(aligned.series[1].values, vec![0.0, 7.0, 0.0]);
    }

    #[test]
    fn aligned_series_sums_same_day_entries() {
        let records = vec![
            daily("A", "B1", "2024-01-01", 5, 0, 1.0),
            daily("A", "B2", "2024-01-01", 6, 0, 1.0),
        ];
        let aligned = align_series(
            &records,
            |r| r.owner_id.clone(),
            |r| r.owner_name.clone(),
            |r| f64::from(r.egg_count),
        );
        assert_eq!(aligned.series[0].values, vec![11.0]);
    }

    #[test]
    fn headline_counts_today_only() {
        let records = vec![
            daily("u-1", "B1", "2024-01-10", 10, 1, 1.0),
            daily("u-1", "B2", "2024-01-11", 20, 2, 1.0),
            daily("u-2", "B1", "2024-01-11", 30, 3, 1.0),
        ];
        let stats = headline(&records, day("2024-01-11"));
        assert_eq!(stats.users, 2);
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.today_eggs, 50);
        assert_eq!(stats.today_mortality, 5);
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let grouped = group_by::<DailyRecord>(&[], GroupKey::Batch);
        assert!(grouped.is_empty());
        assert_eq!(grouped.stats, DailyStats::default());
        let empty = align_series::<DailyRecord, _, _, _>(
            &[],
            |r| r.owner_id.clone(),
            |r| r.owner_name.clone(),
            |_| 1.0,
        );
        assert_eq!(empty, AlignedSeries::default());
    }
}
