//! Series preparation for the chart backend. Nothing here draws.

use std::str::FromStr;

use serde::Serialize;

use crate::aggregate::{align_series, AlignedSeries, LeafGroup};
use crate::error::FarmError;
use crate::format;
use crate::models::{DailyRecord, IncomeRecord};

pub const PALETTE: [&str; 10] = [
    "#2563eb", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899", "#14b8a6", "#f97316",
    "#06b6d4", "#84cc16",
];

const EGG_COLOR: &str = "#10b981";
const MORTALITY_COLOR: &str = "#ef4444";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub color: String,
    pub axis: Axis,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub title: String,
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
    /// Set when two differently scaled series share the plot.
    pub dual_axis: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Eggs,
    Mortality,
    Feed,
}

impl Metric {
    pub fn value(&self, record: &DailyRecord) -> f64 {
        match self {
            Metric::Eggs => f64::from(record.egg_count),
            Metric::Mortality => f64::from(record.mortality),
            Metric::Feed => record.feed,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Metric::Eggs => "Egg Production Comparison - All Users",
            Metric::Mortality => "Mortality Comparison - All Users",
            Metric::Feed => "Feed Usage Comparison - All Users",
        }
    }
}

impl FromStr for Metric {
    type Err = FarmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "eggs" => Ok(Metric::Eggs),
            "mortality" => Ok(Metric::Mortality),
            "feed" => Ok(Metric::Feed),
            other => Err(FarmError::Validation(format!("unknown chart metric '{other}'"))),
        }
    }
}

fn labels(aligned: &AlignedSeries) -> Vec<String> {
    aligned.dates.iter().map(|date| format::date(*date)).collect()
}

/// Eggs on the left axis and mortality on the right, one point per date.
pub fn batch_trend(owner_name: &str, leaf: &LeafGroup<DailyRecord>) -> ChartData {
    let records = leaf.ascending();
    let eggs = align_series(
        records,
        |_| "eggs".to_string(),
        |_| "Egg Count".to_string(),
        |r| Metric::Eggs.value(r),
    );
    let mortality = align_series(
        records,
        |_| "mortality".to_string(),
        |_| "Mortality".to_string(),
        |r| Metric::Mortality.value(r),
    );

    let date_labels = labels(&mortality);

    let mut series = Vec::with_capacity(2);
    if let Some(egg_series) = eggs.series.into_iter().next() {
        series.push(ChartSeries {
            label: egg_series.label,
            color: EGG_COLOR.to_string(),
            axis: Axis::Left,
            values: egg_series.values,
        });
    }
    if let Some(mortality_series) = mortality.series.into_iter().next() {
        series.push(ChartSeries {
            label: mortality_series.label,
            color: MORTALITY_COLOR.to_string(),
            axis: Axis::Right,
            values: mortality_series.values,
        });
    }

    ChartData {
        title: format!("{owner_name} - Batch {}", leaf.key),
        labels: date_labels,
        series,
        dual_axis: true,
    }
}

/// One line per owner on a shared date axis, colours cycling through [`PALETTE`].
pub fn owner_comparison(records: &[DailyRecord], metric: Metric) -> ChartData {
    let aligned = align_series(
        records,
        |r| r.owner_id.clone(),
        |r| r.owner_name.clone(),
        |r| metric.value(r),
    );
    comparison(metric.title(), aligned)
}

/// Sales amount per income type on a shared date axis.
pub fn income_comparison(records: &[IncomeRecord]) -> ChartData {
    let aligned = align_series(
        records,
        |r| r.income_type.as_str().to_string(),
        |r| r.income_type.to_string(),
        |r| r.amount,
    );
    comparison("Income by Type", aligned)
}

fn comparison(title: &str, aligned: AlignedSeries) -> ChartData {
    let labels = labels(&aligned);
    let series = aligned
        .series
        .into_iter()
        .enumerate()
        .map(|(index, series)| ChartSeries {
            label: series.label,
            color: PALETTE[index % PALETTE.len()].to_string(),
            axis: Axis::Left,
            values: series.values,
        })
        .collect();

    ChartData {
        title: title.to_string(),
        labels,
        series,
        dual_axis: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{group_by, GroupKey};
    use crate::models::IncomeType;
    use crate::store::testing::{daily, income};

    #[test]
    fn batch_trend_is_dual_axis_and_date_sorted() {
        let records = vec![
            daily("u-1", "B1", "2024-01-11", 20, 1, 1.0),
            daily("u-1", "B1", "2024-01-10", 10, 3, 1.0),
        ];
        let grouped = group_by(&records, GroupKey::Batch);
        let (owner, leaf) = grouped.leaves().next().unwrap();
        let chart = batch_trend(&owner.owner_name, leaf);

        assert!(chart.dual_axis);
        assert_eq!(chart.labels, vec!["2024-01-10", "2024-01-11"]);
        assert_eq!(chart.series[0].values, vec![10.0, 20.0]);
        assert_eq!(chart.series[1].values, vec![3.0, 1.0]);
        assert_eq!(chart.series[1].axis, Axis::Right);
    }

    #[test]
    fn comparison_colours_cycle_through_palette() {
        let records: Vec<DailyRecord> = (0..12)
            .map(|i| daily(&format!("u-{i}"), "B1", "2024-01-10", i, 0, 1.0))
            .collect();
        let chart = owner_comparison(&records, Metric::Eggs);

        assert_eq!(chart.series.len(), 12);
        assert_eq!(chart.series[0].color, PALETTE[0]);
        assert_eq!(chart.series[10].color, PALETTE[0]);
        assert_eq!(chart.series[11].color, PALETTE[1]);
        assert!(!chart.dual_axis);
    }

    #[test]
    fn income_comparison_aligns_types() {
        let records = vec![
            income("u-1", "B1", "2024-01-10", IncomeType::EggSale, 50.0),
            income("u-1", "B1", "2024-01-12", IncomeType::MeatSale, 75.0),
        ];
        let chart = income_comparison(&records);
        assert_eq!(chart.labels.len(), 2);
        assert_eq!(chart.series[0].label, "Egg Sale");
        assert_eq!(chart.series[0].values, vec![50.0, 0.0]);
        assert_eq!(chart.series[1].values, vec![0.0, 75.0]);
    }
}
