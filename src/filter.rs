use std::str::FromStr;

use chrono::{Duration, NaiveDate};

use crate::error::{FarmError, FarmResult};
use crate::models::{DailyRecord, FarmRecord, IncomeRecord, IncomeType};

/// "Has data" predicates over daily production fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    Eggs,
    Mortality,
    Feed,
    Vaccination,
    Medicine,
}

impl FromStr for Requirement {
    type Err = FarmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "eggs" => Ok(Requirement::Eggs),
            "mortality" => Ok(Requirement::Mortality),
            "feed" => Ok(Requirement::Feed),
            "vaccination" => Ok(Requirement::Vaccination),
            "medicine" => Ok(Requirement::Medicine),
            other => Err(FarmError::Validation(format!("unknown data type '{other}'"))),
        }
    }
}

/// Kind-specific part of a [`RecordFilter`].
pub trait Filterable: FarmRecord {
    fn satisfies(&self, filter: &RecordFilter) -> bool;
}

impl Filterable for DailyRecord {
    fn satisfies(&self, filter: &RecordFilter) -> bool {
        filter.requirements.iter().all(|requirement| match requirement {
            Requirement::Eggs => self.egg_count > 0,
            Requirement::Mortality => self.mortality > 0,
            Requirement::Feed => self.feed > 0.0,
            Requirement::Vaccination => self.has_vaccination(),
            Requirement::Medicine => self.has_medicine(),
        })
    }
}

impl Filterable for IncomeRecord {
    fn satisfies(&self, filter: &RecordFilter) -> bool {
        filter
            .income_type
            .map_or(true, |income_type| income_type == self.income_type)
    }
}

/// Conjunction of optional predicates. An empty filter keeps everything.
///
/// Date bounds are inclusive. `requirements` only constrain daily records and
/// `income_type` only constrains income records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub owner_id: Option<String>,
    pub batch_id: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub requirements: Vec<Requirement>,
    pub income_type: Option<IncomeType>,
}

impl RecordFilter {
    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn on(self, date: NaiveDate) -> Self {
        self.between(Some(date), Some(date))
    }

    pub fn require(mut self, requirement: Requirement) -> Self {
        if !self.requirements.contains(&requirement) {
            self.requirements.push(requirement);
        }
        self
    }

    pub fn income_type(mut self, income_type: IncomeType) -> Self {
        self.income_type = Some(income_type);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == RecordFilter::default()
    }

    pub fn matches<T: Filterable>(&self, record: &T) -> bool {
        if let Some(owner_id) = &self.owner_id {
            if record.owner_id() != owner_id {
                return false;
            }
        }
        if let Some(batch_id) = &self.batch_id {
            if record.batch_id() != batch_id {
                return false;
            }
        }
        if self.date_from.is_some_and(|from| record.date() < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| record.date() > to) {
            return false;
        }
        record.satisfies(self)
    }

    pub fn apply<T: Filterable>(&self, records: &[T]) -> Vec<T> {
        records
            .iter()
            .filter(|record| self.matches(*record))
            .cloned()
            .collect()
    }

    /// Narrows the date bounds to their intersection with `[from, to]`.
    pub fn within(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(self.date_from.map_or(from, |current| current.max(from)));
        self.date_to = Some(self.date_to.map_or(to, |current| current.min(to)));
        self
    }
}

/// Date window of a report. Windows are filters; the planner never sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    All,
    /// `[today - 7 days, today]`
    Weekly,
    /// `[today - 30 days, today]`
    Monthly,
    Range { from: NaiveDate, to: NaiveDate },
}

impl ReportWindow {
    pub fn bounds(&self, today: NaiveDate) -> FarmResult<Option<(NaiveDate, NaiveDate)>> {
        match *self {
            ReportWindow::All => Ok(None),
            ReportWindow::Weekly => Ok(Some((today - Duration::days(7), today))),
            ReportWindow::Monthly => Ok(Some((today - Duration::days(30), today))),
            ReportWindow::Range { from, to } => {
                if from > to {
                    return Err(FarmError::Validation(format!(
                        "report range starts after it ends ({from} > {to})"
                    )));
                }
                Ok(Some((from, to)))
            }
        }
    }

    pub fn apply(&self, filter: &RecordFilter, today: NaiveDate) -> FarmResult<RecordFilter> {
        Ok(match self.bounds(today)? {
            Some((from, to)) => filter.clone().within(from, to),
            None => filter.clone(),
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportWindow::All => "All records",
            ReportWindow::Weekly => "Weekly",
            ReportWindow::Monthly => "Monthly",
            ReportWindow::Range { .. } => "Date range",
        }
    }
}
