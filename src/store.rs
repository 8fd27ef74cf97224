//! Record store seam.
//!
//! The engine never talks to a database directly: it loads a snapshot through
//! [`RecordStore`] and writes routing patches back through it. [`MemoryStore`]
//! backs tests and local runs, `db::PgRecordStore` backs the CLI.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{FarmError, FarmResult};
use crate::models::{DailyRecord, IncomeRecord, RecordKind, RoutingState};

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_daily_by_owner(&self, owner_id: &str) -> FarmResult<Vec<DailyRecord>>;

    /// Every daily record in the store. Routing is filtered by the caller.
    async fn fetch_all_daily(&self) -> FarmResult<Vec<DailyRecord>>;

    async fn fetch_income_by_owner(&self, owner_id: &str) -> FarmResult<Vec<IncomeRecord>>;

    async fn fetch_all_income(&self) -> FarmResult<Vec<IncomeRecord>>;

    async fn insert_daily(&self, record: &DailyRecord) -> FarmResult<Uuid>;

    async fn insert_income(&self, record: &IncomeRecord) -> FarmResult<Uuid>;

    /// Routing fields are the only patchable part of a stored record.
    async fn update_routing(
        &self,
        kind: RecordKind,
        id: Uuid,
        patch: &RoutingState,
    ) -> FarmResult<()>;

    async fn delete(&self, kind: RecordKind, id: Uuid) -> FarmResult<()>;
}

/// In-process store keeping records in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    daily: RwLock<Vec<DailyRecord>>,
    income: RwLock<Vec<IncomeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(daily: Vec<DailyRecord>, income: Vec<IncomeRecord>) -> Self {
        Self {
            daily: RwLock::new(daily),
            income: RwLock::new(income),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_daily_by_owner(&self, owner_id: &str) -> FarmResult<Vec<DailyRecord>> {
        let daily = self.daily.read().await;
        Ok(daily
            .iter()
            .filter(|record| record.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn fetch_all_daily(&self) -> FarmResult<Vec<DailyRecord>> {
        Ok(self.daily.read().await.clone())
    }

    async fn fetch_income_by_owner(&self, owner_id: &str) -> FarmResult<Vec<IncomeRecord>> {
        let income = self.income.read().await;
        Ok(income
            .iter()
            .filter(|record| record.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn fetch_all_income(&self) -> FarmResult<Vec<IncomeRecord>> {
        Ok(self.income.read().await.clone())
    }

    async fn insert_daily(&self, record: &DailyRecord) -> FarmResult<Uuid> {
        self.daily.write().await.push(record.clone());
        Ok(record.id)
    }

    async fn insert_income(&self, record: &IncomeRecord) -> FarmResult<Uuid> {
        self.income.write().await.push(record.clone());
        Ok(record.id)
    }

    async fn update_routing(
        &self,
        kind: RecordKind,
        id: Uuid,
        patch: &RoutingState,
    ) -> FarmResult<()> {
        let updated = match kind {
            RecordKind::Daily => self
                .daily
                .write()
                .await
                .iter_mut()
                .find(|record| record.id == id)
                .map(|record| record.routing = patch.clone()),
            RecordKind::Income => self
                .income
                .write()
                .await
                .iter_mut()
                .find(|record| record.id == id)
                .map(|record| record.routing = patch.clone()),
        };

        updated.ok_or_else(|| not_found(kind, id))
    }

    async fn delete(&self, kind: RecordKind, id: Uuid) -> FarmResult<()> {
        let removed = match kind {
            RecordKind::Daily => {
                let mut daily = self.daily.write().await;
                let before = daily.len();
                daily.retain(|record| record.id != id);
                before != daily.len()
            }
            RecordKind::Income => {
                let mut income = self.income.write().await;
                let before = income.len();
                income.retain(|record| record.id != id);
                before != income.len()
            }
        };

        if removed {
            Ok(())
        } else {
            Err(not_found(kind, id))
        }
    }
}

pub(crate) fn not_found(kind: RecordKind, id: Uuid) -> FarmError {
    FarmError::NotFound(format!("{} record {id}", kind.as_str()))
}

/// Folds the results of a group of independent writes.
///
/// All succeeded: the count. None succeeded: the first error as-is. Otherwise a
/// [`FarmError::PartialFailure`] with both counts.
pub(crate) fn settle_group(operation: &str, results: Vec<FarmResult<()>>) -> FarmResult<usize> {
    let total = results.len();
    let mut errors = results.into_iter().filter_map(Result::err).collect::<Vec<_>>();
    let failed = errors.len();

    if failed == 0 {
        return Ok(total);
    }
    let first = errors.remove(0);
    if failed == total {
        return Err(first);
    }

    Err(FarmError::PartialFailure {
        operation: operation.to_string(),
        succeeded: total - failed,
        failed,
        message: first.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::models::{DailyRecord, IncomeRecord, IncomeType, RoutingState};

    pub fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    pub fn daily(
        owner: &str,
        batch: &str,
        date: &str,
        eggs: u32,
        mortality: u32,
        feed: f64,
    ) -> DailyRecord {
        DailyRecord {
            id: uuid::Uuid::new_v4(),
            owner_id: owner.to_string(),
            owner_name: format!("{owner} name"),
            farm_name: format!("{owner} farm"),
            batch_id: batch.to_string(),
            batch_number: 1,
            date: day(date),
            egg_count: eggs,
            mortality,
            feed,
            vaccination: None,
            medicine: None,
            photo_url: None,
            routing: RoutingState::default(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        }
    }

    pub fn income(
        owner: &str,
        batch: &str,
        date: &str,
        income_type: IncomeType,
        amount: f64,
    ) -> IncomeRecord {
        IncomeRecord {
            id: uuid::Uuid::new_v4(),
            owner_id: owner.to_string(),
            owner_name: format!("{owner} name"),
            farm_name: format!("{owner} farm"),
            income_type,
            date: day(date),
            batch_id: batch.to_string(),
            quantity: 10.0,
            unit: "trays".to_string(),
            amount,
            notes: None,
            routing: RoutingState::default(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        }
    }

    pub fn routed(mut record: DailyRecord, email: &str) -> DailyRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        record.routing = RoutingState::routed_to(email, at);
        record
    }
}
