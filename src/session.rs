//! Explicit session context: who is looking, and the snapshot they loaded.
//!
//! All filtering, grouping and planning runs synchronously over this snapshot.
//! Only [`Session::load`] and [`Session::refresh`] go back to the store.

use chrono::{Local, NaiveDate};
use tracing::info;
use uuid::Uuid;

use crate::error::{FarmError, FarmResult};
use crate::filter::RecordFilter;
use crate::models::{DailyRecord, FarmRecord, IncomeRecord, Viewer};
use crate::routing::visible_records;
use crate::store::RecordStore;

/// The viewer's calendar day. Read fresh on every call.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Clone)]
pub struct Session {
    viewer: Viewer,
    daily: Vec<DailyRecord>,
    income: Vec<IncomeRecord>,
}

/// A distinct owner present in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOption {
    pub owner_id: String,
    pub owner_name: String,
}

impl Session {
    /// One bulk read per record kind, then the routing resolver.
    pub async fn load(store: &dyn RecordStore, viewer: Viewer) -> FarmResult<Self> {
        let (daily, income) = match &viewer {
            Viewer::Producer { owner_id } => (
                store.fetch_daily_by_owner(owner_id).await?,
                store.fetch_income_by_owner(owner_id).await?,
            ),
            // The store cannot express "routed AND routed to", so filter here.
            Viewer::Supervisor { .. } => (
                store.fetch_all_daily().await?,
                store.fetch_all_income().await?,
            ),
        };

        let session = Self {
            daily: visible_records(&viewer, &daily),
            income: visible_records(&viewer, &income),
            viewer,
        };
        info!(
            viewer = ?session.viewer,
            daily = session.daily.len(),
            income = session.income.len(),
            "snapshot loaded"
        );
        Ok(session)
    }

    pub async fn refresh(&mut self, store: &dyn RecordStore) -> FarmResult<()> {
        *self = Self::load(store, self.viewer.clone()).await?;
        Ok(())
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn daily(&self) -> &[DailyRecord] {
        &self.daily
    }

    pub fn income(&self) -> &[IncomeRecord] {
        &self.income
    }

    pub fn daily_matching(&self, filter: &RecordFilter) -> Vec<DailyRecord> {
        filter.apply(&self.daily)
    }

    pub fn income_matching(&self, filter: &RecordFilter) -> Vec<IncomeRecord> {
        filter.apply(&self.income)
    }

    pub fn find_daily(&self, id: Uuid) -> FarmResult<&DailyRecord> {
        find(&self.daily, id)
    }

    pub fn find_income(&self, id: Uuid) -> FarmResult<&IncomeRecord> {
        find(&self.income, id)
    }

    /// Owners of the unfiltered snapshot in first-seen order, daily records first.
    pub fn user_options(&self) -> Vec<UserOption> {
        let mut options: Vec<UserOption> = Vec::new();
        let owners = self
            .daily
            .iter()
            .map(|r| (r.owner_id(), r.owner_name()))
            .chain(self.income.iter().map(|r| (r.owner_id(), r.owner_name())));

        for (owner_id, owner_name) in owners {
            if !options.iter().any(|option| option.owner_id == owner_id) {
                options.push(UserOption {
                    owner_id: owner_id.to_string(),
                    owner_name: owner_name.to_string(),
                });
            }
        }
        options
    }
}

fn find<T: FarmRecord>(records: &[T], id: Uuid) -> FarmResult<&T> {
    records
        .iter()
        .find(|record| record.id() == id)
        .ok_or_else(|| FarmError::NotFound(format!("{} record {id}", T::KIND.as_str())))
}
