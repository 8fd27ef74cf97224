//! Producer and supervisor view controllers.
//!
//! Each view owns a [`Session`]. Filter changes recompute everything from the
//! snapshot; writes go through the store and are followed by a refresh.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{group_by, headline, GroupKey, GroupedResult, HeadlineStats};
use crate::chart::{batch_trend, income_comparison, owner_comparison, ChartData, Metric};
use crate::config::Config;
use crate::error::{FarmError, FarmResult};
use crate::filter::{Filterable, RecordFilter, ReportWindow};
use crate::format;
use crate::layout::{plan_report, PageGeometry, ReportHeading, ReportPlan, Tabular};
use crate::models::{
    DailyEntry, DailyRecord, FarmRecord, IncomeEntry, IncomeRecord, Profile, RecordKind, Viewer,
};
use crate::photos::{BinaryStorage, PhotoUpload};
use crate::routing::{batch_route, RouteOutcome, RouteTarget};
use crate::session::{Session, UserOption};
use crate::store::{not_found, settle_group, RecordStore};

pub const REPORT_TITLE: &str = "Poultry Management Report";
pub const INCOME_REPORT_TITLE: &str = "Poultry Income Report";

#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub id: Uuid,
    /// Set when the record was saved but its photo was not.
    pub photo_warning: Option<String>,
    /// Set when the record was saved but the snapshot could not be reloaded.
    pub refresh_warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub route: RouteOutcome,
    pub refresh_warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub refresh_warning: Option<String>,
}

/// A history row with its routing state.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry<T> {
    pub record: T,
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    pub label: String,
    pub geometry: PageGeometry,
}

impl From<&Config> for ReportOptions {
    fn from(config: &Config) -> Self {
        Self {
            label: config.report_label.clone(),
            geometry: config.page,
        }
    }
}

/// What to report on and when. `today` anchors the weekly and monthly windows.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub window: ReportWindow,
    pub filter: RecordFilter,
    pub today: NaiveDate,
    pub generated_at: DateTime<Utc>,
}

pub struct ProducerView {
    profile: Profile,
    session: Session,
}

impl ProducerView {
    pub async fn open(store: &dyn RecordStore, profile: Profile) -> FarmResult<Self> {
        let session = Session::load(store, Viewer::producer(profile.uid.clone())).await?;
        Ok(Self { profile, session })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn refresh(&mut self, store: &dyn RecordStore) -> FarmResult<()> {
        self.session.refresh(store).await
    }

    /// Saves a daily record. A failed photo upload is reported but does not
    /// stop the record from being saved.
    pub async fn save_daily_record(
        &mut self,
        store: &dyn RecordStore,
        photos: &dyn BinaryStorage,
        entry: DailyEntry,
        photo: Option<PhotoUpload>,
    ) -> FarmResult<SaveOutcome> {
        entry.validate()?;
        let mut record = DailyRecord::new(&self.profile, entry, Utc::now());

        let mut photo_warning = None;
        if let Some(upload) = photo {
            match photos
                .upload(&self.profile.uid, &upload.filename, &upload.bytes)
                .await
            {
                Ok(url) => record.photo_url = Some(url),
                Err(err) => {
                    warn!(
                        owner = %self.profile.uid,
                        file = %upload.filename,
                        error = %err,
                        "photo upload failed, saving record without photo"
                    );
                    photo_warning = Some(format!("record saved without photo: {err}"));
                }
            }
        }

        let id = store.insert_daily(&record).await?;
        info!(
            owner = %record.owner_id,
            batch = %record.batch_id,
            date = %record.date,
            "daily record saved"
        );
        Ok(SaveOutcome {
            id,
            photo_warning,
            refresh_warning: self.reload(store).await,
        })
    }

    pub async fn save_income_record(
        &mut self,
        store: &dyn RecordStore,
        entry: IncomeEntry,
    ) -> FarmResult<SaveOutcome> {
        entry.validate()?;
        let record = IncomeRecord::new(&self.profile, entry, Utc::now());
        let id = store.insert_income(&record).await?;
        info!(
            owner = %record.owner_id,
            batch = %record.batch_id,
            income_type = record.income_type.as_str(),
            "income record saved"
        );
        Ok(SaveOutcome {
            id,
            photo_warning: None,
            refresh_warning: self.reload(store).await,
        })
    }

    /// Routes every own record of `batch_id` on `date` to a supervisor.
    pub async fn send_to_supervisor(
        &mut self,
        store: &dyn RecordStore,
        kind: RecordKind,
        batch_id: &str,
        date: NaiveDate,
        to_email: &str,
    ) -> FarmResult<SendOutcome> {
        let target = RouteTarget {
            kind,
            owner_id: self.profile.uid.clone(),
            batch_id: batch_id.trim().to_string(),
            date,
        };
        let result = batch_route(store, &target, to_email.trim(), Utc::now()).await;
        let route = self.after_write(store, result).await?;
        Ok(SendOutcome {
            route,
            refresh_warning: self.reload(store).await,
        })
    }

    /// Deletes own records. Ids outside the snapshot count as failures and
    /// repeated ids are deleted once.
    pub async fn delete_records(
        &mut self,
        store: &dyn RecordStore,
        kind: RecordKind,
        ids: &[Uuid],
    ) -> FarmResult<DeleteOutcome> {
        if ids.is_empty() {
            return Err(FarmError::Validation(
                "select at least one record to delete".to_string(),
            ));
        }

        let mut unique: Vec<Uuid> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        let results = join_all(
            unique
                .iter()
                .map(|id| self.delete_owned(store, kind, *id)),
        )
        .await;
        let deleted = self
            .after_write(store, settle_group("bulk delete", results))
            .await?;
        info!(owner = %self.profile.uid, kind = kind.as_str(), deleted, "records deleted");
        Ok(DeleteOutcome {
            deleted,
            refresh_warning: self.reload(store).await,
        })
    }

    async fn delete_owned(
        &self,
        store: &dyn RecordStore,
        kind: RecordKind,
        id: Uuid,
    ) -> FarmResult<()> {
        let owned = match kind {
            RecordKind::Daily => self.session.find_daily(id).is_ok(),
            RecordKind::Income => self.session.find_income(id).is_ok(),
        };
        if !owned {
            return Err(not_found(kind, id));
        }
        store.delete(kind, id).await
    }

    /// A partially applied write still changed the store, so the snapshot is
    /// reloaded before the error goes back to the caller.
    async fn after_write<T>(
        &mut self,
        store: &dyn RecordStore,
        result: FarmResult<T>,
    ) -> FarmResult<T> {
        if matches!(result, Err(FarmError::PartialFailure { .. })) {
            self.reload(store).await;
        }
        result
    }

    /// Reloads the snapshot after a write. A failure here never undoes or
    /// hides the write; it comes back as a warning.
    async fn reload(&mut self, store: &dyn RecordStore) -> Option<String> {
        match self.session.refresh(store).await {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    owner = %self.profile.uid,
                    error = %err,
                    "write stored but snapshot refresh failed"
                );
                Some(format!("change saved, but the view could not be refreshed: {err}"))
            }
        }
    }

    /// Own daily records, most recent first.
    pub fn history(&self, filter: &RecordFilter) -> Vec<HistoryEntry<DailyRecord>> {
        history(self.session.daily_matching(filter))
    }

    pub fn income_history(&self, filter: &RecordFilter) -> Vec<HistoryEntry<IncomeRecord>> {
        history(self.session.income_matching(filter))
    }

    pub fn batch_trends(&self, filter: &RecordFilter) -> Vec<ChartData> {
        trend_charts(&group_by(&self.session.daily_matching(filter), GroupKey::Batch))
    }

    pub fn report(
        &self,
        request: &ReportRequest,
        options: &ReportOptions,
    ) -> FarmResult<ReportPlan> {
        build_report(
            self.session.daily(),
            REPORT_TITLE,
            &options.label,
            self.viewer_line(),
            request,
            &options.geometry,
        )
    }

    pub fn income_report(
        &self,
        request: &ReportRequest,
        options: &ReportOptions,
    ) -> FarmResult<ReportPlan> {
        build_report(
            self.session.income(),
            INCOME_REPORT_TITLE,
            &income_label(&options.label),
            self.viewer_line(),
            request,
            &options.geometry,
        )
    }

    fn viewer_line(&self) -> String {
        format!("Producer: {} - {}", self.profile.full_name, self.profile.farm_name)
    }
}

/// Everything the supervisor dashboard shows for one filter state.
#[derive(Debug, Clone)]
pub struct SupervisorDashboard {
    pub headline: HeadlineStats,
    pub batches: GroupedResult<DailyRecord>,
    pub trends: Vec<ChartData>,
    pub income: GroupedResult<IncomeRecord>,
    pub income_chart: ChartData,
}

#[derive(Debug, Clone)]
pub struct MonthlyComparison {
    pub months: GroupedResult<DailyRecord>,
    pub eggs: ChartData,
    pub mortality: ChartData,
}

pub struct SupervisorView {
    name: String,
    session: Session,
}

impl SupervisorView {
    pub async fn open(
        store: &dyn RecordStore,
        email: &str,
        name: impl Into<String>,
    ) -> FarmResult<Self> {
        let session = Session::load(store, Viewer::supervisor(email)).await?;
        Ok(Self {
            name: name.into(),
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn refresh(&mut self, store: &dyn RecordStore) -> FarmResult<()> {
        self.session.refresh(store).await
    }

    pub fn user_options(&self) -> Vec<UserOption> {
        self.session.user_options()
    }

    pub fn detail(&self, id: Uuid) -> FarmResult<&DailyRecord> {
        self.session.find_daily(id)
    }

    pub fn dashboard(&self, filter: &RecordFilter, today: NaiveDate) -> SupervisorDashboard {
        let daily = self.session.daily_matching(filter);
        let income = self.session.income_matching(filter);
        let batches = group_by(&daily, GroupKey::Batch);

        SupervisorDashboard {
            headline: headline(&daily, today),
            trends: trend_charts(&batches),
            batches,
            income: group_by(&income, GroupKey::Batch),
            income_chart: income_comparison(&income),
        }
    }

    pub fn monthly_comparison(&self, filter: &RecordFilter) -> MonthlyComparison {
        let daily = self.session.daily_matching(filter);
        MonthlyComparison {
            months: group_by(&daily, GroupKey::Month),
            eggs: owner_comparison(&daily, Metric::Eggs),
            mortality: owner_comparison(&daily, Metric::Mortality),
        }
    }

    pub fn report(
        &self,
        request: &ReportRequest,
        options: &ReportOptions,
    ) -> FarmResult<ReportPlan> {
        build_report(
            self.session.daily(),
            REPORT_TITLE,
            &options.label,
            self.viewer_line(),
            request,
            &options.geometry,
        )
    }

    pub fn income_report(
        &self,
        request: &ReportRequest,
        options: &ReportOptions,
    ) -> FarmResult<ReportPlan> {
        build_report(
            self.session.income(),
            INCOME_REPORT_TITLE,
            &income_label(&options.label),
            self.viewer_line(),
            request,
            &options.geometry,
        )
    }

    fn viewer_line(&self) -> String {
        format!("Supervisor: {}", self.name)
    }
}

fn history<T: FarmRecord>(mut records: Vec<T>) -> Vec<HistoryEntry<T>> {
    records.sort_by(|a, b| b.date().cmp(&a.date()));
    records
        .into_iter()
        .map(|record| HistoryEntry {
            status: format::sent_label(record.routing().routed),
            record,
        })
        .collect()
}

fn trend_charts(batches: &GroupedResult<DailyRecord>) -> Vec<ChartData> {
    batches
        .leaves()
        .map(|(owner, leaf)| batch_trend(&owner.owner_name, leaf))
        .collect()
}

fn income_label(label: &str) -> String {
    format!("{label}_Income")
}

fn build_report<T: Tabular + Filterable>(
    records: &[T],
    title: &str,
    label: &str,
    viewer_line: String,
    request: &ReportRequest,
    geometry: &PageGeometry,
) -> FarmResult<ReportPlan> {
    let filter = request.window.apply(&request.filter, request.today)?;
    let matching = filter.apply(records);
    let grouped = group_by(&matching, GroupKey::Batch);

    let mut lines = vec![
        viewer_line,
        format!("Generated: {}", format::timestamp(request.generated_at)),
    ];
    if let Some((from, to)) = request.window.bounds(request.today)? {
        lines.push(format!(
            "Period: {} ({} to {})",
            request.window.label(),
            format::date(from),
            format::date(to)
        ));
    }

    let heading = ReportHeading {
        label: label.to_string(),
        title: title.to_string(),
        lines,
        generated_at: request.generated_at,
    };
    let plan = plan_report(&heading, &grouped, geometry)?;
    info!(
        title,
        window = request.window.label(),
        records = matching.len(),
        pages = plan.page_count(),
        "report planned"
    );
    Ok(plan)
}
