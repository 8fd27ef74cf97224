//! Ownership and routing: who may see a record, and how producers share records
//! with a supervisor.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{FarmError, FarmResult};
use crate::models::{FarmRecord, RecordKind, RoutingState, Viewer};
use crate::store::{settle_group, RecordStore};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Accepts `local@domain.tld` shapes: one `@`, no whitespace, a dot inside the domain.
pub fn validate_email(email: &str) -> FarmResult<()> {
    if email.is_empty() {
        return Err(FarmError::Validation(
            "supervisor email address is required".to_string(),
        ));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(FarmError::Validation(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(())
}

pub fn is_visible<T: FarmRecord>(viewer: &Viewer, record: &T) -> bool {
    match viewer {
        Viewer::Producer { owner_id } => record.owner_id() == owner_id,
        Viewer::Supervisor { email } => record.routing().is_routed_to(email),
    }
}

/// Records the viewer is allowed to see, in input order. Anything else is
/// silently excluded.
pub fn visible_records<T: FarmRecord>(viewer: &Viewer, records: &[T]) -> Vec<T> {
    records
        .iter()
        .filter(|record| is_visible(viewer, *record))
        .cloned()
        .collect()
}

/// Marks a record as shared with `to_email`. A previous destination is overwritten.
pub fn route<T: FarmRecord>(record: &mut T, to_email: &str, at: DateTime<Utc>) -> FarmResult<()> {
    validate_email(to_email)?;
    *record.routing_mut() = RoutingState::routed_to(to_email, at);
    Ok(())
}

/// Selects which stored records a batch route applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub kind: RecordKind,
    pub owner_id: String,
    pub batch_id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    pub routed: usize,
    pub destination: String,
    pub routed_at: DateTime<Utc>,
}

/// Routes every record of `target.owner_id` matching the batch id and date.
///
/// Updates are issued together and awaited as a group. Writes that succeeded
/// stay in place when others fail; the caller gets the counts back.
pub async fn batch_route(
    store: &dyn RecordStore,
    target: &RouteTarget,
    to_email: &str,
    now: DateTime<Utc>,
) -> FarmResult<RouteOutcome> {
    validate_email(to_email)?;
    if target.batch_id.trim().is_empty() {
        return Err(FarmError::Validation(
            "batch id is required to send records".to_string(),
        ));
    }

    let ids = match target.kind {
        RecordKind::Daily => matching_ids(
            &store.fetch_daily_by_owner(&target.owner_id).await?,
            target,
        ),
        RecordKind::Income => matching_ids(
            &store.fetch_income_by_owner(&target.owner_id).await?,
            target,
        ),
    };

    if ids.is_empty() {
        return Err(FarmError::NotFound(format!(
            "no saved {} records for batch '{}' on {}",
            target.kind.as_str(),
            target.batch_id,
            target.date
        )));
    }

    debug!(
        owner = %target.owner_id,
        batch = %target.batch_id,
        date = %target.date,
        count = ids.len(),
        "routing records"
    );

    let patch = RoutingState::routed_to(to_email, now);
    let results = join_all(
        ids.iter()
            .map(|id| store.update_routing(target.kind, *id, &patch)),
    )
    .await;

    match settle_group("batch route", results) {
        Ok(routed) => {
            info!(routed, destination = to_email, "records routed to supervisor");
            Ok(RouteOutcome {
                routed,
                destination: to_email.to_string(),
                routed_at: now,
            })
        }
        Err(err) => {
            warn!(error = %err, "batch route did not complete");
            Err(err)
        }
    }
}

fn matching_ids<T: FarmRecord>(records: &[T], target: &RouteTarget) -> Vec<uuid::Uuid> {
    records
        .iter()
        .filter(|record| {
            record.owner_id() == target.owner_id
                && record.batch_id() == target.batch_id
                && record.date() == target.date
        })
        .map(|record| record.id())
        .collect()
}
