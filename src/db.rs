use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::{FarmError, FarmResult};
use crate::models::{
    DailyEntry, DailyRecord, IncomeRecord, IncomeType, RecordKind, RoutingState,
};
use crate::store::{not_found, RecordStore};

const DAILY_COLUMNS: &str = "id, owner_id, owner_name, farm_name, batch_id, batch_number, \
     record_date, egg_count, mortality, feed_kg, vaccination, medicine, photo_url, \
     routed, routed_to_email, routed_at, created_at";

const INCOME_COLUMNS: &str = "id, owner_id, owner_name, farm_name, income_type, record_date, \
     batch_id, quantity, unit, amount, notes, routed, routed_to_email, routed_at, created_at";

pub async fn init_db(pool: &PgPool) -> FarmResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed [`RecordStore`].
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_daily(&self, owner_id: Option<&str>) -> FarmResult<Vec<DailyRecord>> {
        let mut query = format!("SELECT {DAILY_COLUMNS} FROM flock_ledger.daily_records");
        if owner_id.is_some() {
            query.push_str(" WHERE owner_id = $1");
        }
        query.push_str(" ORDER BY created_at");

        let mut rows = sqlx::query(&query);
        if let Some(value) = owner_id {
            rows = rows.bind(value);
        }

        rows.fetch_all(&self.pool)
            .await?
            .iter()
            .map(daily_from_row)
            .collect()
    }

    async fn fetch_income(&self, owner_id: Option<&str>) -> FarmResult<Vec<IncomeRecord>> {
        let mut query = format!("SELECT {INCOME_COLUMNS} FROM flock_ledger.income_records");
        if owner_id.is_some() {
            query.push_str(" WHERE owner_id = $1");
        }
        query.push_str(" ORDER BY created_at");

        let mut rows = sqlx::query(&query);
        if let Some(value) = owner_id {
            rows = rows.bind(value);
        }

        rows.fetch_all(&self.pool)
            .await?
            .iter()
            .map(income_from_row)
            .collect()
    }

    /// Inserts a daily record, skipping it when `source_key` was already imported.
    async fn insert_daily_keyed(
        &self,
        record: &DailyRecord,
        source_key: Option<&str>,
    ) -> FarmResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO flock_ledger.daily_records
            (id, owner_id, owner_name, farm_name, batch_id, batch_number, record_date,
             egg_count, mortality, feed_kg, vaccination, medicine, photo_url,
             routed, routed_to_email, routed_at, created_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(&record.owner_name)
        .bind(&record.farm_name)
        .bind(&record.batch_id)
        .bind(record.batch_number)
        .bind(record.date)
        .bind(i64::from(record.egg_count))
        .bind(i64::from(record.mortality))
        .bind(record.feed)
        .bind(&record.vaccination)
        .bind(&record.medicine)
        .bind(&record.photo_url)
        .bind(record.routing.routed)
        .bind(&record.routing.routed_to_email)
        .bind(record.routing.routed_at)
        .bind(record.created_at)
        .bind(source_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn fetch_daily_by_owner(&self, owner_id: &str) -> FarmResult<Vec<DailyRecord>> {
        self.fetch_daily(Some(owner_id)).await
    }

    async fn fetch_all_daily(&self) -> FarmResult<Vec<DailyRecord>> {
        self.fetch_daily(None).await
    }

    async fn fetch_income_by_owner(&self, owner_id: &str) -> FarmResult<Vec<IncomeRecord>> {
        self.fetch_income(Some(owner_id)).await
    }

    async fn fetch_all_income(&self) -> FarmResult<Vec<IncomeRecord>> {
        self.fetch_income(None).await
    }

    async fn insert_daily(&self, record: &DailyRecord) -> FarmResult<Uuid> {
        self.insert_daily_keyed(record, None).await?;
        Ok(record.id)
    }

    async fn insert_income(&self, record: &IncomeRecord) -> FarmResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO flock_ledger.income_records
            (id, owner_id, owner_name, farm_name, income_type, record_date, batch_id,
             quantity, unit, amount, notes, routed, routed_to_email, routed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(&record.owner_name)
        .bind(&record.farm_name)
        .bind(record.income_type.as_str())
        .bind(record.date)
        .bind(&record.batch_id)
        .bind(record.quantity)
        .bind(&record.unit)
        .bind(record.amount)
        .bind(&record.notes)
        .bind(record.routing.routed)
        .bind(&record.routing.routed_to_email)
        .bind(record.routing.routed_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record.id)
    }

    async fn update_routing(
        &self,
        kind: RecordKind,
        id: Uuid,
        patch: &RoutingState,
    ) -> FarmResult<()> {
        let query = format!(
            "UPDATE flock_ledger.{} SET routed = $1, routed_to_email = $2, routed_at = $3 \
             WHERE id = $4",
            table_name(kind)
        );
        let result = sqlx::query(&query)
            .bind(patch.routed)
            .bind(&patch.routed_to_email)
            .bind(patch.routed_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(kind, id));
        }
        Ok(())
    }

    async fn delete(&self, kind: RecordKind, id: Uuid) -> FarmResult<()> {
        let query = format!("DELETE FROM flock_ledger.{} WHERE id = $1", table_name(kind));
        let result = sqlx::query(&query).bind(id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(not_found(kind, id));
        }
        Ok(())
    }
}

fn table_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Daily => "daily_records",
        RecordKind::Income => "income_records",
    }
}

fn count_column(row: &PgRow, column: &str) -> FarmResult<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value)
        .map_err(|_| FarmError::Validation(format!("{column} out of range: {value}")))
}

fn routing_from_row(row: &PgRow) -> FarmResult<RoutingState> {
    Ok(RoutingState {
        routed: row.try_get("routed")?,
        routed_to_email: row.try_get("routed_to_email")?,
        routed_at: row.try_get("routed_at")?,
    })
}

fn daily_from_row(row: &PgRow) -> FarmResult<DailyRecord> {
    Ok(DailyRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        owner_name: row.try_get("owner_name")?,
        farm_name: row.try_get("farm_name")?,
        batch_id: row.try_get("batch_id")?,
        batch_number: row.try_get("batch_number")?,
        date: row.try_get("record_date")?,
        egg_count: count_column(row, "egg_count")?,
        mortality: count_column(row, "mortality")?,
        feed: row.try_get("feed_kg")?,
        vaccination: row.try_get("vaccination")?,
        medicine: row.try_get("medicine")?,
        photo_url: row.try_get("photo_url")?,
        routing: routing_from_row(row)?,
        created_at: row.try_get("created_at")?,
    })
}

fn income_from_row(row: &PgRow) -> FarmResult<IncomeRecord> {
    let income_type: String = row.try_get("income_type")?;
    Ok(IncomeRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        owner_name: row.try_get("owner_name")?,
        farm_name: row.try_get("farm_name")?,
        income_type: income_type.parse()?,
        date: row.try_get("record_date")?,
        batch_id: row.try_get("batch_id")?,
        quantity: row.try_get("quantity")?,
        unit: row.try_get("unit")?,
        amount: row.try_get("amount")?,
        notes: row.try_get("notes")?,
        routing: routing_from_row(row)?,
        created_at: row.try_get("created_at")?,
    })
}

/// Loads a fortnight of realistic data for two producers, part of it routed to
/// `supervisor@flockledger.test`. Re-running is a no-op.
pub async fn seed(store: &PgRecordStore) -> FarmResult<usize> {
    let producers = [
        ("seed-amina", "Amina Okafor", "Green Acres", "LAYER-A", 1, 420_u32),
        ("seed-tomas", "Tomas Rivera", "Hillside Poultry", "FLOCK-7", 7, 310_u32),
    ];
    let supervisor = "supervisor@flockledger.test";
    let today = Utc::now().date_naive();
    let mut inserted = 0usize;

    for (owner_id, owner_name, farm_name, batch_id, batch_number, base_eggs) in producers {
        for offset in 0..14_i64 {
            let date = today - Duration::days(offset);
            let source_key = format!("seed-{owner_id}-{offset:02}");
            let jitter = u32::try_from((offset * 7) % 23).unwrap_or(0);
            let routing = if offset % 3 == 0 {
                RoutingState::routed_to(supervisor, Utc::now())
            } else {
                RoutingState::default()
            };

            let record = DailyRecord {
                id: Uuid::new_v4(),
                owner_id: owner_id.to_string(),
                owner_name: owner_name.to_string(),
                farm_name: farm_name.to_string(),
                batch_id: batch_id.to_string(),
                batch_number,
                date,
                egg_count: base_eggs - jitter,
                mortality: u32::from(offset % 5 == 0),
                feed: 38.5 + (offset as f64) * 0.25,
                vaccination: (offset == 7).then(|| "Newcastle booster".to_string()),
                medicine: (offset == 3).then(|| "Vitamin B complex".to_string()),
                photo_url: None,
                routing,
                created_at: Utc::now(),
            };

            inserted += store.insert_daily_keyed(&record, Some(&source_key)).await? as usize;
        }
    }

    let existing_income: i64 = sqlx::query(
        "SELECT COUNT(*) AS total FROM flock_ledger.income_records WHERE owner_id LIKE 'seed-%'",
    )
    .fetch_one(store.pool())
    .await?
    .try_get("total")?;

    if existing_income == 0 {
        let sales = [
            (
                "seed-amina",
                "Amina Okafor",
                "Green Acres",
                "LAYER-A",
                IncomeType::EggSale,
                40.0,
                "trays",
                180.0,
            ),
            (
                "seed-tomas",
                "Tomas Rivera",
                "Hillside Poultry",
                "FLOCK-7",
                IncomeType::MeatSale,
                25.0,
                "birds",
                312.5,
            ),
        ];
        for (owner_id, owner_name, farm_name, batch_id, income_type, quantity, unit, amount) in
            sales
        {
            let record = IncomeRecord {
                id: Uuid::new_v4(),
                owner_id: owner_id.to_string(),
                owner_name: owner_name.to_string(),
                farm_name: farm_name.to_string(),
                income_type,
                date: today - Duration::days(2),
                batch_id: batch_id.to_string(),
                quantity,
                unit: unit.to_string(),
                amount,
                notes: None,
                routing: RoutingState::routed_to(supervisor, Utc::now()),
                created_at: Utc::now(),
            };
            store.insert_income(&record).await?;
            inserted += 1;
        }
    }

    info!(inserted, "seed data loaded");
    Ok(inserted)
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    owner_id: String,
    owner_name: String,
    farm_name: String,
    batch_id: String,
    batch_number: i32,
    date: NaiveDate,
    egg_count: u32,
    mortality: u32,
    feed: f64,
    vaccination: Option<String>,
    medicine: Option<String>,
    source_key: Option<String>,
}

/// Checks one CSV row with the same rules as the entry form. `line` is the
/// 1-based file line, header included.
fn csv_record(row: CsvRow, line: usize) -> FarmResult<(DailyRecord, String)> {
    let entry = DailyEntry {
        batch_id: row.batch_id,
        batch_number: row.batch_number,
        date: row.date,
        egg_count: row.egg_count,
        mortality: row.mortality,
        feed: row.feed,
        vaccination: row.vaccination.filter(|v| !v.trim().is_empty()),
        medicine: row.medicine.filter(|v| !v.trim().is_empty()),
    };
    entry.validate().map_err(|err| match err {
        FarmError::Validation(message) => {
            FarmError::Validation(format!("line {line}: {message}"))
        }
        other => other,
    })?;
    if row.owner_id.trim().is_empty() {
        return Err(FarmError::Validation(format!("line {line}: owner id is required")));
    }

    let source_key = row
        .source_key
        .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
    let record = DailyRecord {
        id: Uuid::new_v4(),
        owner_id: row.owner_id,
        owner_name: row.owner_name,
        farm_name: row.farm_name,
        batch_id: entry.batch_id.trim().to_string(),
        batch_number: entry.batch_number,
        date: entry.date,
        egg_count: entry.egg_count,
        mortality: entry.mortality,
        feed: entry.feed,
        vaccination: entry.vaccination,
        medicine: entry.medicine,
        photo_url: None,
        routing: RoutingState::default(),
        created_at: Utc::now(),
    };
    Ok((record, source_key))
}

/// Imports daily records from a CSV export. Rows carrying a `source_key` that was
/// already imported are skipped. The first invalid row stops the import with a
/// `Validation` error naming its line; rows before it stay imported.
pub async fn import_csv(store: &PgRecordStore, csv_path: &std::path::Path) -> FarmResult<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let (record, source_key) = csv_record(result?, index + 2)?;
        if store.insert_daily_keyed(&record, Some(&source_key)).await? > 0 {
            inserted += 1;
        }
    }

    info!(inserted, path = %csv_path.display(), "csv import finished");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "owner_id,owner_name,farm_name,batch_id,batch_number,date,egg_count,\
mortality,feed,vaccination,medicine,source_key";

    fn rows(body: &str) -> Vec<CsvRow> {
        let text = format!("{HEADER}\n{body}");
        csv::Reader::from_reader(text.as_bytes())
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn valid_row_becomes_an_unrouted_record() {
        let mut parsed = rows("u-1,Ada,Sunrise,B1,2,2024-01-10,50,1,12.5,,Vit B,k-1\n");
        let (record, key) = csv_record(parsed.remove(0), 2).unwrap();

        assert_eq!(key, "k-1");
        assert_eq!(record.batch_id, "B1");
        assert_eq!(record.egg_count, 50);
        assert_eq!(record.vaccination, None);
        assert_eq!(record.medicine.as_deref(), Some("Vit B"));
        assert!(!record.routing.routed);
    }

    #[test]
    fn blank_batch_is_rejected_with_its_line() {
        let mut parsed = rows(
            "u-1,Ada,Sunrise,B1,1,2024-01-10,50,1,12.5,,,\n\
             u-1,Ada,Sunrise,  ,1,2024-01-11,40,0,11.0,,,\n",
        );
        assert!(csv_record(parsed.remove(0), 2).is_ok());

        let err = csv_record(parsed.remove(0), 3).unwrap_err();
        match err {
            FarmError::Validation(message) => {
                assert!(message.starts_with("line 3:"), "{message}");
                assert!(message.contains("batch id"), "{message}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn negative_feed_is_rejected() {
        let mut parsed = rows("u-1,Ada,Sunrise,B1,1,2024-01-10,50,1,-3.0,,,\n");
        let err = csv_record(parsed.remove(0), 2).unwrap_err();
        let FarmError::Validation(message) = &err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(message.starts_with("line 2:"), "{message}");
        assert!(message.contains("feed"), "{message}");
    }
}
