use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FarmError, FarmResult};

/// Which collection a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Daily,
    Income,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Daily => "daily",
            RecordKind::Income => "income",
        }
    }
}

/// Sharing state of a record. Only these fields change after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingState {
    pub routed: bool,
    pub routed_to_email: Option<String>,
    pub routed_at: Option<DateTime<Utc>>,
}

impl RoutingState {
    pub fn routed_to(email: &str, at: DateTime<Utc>) -> Self {
        Self {
            routed: true,
            routed_to_email: Some(email.to_string()),
            routed_at: Some(at),
        }
    }

    pub fn is_routed_to(&self, email: &str) -> bool {
        self.routed && self.routed_to_email.as_deref() == Some(email)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub owner_name: String,
    pub farm_name: String,
    pub batch_id: String,
    pub batch_number: i32,
    pub date: NaiveDate,
    pub egg_count: u32,
    pub mortality: u32,
    /// Kilograms.
    pub feed: f64,
    pub vaccination: Option<String>,
    pub medicine: Option<String>,
    pub photo_url: Option<String>,
    pub routing: RoutingState,
    pub created_at: DateTime<Utc>,
}

impl DailyRecord {
    pub fn new(profile: &Profile, entry: DailyEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: profile.uid.clone(),
            owner_name: profile.full_name.clone(),
            farm_name: profile.farm_name.clone(),
            batch_id: entry.batch_id,
            batch_number: entry.batch_number,
            date: entry.date,
            egg_count: entry.egg_count,
            mortality: entry.mortality,
            feed: entry.feed,
            vaccination: non_blank(entry.vaccination),
            medicine: non_blank(entry.medicine),
            photo_url: None,
            routing: RoutingState::default(),
            created_at,
        }
    }

    pub fn has_vaccination(&self) -> bool {
        self.vaccination.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    pub fn has_medicine(&self) -> bool {
        self.medicine.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncomeType {
    EggSale,
    MeatSale,
}

impl IncomeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncomeType::EggSale => "egg_sale",
            IncomeType::MeatSale => "meat_sale",
        }
    }
}

impl fmt::Display for IncomeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncomeType::EggSale => write!(f, "Egg Sale"),
            IncomeType::MeatSale => write!(f, "Meat Sale"),
        }
    }
}

impl FromStr for IncomeType {
    type Err = FarmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "egg_sale" | "eggsale" | "eggs" => Ok(IncomeType::EggSale),
            "meat_sale" | "meatsale" | "meat" => Ok(IncomeType::MeatSale),
            other => Err(FarmError::Validation(format!("unknown income type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub owner_name: String,
    pub farm_name: String,
    pub income_type: IncomeType,
    pub date: NaiveDate,
    pub batch_id: String,
    pub quantity: f64,
    pub unit: String,
    pub amount: f64,
    pub notes: Option<String>,
    pub routing: RoutingState,
    pub created_at: DateTime<Utc>,
}

impl IncomeRecord {
    pub fn new(profile: &Profile, entry: IncomeEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: profile.uid.clone(),
            owner_name: profile.full_name.clone(),
            farm_name: profile.farm_name.clone(),
            income_type: entry.income_type,
            date: entry.date,
            batch_id: entry.batch_id,
            quantity: entry.quantity,
            unit: entry.unit,
            amount: entry.amount,
            notes: non_blank(entry.notes),
            routing: RoutingState::default(),
            created_at,
        }
    }
}

/// Form input for a new daily record.
#[derive(Debug, Clone, Deserialize)]
pub struct DailyEntry {
    pub batch_id: String,
    pub batch_number: i32,
    pub date: NaiveDate,
    pub egg_count: u32,
    pub mortality: u32,
    pub feed: f64,
    pub vaccination: Option<String>,
    pub medicine: Option<String>,
}

impl DailyEntry {
    pub fn validate(&self) -> FarmResult<()> {
        if self.batch_id.trim().is_empty() {
            return Err(FarmError::Validation("batch id is required".to_string()));
        }
        if !self.feed.is_finite() || self.feed < 0.0 {
            return Err(FarmError::Validation(format!(
                "feed must be a non-negative amount, got {}",
                self.feed
            )));
        }
        Ok(())
    }
}

/// Form input for a new income record.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomeEntry {
    pub income_type: IncomeType,
    pub date: NaiveDate,
    pub batch_id: String,
    pub quantity: f64,
    pub unit: String,
    pub amount: f64,
    pub notes: Option<String>,
}

impl IncomeEntry {
    pub fn validate(&self) -> FarmResult<()> {
        if self.batch_id.trim().is_empty() {
            return Err(FarmError::Validation("batch id is required".to_string()));
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(FarmError::Validation(format!(
                "quantity must be non-negative, got {}",
                self.quantity
            )));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(FarmError::Validation(format!(
                "amount must be non-negative, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Identity of a signed-in producer, as provided by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub uid: String,
    pub full_name: String,
    pub farm_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    /// Sees every record they own.
    Producer { owner_id: String },
    /// Sees records routed to this exact email.
    Supervisor { email: String },
}

impl Viewer {
    pub fn producer(owner_id: impl Into<String>) -> Self {
        Viewer::Producer {
            owner_id: owner_id.into(),
        }
    }

    pub fn supervisor(email: impl Into<String>) -> Self {
        Viewer::Supervisor {
            email: email.into(),
        }
    }
}

/// Accessors shared by both record kinds so routing, filtering and grouping stay generic.
pub trait FarmRecord: Clone + Send + Sync {
    const KIND: RecordKind;

    fn id(&self) -> Uuid;
    fn owner_id(&self) -> &str;
    fn owner_name(&self) -> &str;
    fn farm_name(&self) -> &str;
    fn batch_id(&self) -> &str;
    fn date(&self) -> NaiveDate;
    fn routing(&self) -> &RoutingState;
    fn routing_mut(&mut self) -> &mut RoutingState;
}

impl FarmRecord for DailyRecord {
    const KIND: RecordKind = RecordKind::Daily;

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
    fn owner_name(&self) -> &str {
        &self.owner_name
    }
    fn farm_name(&self) -> &str {
        &self.farm_name
    }
    fn batch_id(&self) -> &str {
        &self.batch_id
    }
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn routing(&self) -> &RoutingState {
        &self.routing
    }
    fn routing_mut(&mut self) -> &mut RoutingState {
        &mut self.routing
    }
}

impl FarmRecord for IncomeRecord {
    const KIND: RecordKind = RecordKind::Income;

    fn id(&self) -> Uuid {
        self.id
    }
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
    fn owner_name(&self) -> &str {
        &self.owner_name
    }
    fn farm_name(&self) -> &str {
        &self.farm_name
    }
    fn batch_id(&self) -> &str {
        &self.batch_id
    }
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn routing(&self) -> &RoutingState {
        &self.routing
    }
    fn routing_mut(&mut self) -> &mut RoutingState {
        &mut self.routing
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            uid: "u-1".to_string(),
            full_name: "Amina Okafor".to_string(),
            farm_name: "Green Acres".to_string(),
            email: "amina@example.com".to_string(),
        }
    }

    #[test]
    fn new_daily_record_starts_unrouted() {
        let entry = DailyEntry {
            batch_id: "B1".to_string(),
            batch_number: 1,
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            egg_count: 50,
            mortality: 2,
            feed: 12.5,
            vaccination: Some("  ".to_string()),
            medicine: Some("Amprolium".to_string()),
        };
        let record = DailyRecord::new(&profile(), entry, Utc::now());

        assert_eq!(record.owner_id, "u-1");
        assert!(!record.routing.routed);
        assert!(record.routing.routed_to_email.is_none());
        assert!(!record.has_vaccination());
        assert!(record.has_medicine());
    }

    #[test]
    fn income_type_parses_loose_spellings() {
        assert_eq!("Egg Sale".parse::<IncomeType>().unwrap(), IncomeType::EggSale);
        assert_eq!("meat-sale".parse::<IncomeType>().unwrap(), IncomeType::MeatSale);
        assert!("feed".parse::<IncomeType>().is_err());
    }

    #[test]
    fn entries_reject_negative_amounts() {
        let entry = IncomeEntry {
            income_type: IncomeType::EggSale,
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            batch_id: "B1".to_string(),
            quantity: 30.0,
            unit: "trays".to_string(),
            amount: -1.0,
            notes: None,
        };
        assert!(matches!(entry.validate(), Err(FarmError::Validation(_))));
    }

    #[test]
    fn routing_match_requires_active_flag() {
        let mut state = RoutingState::routed_to("sup@example.com", Utc::now());
        assert!(state.is_routed_to("sup@example.com"));
        assert!(!state.is_routed_to("SUP@example.com"));
        state.routed = false;
        assert!(!state.is_routed_to("sup@example.com"));
    }
}
