use std::path::PathBuf;

use crate::error::{FarmError, FarmResult};
use crate::layout::PageGeometry;

pub const DEFAULT_REPORT_LABEL: &str = "Poultry_Report";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub photo_dir: PathBuf,
    pub report_label: String,
    pub page: PageGeometry,
}

impl Config {
    pub fn from_env() -> FarmResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> FarmResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PageGeometry::default();
        let page = PageGeometry {
            page_height: number(&lookup, "FLOCK_PAGE_HEIGHT", defaults.page_height)?,
            row_height: number(&lookup, "FLOCK_ROW_HEIGHT", defaults.row_height)?,
            header_height: number(&lookup, "FLOCK_HEADER_HEIGHT", defaults.header_height)?,
            footer_margin: number(&lookup, "FLOCK_FOOTER_MARGIN", defaults.footer_margin)?,
            top_margin: number(&lookup, "FLOCK_TOP_MARGIN", defaults.top_margin)?,
        };
        page.validate()?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|value| !value.trim().is_empty()),
            photo_dir: lookup("FLOCK_PHOTO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("photos")),
            report_label: lookup("FLOCK_REPORT_LABEL")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REPORT_LABEL.to_string()),
            page,
        })
    }

    pub fn require_database_url(&self) -> FarmResult<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            FarmError::Validation(
                "DATABASE_URL must be set to a production Postgres instance".to_string(),
            )
        })
    }
}

fn number<F>(lookup: &F, key: &str, default: f32) -> FarmResult<f32>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f32>()
            .map_err(|_| FarmError::Validation(format!("{key} must be a number, got '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.page, PageGeometry::default());
        assert_eq!(config.report_label, DEFAULT_REPORT_LABEL);
        assert_eq!(config.photo_dir, PathBuf::from("photos"));
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/flock"),
            ("FLOCK_PAGE_HEIGHT", "279.4"),
            ("FLOCK_REPORT_LABEL", "Weekly_Flock"),
        ]))
        .unwrap();
        assert_eq!(config.require_database_url().unwrap(), "postgres://localhost/flock");
        assert!((config.page.page_height - 279.4).abs() < 1e-4);
        assert_eq!(config.report_label, "Weekly_Flock");
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = Config::from_lookup(lookup(&[("FLOCK_ROW_HEIGHT", "tall")])).unwrap_err();
        assert!(err.to_string().contains("FLOCK_ROW_HEIGHT"));
    }
}
