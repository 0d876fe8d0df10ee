//! Selection predicates composed against the catalog.
//!
//! Every query is a conjunction of [`Clause`]s. [`Selection`] names the
//! predicates a run uses and turns them into a [`CatalogQuery`] for a given
//! catalog and day.

use super::fields::{self, PreservationStatus};
use crate::error::{KeepsakeError, Result};
use crate::validation::ValidationTier;
use chrono::{Days, NaiveDate};
use std::fmt;

/// One field predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// Field value equals the given value
    Equals(&'static str, String),
    /// Field value equals one of the given values
    OneOf(&'static str, Vec<String>),
    /// Field value contains the given value
    Contains(&'static str, String),
    /// Field holds a non-empty value
    HasValue(&'static str),
    /// Field is absent or empty
    HasNoValue(&'static str),
    /// Field holds a date strictly before the given day
    Before(&'static str, NaiveDate),
    /// Field holds a date strictly after the given day
    After(&'static str, NaiveDate),
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(field, value) => write!(f, "'{field}' = '{value}'"),
            Self::OneOf(field, values) => write!(f, "'{field}' in ('{}')", values.join("', '")),
            Self::Contains(field, value) => write!(f, "'{field}' contains '{value}'"),
            Self::HasValue(field) => write!(f, "'{field}' has value"),
            Self::HasNoValue(field) => write!(f, "'{field}' has no value"),
            Self::Before(field, day) => write!(f, "'{field}' before {day}"),
            Self::After(field, day) => write!(f, "'{field}' after {day}"),
        }
    }
}

/// A conjunction of clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub clauses: Vec<Clause>,
}

impl CatalogQuery {
    /// The catalog name this query is restricted to, if any.
    pub fn catalog_name(&self) -> Option<&str> {
        self.clauses.iter().find_map(|clause| match clause {
            Clause::Equals(field, value) if *field == fields::CATALOG_NAME => Some(value.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for CatalogQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" AND "))
    }
}

/// The record selections a run can ask the catalog for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Records waiting for preservation, including those whose last attempt failed
    ReadyForArchival,
    /// Every preserved record of the catalog
    AllInCatalog,
    /// The record(s) whose GUID contains the given id
    SpecificUuid(String),
    /// Preserved records modified within the last `days` days
    UpdatePending { days: u32 },
    /// Ready records that have sub-assets
    MasterAssetSubset,
    /// Ready records that are sub-assets and not masters themselves
    SubAssetSubset,
    /// Records queued for the given validation tier
    ValidationPending(ValidationTier),
}

impl Selection {
    /// Build the query for `catalog_name` as of `today`.
    ///
    /// # Errors
    ///
    /// Returns [`KeepsakeError::Argument`] for an empty catalog name, an empty
    /// UUID or a zero-day update window.
    pub fn query(&self, catalog_name: &str, today: NaiveDate) -> Result<CatalogQuery> {
        if catalog_name.trim().is_empty() {
            return Err(KeepsakeError::Argument(
                "catalog name must not be empty".to_owned(),
            ));
        }

        let mut clauses = Vec::new();

        match self {
            Self::ReadyForArchival => {
                clauses.push(pending_archival());
            }
            Self::AllInCatalog => {
                clauses.push(status_is(PreservationStatus::ArchivalCompleted));
            }
            Self::SpecificUuid(uuid) => {
                if uuid.trim().is_empty() {
                    return Err(KeepsakeError::Argument("UUID must not be empty".to_owned()));
                }
                clauses.push(Clause::Contains(fields::GUID, uuid.trim().to_owned()));
            }
            Self::UpdatePending { days } => {
                if *days == 0 {
                    return Err(KeepsakeError::Argument(
                        "update window must be at least one day".to_owned(),
                    ));
                }
                let cutoff = today
                    .checked_sub_days(Days::new(u64::from(*days)))
                    .ok_or_else(|| {
                        KeepsakeError::Argument(format!("update window of {days} days is out of range"))
                    })?;
                clauses.push(status_is(PreservationStatus::ArchivalCompleted));
                clauses.push(Clause::Before(fields::PRESERVATION_DATE, cutoff));
                clauses.push(Clause::After(fields::LAST_MODIFIED, cutoff));
            }
            Self::MasterAssetSubset => {
                clauses.push(pending_archival());
                clauses.push(Clause::HasValue(fields::RELATED_SUB_ASSETS));
            }
            Self::SubAssetSubset => {
                clauses.push(pending_archival());
                clauses.push(Clause::HasValue(fields::RELATED_MASTER_ASSETS));
                clauses.push(Clause::HasNoValue(fields::RELATED_SUB_ASSETS));
            }
            Self::ValidationPending(tier) => {
                clauses.push(Clause::Equals(
                    fields::VALIDATION_STATUS,
                    tier.pending_status().as_str().to_owned(),
                ));
            }
        }

        clauses.push(Clause::Equals(
            fields::REGISTRATION_STATE,
            fields::REGISTRATION_FINISHED.to_owned(),
        ));
        clauses.push(Clause::Equals(fields::CATALOG_NAME, catalog_name.to_owned()));

        Ok(CatalogQuery { clauses })
    }
}

fn status_is(status: PreservationStatus) -> Clause {
    Clause::Equals(fields::PRESERVATION_STATUS, status.as_str().to_owned())
}

/// Failed records stay selectable so the next run retries them.
fn pending_archival() -> Clause {
    Clause::OneOf(
        fields::PRESERVATION_STATUS,
        vec![
            PreservationStatus::ReadyForArchival.as_str().to_owned(),
            PreservationStatus::ArchivalFailed.as_str().to_owned(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    }

    #[test]
    fn test_ready_for_archival_clauses() {
        let query = Selection::ReadyForArchival.query("Conservation", today()).unwrap();

        assert_eq!(query.clauses.len(), 3);
        assert!(query.clauses.contains(&Clause::OneOf(
            fields::PRESERVATION_STATUS,
            vec!["Ready for archival".to_owned(), "Archival failed".to_owned()]
        )));
        assert_eq!(query.catalog_name(), Some("Conservation"));
    }

    #[test]
    fn test_update_pending_cutoff() {
        let query = Selection::UpdatePending { days: 30 }
            .query("Conservation", today())
            .unwrap();
        let cutoff = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        assert!(query.clauses.contains(&Clause::Before(fields::PRESERVATION_DATE, cutoff)));
        assert!(query.clauses.contains(&Clause::After(fields::LAST_MODIFIED, cutoff)));
    }

    #[test]
    fn test_sub_asset_subset_excludes_masters() {
        let query = Selection::SubAssetSubset.query("Conservation", today()).unwrap();

        assert!(query.clauses.contains(&Clause::HasValue(fields::RELATED_MASTER_ASSETS)));
        assert!(query.clauses.contains(&Clause::HasNoValue(fields::RELATED_SUB_ASSETS)));
    }

    #[test]
    fn test_validation_pending_token() {
        let query = Selection::ValidationPending(ValidationTier::Full)
            .query("Conservation", today())
            .unwrap();

        assert!(query.clauses.contains(&Clause::Equals(
            fields::VALIDATION_STATUS,
            "Full check".to_owned()
        )));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(Selection::ReadyForArchival.query(" ", today()).unwrap_err().is_fatal());
        assert!(
            Selection::SpecificUuid(String::new())
                .query("Conservation", today())
                .is_err()
        );
        assert!(
            Selection::UpdatePending { days: 0 }
                .query("Conservation", today())
                .is_err()
        );
    }

    #[test]
    fn test_query_display() {
        let query = Selection::SpecificUuid("abc".to_owned())
            .query("Conservation", today())
            .unwrap();
        assert_eq!(
            query.to_string(),
            "'GUID' contains 'abc' AND 'Registration State' = 'Finished' AND 'Catalog Name' = 'Conservation'"
        );
    }
}
