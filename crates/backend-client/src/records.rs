//! Typed records for the application's tables

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::remote::Row;

/// A record stored in a named backend table
pub trait Table: Serialize + DeserializeOwned + Send + Sync {
    /// Backend table name
    const TABLE: &'static str;

    /// Primary key
    fn id(&self) -> &str;

    /// Convert into a row
    fn to_row(&self) -> Result<Row, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(row) => Ok(row),
            _ => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "{} record did not serialize to an object",
                Self::TABLE
            ))),
        }
    }

    /// Decode from a row
    fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(row))
    }
}

/// A customer of the inspection company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Primary key
    pub id: String,
    /// Company or person name
    pub name: String,
    /// Organisation number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_number: Option<String>,
    /// Contact person
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    /// Contact email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Postal address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Creation time, set by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Customer {
    /// Create a customer with only the required fields
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            org_number: None,
            contact_person: None,
            email: None,
            phone: None,
            address: None,
            created_at: None,
        }
    }
}

impl Table for Customer {
    const TABLE: &'static str = "customer";

    fn id(&self) -> &str {
        &self.id
    }
}

/// A facility ("anlegg") with fire-safety installations to inspect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    /// Primary key
    pub id: String,
    /// Owning customer
    pub customer_id: String,
    /// Facility name
    pub name: String,
    /// Street address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Installed system (e.g. "sprinkler", "fire alarm")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_type: Option<String>,
    /// Date of the most recent inspection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_inspection: Option<NaiveDate>,
    /// Date the next inspection is due
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_inspection: Option<NaiveDate>,
}

impl Facility {
    /// Create a facility with only the required fields
    pub fn new(
        id: impl Into<String>,
        customer_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            name: name.into(),
            address: None,
            system_type: None,
            last_inspection: None,
            next_inspection: None,
        }
    }
}

impl Table for Facility {
    const TABLE: &'static str = "anlegg";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Lifecycle of a scheduled inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    /// Scheduled, not started
    Planned,
    /// Technician on site
    InProgress,
    /// Report delivered
    Completed,
    /// Called off
    Cancelled,
}

/// A scheduled inspection of a facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    /// Primary key
    pub id: String,
    /// Inspected facility
    pub facility_id: String,
    /// Scheduled date
    pub scheduled_for: NaiveDate,
    /// Current status
    pub status: InspectionStatus,
    /// Assigned technician
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector: Option<String>,
    /// Free-text notes from the visit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Table for Inspection {
    const TABLE: &'static str = "inspection";

    fn id(&self) -> &str {
        &self.id
    }
}
