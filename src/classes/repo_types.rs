use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle status of a class offering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "class_status", rename_all = "lowercase")]
pub enum ClassStatus {
    Pending,
    Approved,
    #[serde(rename = "deny")]
    #[sqlx(rename = "deny")]
    Denied,
}

impl ClassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassStatus::Pending => "pending",
            ClassStatus::Approved => "approved",
            ClassStatus::Denied => "deny",
        }
    }

    /// Checks a status change requested by an admin.
    ///
    /// Only pending classes move, and only to approved or deny. Re-applying
    /// the current status is accepted so the call stays idempotent.
    pub fn transition(self, to: ClassStatus) -> Result<ClassStatus, String> {
        match (self, to) {
            (_, ClassStatus::Pending) => Err("a class cannot be moved back to pending".into()),
            (from, to) if from == to => Ok(to),
            (ClassStatus::Pending, to) => Ok(to),
            (from, to) => Err(format!(
                "cannot change class status from {} to {}",
                from.as_str(),
                to.as_str()
            )),
        }
    }
}

impl fmt::Display for ClassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClassStatus::Pending),
            "approved" => Ok(ClassStatus::Approved),
            "deny" => Ok(ClassStatus::Denied),
            other => Err(format!("unknown class status: {other}")),
        }
    }
}

/// Class record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClassOffering {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub instructor_name: Option<String>,
    pub instructor_email: String,
    pub available_seats: i32,
    pub enrolled: i32,
    pub price: Decimal,
    pub status: ClassStatus,
    pub feedback: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub image_url: Option<String>,
    pub instructor_name: Option<String>,
    pub instructor_email: String,
    pub available_seats: i32,
    pub price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_moves_to_approved_or_deny() {
        assert_eq!(
            ClassStatus::Pending.transition(ClassStatus::Approved),
            Ok(ClassStatus::Approved)
        );
        assert_eq!(
            ClassStatus::Pending.transition(ClassStatus::Denied),
            Ok(ClassStatus::Denied)
        );
    }

    #[test]
    fn repeated_transition_is_idempotent() {
        assert_eq!(
            ClassStatus::Approved.transition(ClassStatus::Approved),
            Ok(ClassStatus::Approved)
        );
        assert_eq!(
            ClassStatus::Denied.transition(ClassStatus::Denied),
            Ok(ClassStatus::Denied)
        );
    }

    #[test]
    fn terminal_states_do_not_move() {
        assert!(ClassStatus::Approved.transition(ClassStatus::Denied).is_err());
        assert!(ClassStatus::Denied.transition(ClassStatus::Approved).is_err());
        assert!(ClassStatus::Approved.transition(ClassStatus::Pending).is_err());
        assert!(ClassStatus::Pending.transition(ClassStatus::Pending).is_err());
    }

    #[test]
    fn status_parses_wire_names() {
        assert_eq!("deny".parse::<ClassStatus>(), Ok(ClassStatus::Denied));
        assert_eq!("approved".parse::<ClassStatus>(), Ok(ClassStatus::Approved));
        assert!("bogus".parse::<ClassStatus>().is_err());
        assert!("denied".parse::<ClassStatus>().is_err());
        assert_eq!(serde_json::to_string(&ClassStatus::Denied).unwrap(), "\"deny\"");
    }
}
