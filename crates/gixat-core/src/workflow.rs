//! Workflow rules for sessions, job cards and comments
//!
//! These are pure functions over the domain models. Stores call them inside
//! their transactions so the rules hold no matter which backend runs them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{
    GarageSession, JobCardStatus, JobItem, JobItemStatus, JobItemStatusUpdate, SessionStatus,
    MAX_COMMENT_LENGTH,
};
use crate::{Error, Result};

/// A status change triggered as a side effect of saving a workflow stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: SessionStatus,
    pub note: &'static str,
}

pub const INTAKE_COMPLETED_NOTE: &str = "Intake completed, moved to Inspection";
pub const INSPECTION_COMPLETED_NOTE: &str = "Inspection completed, moved to Test Drive";
pub const INITIAL_REPORT_NOTE: &str = "Initial report generated";
pub const JOB_CARD_CREATED_NOTE: &str = "Job card created";

/// Saving intake data advances a session that is still at `Intake`
pub fn after_intake(current: SessionStatus) -> Option<Transition> {
    (current == SessionStatus::Intake).then_some(Transition {
        to: SessionStatus::Inspection,
        note: INTAKE_COMPLETED_NOTE,
    })
}

/// Saving inspection data advances a session that is still at `Inspection`
pub fn after_inspection(current: SessionStatus) -> Option<Transition> {
    (current == SessionStatus::Inspection).then_some(Transition {
        to: SessionStatus::TestDrive,
        note: INSPECTION_COMPLETED_NOTE,
    })
}

pub fn active_session_exists(session_id: Uuid, status: SessionStatus) -> Error {
    Error::rule(
        "ActiveSessionExists",
        format!(
            "Cannot create a new session. There is already an active session (ID: {}) for this car with status: {}",
            session_id, status
        ),
    )
}

pub fn ensure_job_card_source(status: SessionStatus) -> Result<()> {
    if status == SessionStatus::ReportGenerated {
        Ok(())
    } else {
        Err(Error::rule(
            "InvalidSessionStatus",
            "Can only create job card from sessions with ReportGenerated status",
        ))
    }
}

/// Format an integer with `,` thousands separators
pub fn format_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Internal notes for a job card created from `session`
pub fn job_card_notes(session: &GarageSession) -> String {
    let mut notes = format!("Created from Session {}\n", session.id);

    if let Some(mileage) = session.mileage {
        notes.push_str(&format!("Mileage: {} km\n", format_thousands(mileage.into())));
    }

    let sections = [
        ("Customer Requests", &session.customer_requests),
        ("Inspection Notes", &session.inspection_notes),
        ("Inspection Requests", &session.inspection_requests),
        ("Test Drive Notes", &session.test_drive_notes),
        ("Test Drive Requests", &session.test_drive_requests),
        ("Initial Report", &session.initial_report),
    ];
    for (title, content) in sections {
        if let Some(content) = content.as_deref().filter(|c| !c.is_empty()) {
            notes.push_str(&format!("\n{}:\n{}\n", title, content));
        }
    }

    notes
}

const REQUEST_PREFIXES: &[char] = &['-', '*', '•', '·'];

/// Job item descriptions extracted from the request fields of `session`,
/// one per non-empty line, bullet markers removed
pub fn extract_job_items(session: &GarageSession) -> Vec<String> {
    [
        &session.customer_requests,
        &session.inspection_requests,
        &session.test_drive_requests,
    ]
    .into_iter()
    .flatten()
    .flat_map(|text| text.split('\n'))
    .map(|line| line.trim().trim_start_matches(REQUEST_PREFIXES).trim())
    .filter(|line| !line.is_empty())
    .map(str::to_string)
    .collect()
}

/// Check an item status change against the item's current state
pub fn validate_item_status_change(item: &JobItem, update: &JobItemStatusUpdate) -> Result<()> {
    match update.status {
        JobItemStatus::Completed
            if update.actual_labor_cost.is_zero() && update.actual_parts_cost.is_zero() =>
        {
            Err(Error::rule(
                "MissingActualCosts",
                "Cannot mark item as completed without actual costs",
            ))
        }
        JobItemStatus::InProgress if !item.is_approved_by_customer => Err(Error::rule(
            "ItemNotApproved",
            "Cannot start work on unapproved item",
        )),
        _ => Ok(()),
    }
}

/// A card can only be completed once none of its items are open
pub fn ensure_job_card_status_change(status: JobCardStatus, open_items: usize) -> Result<()> {
    if status == JobCardStatus::Completed && open_items > 0 {
        return Err(Error::rule(
            "OpenItemsRemaining",
            format!(
                "Cannot complete job card. {} item(s) are still pending or in progress.",
                open_items
            ),
        ));
    }
    Ok(())
}

/// Trimmed comment body, or a validation error
pub fn validate_comment_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRequest(
            "Comment content cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_COMMENT_LENGTH {
        return Err(Error::InvalidRequest(format!(
            "Comment content cannot exceed {} characters",
            MAX_COMMENT_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

static MENTION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").unwrap());

/// Lower-cased `@handle` tokens in a comment
pub fn extract_mentions(content: &str) -> HashSet<String> {
    MENTION_PATTERN
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Whether a user with `email` is addressed by any of `handles`
pub fn mention_matches(handles: &HashSet<String>, email: &str) -> bool {
    let email = email.to_lowercase();
    let local = email.split('@').next().unwrap_or_default();
    handles.contains(local) || handles.contains(&email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn session() -> GarageSession {
        let now = Utc::now();
        GarageSession {
            id: Uuid::nil(),
            organization_id: Uuid::new_v4(),
            car_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            status: SessionStatus::ReportGenerated,
            mileage: None,
            customer_requests: None,
            intake_notes: None,
            intake_requests: None,
            inspection_notes: None,
            inspection_requests: None,
            test_drive_notes: None,
            test_drive_requests: None,
            initial_report: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(approved: bool) -> JobItem {
        let now = Utc::now();
        JobItem {
            id: Uuid::new_v4(),
            job_card_id: Uuid::new_v4(),
            assigned_technician_id: None,
            description: "Replace pads".into(),
            status: JobItemStatus::Pending,
            estimated_labor_cost: Decimal::ZERO,
            estimated_parts_cost: Decimal::ZERO,
            estimated_cost: Decimal::ZERO,
            actual_labor_cost: Decimal::ZERO,
            actual_parts_cost: Decimal::ZERO,
            actual_cost: Decimal::ZERO,
            is_approved_by_customer: approved,
            approved_at: None,
            technician_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_stage_transitions() {
        assert_eq!(
            after_intake(SessionStatus::Intake).map(|t| t.to),
            Some(SessionStatus::Inspection)
        );
        assert_eq!(after_intake(SessionStatus::Inspection), None);
        assert_eq!(
            after_inspection(SessionStatus::Inspection).map(|t| t.note),
            Some(INSPECTION_COMPLETED_NOTE)
        );
        assert_eq!(after_inspection(SessionStatus::TestDrive), None);
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(45210), "45,210");
        assert_eq!(format_thousands(1234567), "1,234,567");
        assert_eq!(format_thousands(-1000), "-1,000");
    }

    #[test]
    fn test_job_card_notes_layout() {
        let mut s = session();
        s.mileage = Some(45210);
        s.customer_requests = Some("Oil change".into());
        s.test_drive_notes = Some("Pulls left".into());
        s.inspection_notes = Some(String::new());

        let notes = job_card_notes(&s);
        assert_eq!(
            notes,
            format!(
                "Created from Session {}\nMileage: 45,210 km\n\nCustomer Requests:\nOil change\n\nTest Drive Notes:\nPulls left\n",
                Uuid::nil()
            )
        );
    }

    #[test]
    fn test_extract_job_items_strips_bullets() {
        let mut s = session();
        s.customer_requests = Some("- Oil change\n\n* Check brakes\r\n".into());
        s.inspection_requests = Some("• Replace wiper blades\n · ".into());
        s.test_drive_requests = Some("Align wheels".into());

        assert_eq!(
            extract_job_items(&s),
            vec![
                "Oil change",
                "Check brakes",
                "Replace wiper blades",
                "Align wheels"
            ]
        );
    }

    #[test]
    fn test_job_card_source_must_be_report_generated() {
        assert!(ensure_job_card_source(SessionStatus::ReportGenerated).is_ok());
        let err = ensure_job_card_source(SessionStatus::TestDrive).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can only create job card from sessions with ReportGenerated status"
        );
    }

    #[test]
    fn test_item_status_rules() {
        let complete_without_costs = JobItemStatusUpdate {
            status: JobItemStatus::Completed,
            actual_labor_cost: Decimal::ZERO,
            actual_parts_cost: Decimal::ZERO,
            technician_notes: None,
        };
        let err = validate_item_status_change(&item(true), &complete_without_costs).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot mark item as completed without actual costs"
        );

        let start = JobItemStatusUpdate {
            status: JobItemStatus::InProgress,
            ..complete_without_costs.clone()
        };
        assert!(validate_item_status_change(&item(false), &start).is_err());
        assert!(validate_item_status_change(&item(true), &start).is_ok());
    }

    #[test]
    fn test_job_card_completion_requires_closed_items() {
        let err = ensure_job_card_status_change(JobCardStatus::Completed, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot complete job card. 2 item(s) are still pending or in progress."
        );
        assert!(ensure_job_card_status_change(JobCardStatus::Completed, 0).is_ok());
        assert!(ensure_job_card_status_change(JobCardStatus::InProgress, 3).is_ok());
    }

    #[test]
    fn test_comment_validation() {
        assert_eq!(validate_comment_content("  hi ").unwrap(), "hi");
        assert_eq!(
            validate_comment_content("   ").unwrap_err().to_string(),
            "Comment content cannot be empty"
        );
        assert!(validate_comment_content(&"x".repeat(5001)).is_err());
    }

    #[test]
    fn test_mentions() {
        let handles = extract_mentions("Thanks @Sam and @lee_k, see @sam");
        assert_eq!(handles.len(), 2);
        assert!(mention_matches(&handles, "SAM@garage.test"));
        assert!(mention_matches(&handles, "lee_k@garage.test"));
        assert!(!mention_matches(&handles, "samantha@garage.test"));
    }
}
