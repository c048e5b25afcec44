//! Issue (request) model with comments.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::filter::WhereClause;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssuePriority {
    Urgent,
    High,
    Medium,
    Low,
    Minor,
}

impl IssuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuePriority::Urgent => "URGENT",
            IssuePriority::High => "HIGH",
            IssuePriority::Medium => "MEDIUM",
            IssuePriority::Low => "LOW",
            IssuePriority::Minor => "MINOR",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "URGENT" => IssuePriority::Urgent,
            "HIGH" => IssuePriority::High,
            "LOW" => IssuePriority::Low,
            "MINOR" => IssuePriority::Minor,
            _ => IssuePriority::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueStatus {
    Open,
    InProgress,
    Closed,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "OPEN",
            IssueStatus::InProgress => "IN_PROGRESS",
            IssueStatus::Closed => "CLOSED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "IN_PROGRESS" => IssueStatus::InProgress,
            "CLOSED" => IssueStatus::Closed,
            _ => IssueStatus::Open,
        }
    }
}

/// Issue joined with creator and sales representative names.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Issue {
    pub id: i64,
    pub uuid: String,
    pub document_no: String,
    pub subject: String,
    pub summary: Option<String>,
    pub priority: String,
    pub status: String,
    pub created_by: i64,
    pub created_by_name: Option<String>,
    pub sales_representative_id: Option<i64>,
    pub sales_representative_name: Option<String>,
    pub table_name: Option<String>,
    pub record_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    pub fn is_closed(&self) -> bool {
        IssueStatus::from_string(&self.status) == IssueStatus::Closed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IssueComment {
    pub id: i64,
    pub uuid: String,
    pub issue_id: i64,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub result: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateIssue {
    pub subject: String,
    pub summary: Option<String>,
    pub priority: IssuePriority,
    pub created_by: i64,
    pub sales_representative_id: Option<i64>,
    pub table_name: Option<String>,
    pub record_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateIssue {
    pub subject: Option<String>,
    pub summary: Option<String>,
    pub priority: Option<IssuePriority>,
    pub status: Option<IssueStatus>,
    pub sales_representative_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

impl UpdateIssue {
    /// An update that does nothing but move the issue out of `CLOSED`.
    pub fn is_reopen_only(&self) -> bool {
        matches!(self.status, Some(IssueStatus::Open | IssueStatus::InProgress))
            && self.subject.is_none()
            && self.summary.is_none()
            && self.priority.is_none()
            && self.sales_representative_id.is_none()
            && self.due_date.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListIssuesFilter {
    pub search_value: String,
    pub status: Option<IssueStatus>,
    pub priority: Option<IssuePriority>,
    pub table_name: String,
    pub record_id: i64,
}

impl ListIssuesFilter {
    pub fn where_clause(&self) -> WhereClause {
        let mut clause = WhereClause::new();
        clause
            .contains_any(&["i.document_no", "i.subject", "i.summary"], &self.search_value)
            .eq_text("i.table_name", &self.table_name)
            .eq_id("i.record_id", self.record_id);
        if let Some(status) = self.status {
            clause.eq("i.status", status.as_str());
        }
        if let Some(priority) = self.priority {
            clause.eq("i.priority", priority.as_str());
        }
        clause
    }
}
