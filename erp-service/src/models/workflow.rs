//! Document status machine shared by processable documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Document status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Drafted,
    Completed,
    Voided,
    Reversed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Drafted => "DR",
            DocumentStatus::Completed => "CO",
            DocumentStatus::Voided => "VO",
            DocumentStatus::Reversed => "RE",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "CO" => DocumentStatus::Completed,
            "VO" => DocumentStatus::Voided,
            "RE" => DocumentStatus::Reversed,
            _ => DocumentStatus::Drafted,
        }
    }

    /// Actions that may run from this status, default first.
    pub fn valid_actions(&self) -> &'static [DocumentAction] {
        match self {
            DocumentStatus::Drafted => &[DocumentAction::Complete, DocumentAction::Void],
            DocumentStatus::Completed => &[DocumentAction::ReverseCorrect, DocumentAction::Void],
            DocumentStatus::Voided | DocumentStatus::Reversed => &[],
        }
    }

    pub fn default_action(&self) -> Option<DocumentAction> {
        self.valid_actions().first().copied()
    }

    pub fn allows(&self, action: DocumentAction) -> bool {
        self.valid_actions().contains(&action)
    }
}

/// Document action code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentAction {
    Complete,
    Void,
    ReverseCorrect,
}

impl DocumentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentAction::Complete => "CO",
            DocumentAction::Void => "VO",
            DocumentAction::ReverseCorrect => "RC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CO" => Some(DocumentAction::Complete),
            "VO" => Some(DocumentAction::Void),
            "RC" => Some(DocumentAction::ReverseCorrect),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentAction::Complete => "Complete",
            DocumentAction::Void => "Void",
            DocumentAction::ReverseCorrect => "Reverse - Correct",
        }
    }

    /// Status a document lands in after this action.
    pub fn resulting_status(&self) -> DocumentStatus {
        match self {
            DocumentAction::Complete => DocumentStatus::Completed,
            DocumentAction::Void => DocumentStatus::Voided,
            DocumentAction::ReverseCorrect => DocumentStatus::Reversed,
        }
    }
}

/// Tables whose rows carry a document status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentTable {
    Payments,
}

impl DocumentTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            DocumentTable::Payments => "payments",
        }
    }

    /// Accepts the table name or its `C_Payment` alias, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "payments" | "c_payment" => Some(DocumentTable::Payments),
            _ => None,
        }
    }
}

/// Status columns of a processable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DocumentRecord {
    pub id: i64,
    pub uuid: String,
    pub document_no: String,
    pub document_status: String,
    pub processed: bool,
}

impl DocumentRecord {
    pub fn status(&self) -> DocumentStatus {
        DocumentStatus::from_string(&self.document_status)
    }
}

/// Audit row written by every document action.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentActionLog {
    pub id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub document_action: String,
    pub status_from: String,
    pub status_to: String,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
