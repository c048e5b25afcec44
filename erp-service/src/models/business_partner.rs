//! Business partner model: header plus locations and contacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::filter::WhereClause;
use sqlx::FromRow;

/// Business partner header.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BusinessPartner {
    pub id: i64,
    pub uuid: String,
    pub value: String,
    pub tax_id: Option<String>,
    pub duns: Option<String>,
    pub naics: Option<String>,
    pub name: String,
    pub name2: Option<String>,
    pub description: Option<String>,
    pub is_customer: bool,
    pub is_vendor: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partner location joined with its country.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Location {
    pub id: i64,
    pub uuid: String,
    pub business_partner_id: i64,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub address3: Option<String>,
    pub address4: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub region_name: Option<String>,
    pub country_id: Option<i64>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub phone: Option<String>,
    pub is_bill_to: bool,
    pub is_ship_to: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: i64,
    pub uuid: String,
    pub business_partner_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub description: Option<String>,
}

/// Location supplied with a create request. The country is given either by
/// id or by ISO code.
#[derive(Debug, Clone, Default)]
pub struct NewLocation {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub address3: Option<String>,
    pub address4: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub region_name: Option<String>,
    pub country_id: Option<i64>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateBusinessPartner {
    pub value: String,
    pub tax_id: Option<String>,
    pub duns: Option<String>,
    pub naics: Option<String>,
    pub name: String,
    pub name2: Option<String>,
    pub description: Option<String>,
    pub is_customer: bool,
    pub is_vendor: bool,
    pub location: Option<NewLocation>,
    pub contact: Option<NewContact>,
}

/// Partial update: `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateBusinessPartner {
    pub value: Option<String>,
    pub tax_id: Option<String>,
    pub duns: Option<String>,
    pub naics: Option<String>,
    pub name: Option<String>,
    pub name2: Option<String>,
    pub description: Option<String>,
    pub is_customer: Option<bool>,
    pub is_vendor: Option<bool>,
}

/// Filter parameters for listing business partners.
#[derive(Debug, Clone, Default)]
pub struct ListBusinessPartnersFilter {
    pub search_value: String,
    pub value: String,
    pub name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub postal_code: String,
    pub is_customer: Option<bool>,
    pub is_vendor: Option<bool>,
}

impl ListBusinessPartnersFilter {
    /// Predicates over the `bp` alias; contact and location criteria are
    /// expressed as correlated `EXISTS` subqueries.
    pub fn where_clause(&self) -> WhereClause {
        let mut clause = WhereClause::new();
        clause
            .contains_any(
                &["bp.value", "bp.name", "bp.name2", "bp.description"],
                &self.search_value,
            )
            .eq_text("bp.value", &self.value)
            .eq_text("bp.name", &self.name);

        if !self.contact_name.trim().is_empty() {
            clause.push(
                "EXISTS (SELECT 1 FROM bp_contacts c WHERE c.business_partner_id = bp.id \
                 AND INSTR(UPPER(c.name), UPPER(?)) > 0)",
                [self.contact_name.trim()],
            );
        }
        if !self.email.trim().is_empty() {
            clause.push(
                "EXISTS (SELECT 1 FROM bp_contacts c WHERE c.business_partner_id = bp.id \
                 AND UPPER(c.email) = UPPER(?))",
                [self.email.trim()],
            );
        }
        if !self.phone.trim().is_empty() {
            clause.push(
                "(EXISTS (SELECT 1 FROM bp_contacts c WHERE c.business_partner_id = bp.id \
                 AND c.phone = ?) OR EXISTS (SELECT 1 FROM bp_locations l \
                 WHERE l.business_partner_id = bp.id AND l.phone = ?))",
                [self.phone.trim(), self.phone.trim()],
            );
        }
        if !self.postal_code.trim().is_empty() {
            clause.push(
                "EXISTS (SELECT 1 FROM bp_locations l WHERE l.business_partner_id = bp.id \
                 AND UPPER(l.postal_code) = UPPER(?))",
                [self.postal_code.trim()],
            );
        }

        clause
            .eq_bool("bp.is_customer", self.is_customer)
            .eq_bool("bp.is_vendor", self.is_vendor);
        clause
    }
}
