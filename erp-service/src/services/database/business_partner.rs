use super::{commit, db_error, db_error_or_conflict, Database};
use crate::models::{
    BusinessPartner, Contact, CreateBusinessPartner, ListBusinessPartnersFilter, Location,
    NewContact, NewLocation, RecordKey, UpdateBusinessPartner,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::query::ListQuery;
use chrono::Utc;
use service_core::error::AppError;
use service_core::filter::WhereClause;
use service_core::pagination::PageRequest;
use sqlx::{Sqlite, Transaction};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

pub(crate) const BUSINESS_PARTNER_QUERY: ListQuery = ListQuery {
    columns: "bp.id, bp.uuid, bp.value, bp.tax_id, bp.duns, bp.naics, bp.name, bp.name2, \
              bp.description, bp.is_customer, bp.is_vendor, bp.is_active, bp.created_at, \
              bp.updated_at",
    from: "business_partners bp",
    order_by: "bp.value, bp.id",
};

const LOCATION_QUERY: ListQuery = ListQuery {
    columns: "l.id, l.uuid, l.business_partner_id, l.address1, l.address2, l.address3, \
              l.address4, l.city, l.postal_code, l.region_name, l.country_id, \
              c.code AS country_code, c.name AS country_name, l.phone, l.is_bill_to, \
              l.is_ship_to",
    from: "bp_locations l LEFT JOIN countries c ON c.id = l.country_id",
    order_by: "l.id",
};

const CONTACT_QUERY: ListQuery = ListQuery {
    columns: "ct.id, ct.uuid, ct.business_partner_id, ct.name, ct.email, ct.phone, \
              ct.description",
    from: "bp_contacts ct",
    order_by: "ct.id",
};

/// `<column> IN (?, ?, ...)` over the given ids.
fn in_ids(column: &str, ids: &[i64]) -> WhereClause {
    let mut clause = WhereClause::new();
    let placeholders = vec!["?"; ids.len()].join(", ");
    clause.push(
        format!("{} IN ({})", column, placeholders),
        ids.iter().copied(),
    );
    clause
}

fn group_by_partner<T>(rows: Vec<T>, partner_of: impl Fn(&T) -> i64) -> HashMap<i64, Vec<T>> {
    let mut grouped: HashMap<i64, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(partner_of(&row)).or_default().push(row);
    }
    grouped
}

impl Database {
    /// Insert header, location and contact in one transaction.
    #[instrument(skip(self, input), fields(value = %input.value))]
    pub async fn create_business_partner(
        &self,
        input: &CreateBusinessPartner,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_business_partner"])
            .start_timer();

        let country_id = match &input.location {
            Some(location) => self.location_country_id(location).await?,
            None => None,
        };

        let mut tx = self.begin().await?;
        let now = Utc::now();

        let partner_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO business_partners (uuid, value, tax_id, duns, naics, name, name2, description, is_customer, is_vendor, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&input.value)
        .bind(&input.tax_id)
        .bind(&input.duns)
        .bind(&input.naics)
        .bind(&input.name)
        .bind(&input.name2)
        .bind(&input.description)
        .bind(input.is_customer)
        .bind(input.is_vendor)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error_or_conflict(
            "create business partner",
            format!("Business partner value {} already exists", input.value),
        ))?;

        if let Some(location) = &input.location {
            Self::insert_location(&mut tx, partner_id, location, country_id).await?;
        }
        if let Some(contact) = &input.contact {
            Self::insert_contact(&mut tx, partner_id, contact).await?;
        }

        commit(tx).await?;
        timer.observe_duration();
        info!(business_partner_id = partner_id, "Business partner created");
        Ok(partner_id)
    }

    /// Resolve the location country by id or ISO code.
    async fn location_country_id(&self, location: &NewLocation) -> Result<Option<i64>, AppError> {
        let country = match (location.country_id, &location.country_code) {
            (Some(id), _) => self
                .get_country_by_id(id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Country {} not found", id)))?,
            (None, Some(code)) => self
                .get_country_by_code(code)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Country {} not found", code)))?,
            (None, None) => return Ok(None),
        };
        Ok(Some(country.id))
    }

    async fn insert_location(
        tx: &mut Transaction<'static, Sqlite>,
        partner_id: i64,
        location: &NewLocation,
        country_id: Option<i64>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO bp_locations (uuid, business_partner_id, address1, address2, address3, address4, city, postal_code, region_name, country_id, phone, is_bill_to, is_ship_to)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, 1)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(partner_id)
        .bind(&location.address1)
        .bind(&location.address2)
        .bind(&location.address3)
        .bind(&location.address4)
        .bind(&location.city)
        .bind(&location.postal_code)
        .bind(&location.region_name)
        .bind(country_id)
        .bind(&location.phone)
        .execute(&mut **tx)
        .await
        .map_err(db_error("create location"))?;

        Ok(())
    }

    async fn insert_contact(
        tx: &mut Transaction<'static, Sqlite>,
        partner_id: i64,
        contact: &NewContact,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO bp_contacts (uuid, business_partner_id, name, email, phone, description)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(partner_id)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.description)
        .execute(&mut **tx)
        .await
        .map_err(db_error("create contact"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_business_partner(
        &self,
        key: &RecordKey,
    ) -> Result<Option<BusinessPartner>, AppError> {
        self.fetch_optional_matching(
            "get_business_partner",
            &BUSINESS_PARTNER_QUERY,
            &key.where_clause("bp"),
        )
        .await
    }

    /// Resolve a partner reference to its id.
    pub async fn business_partner_id(&self, key: &RecordKey) -> Result<i64, AppError> {
        self.get_business_partner(key)
            .await?
            .map(|bp| bp.id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Business partner {} not found", key)))
    }

    #[instrument(skip(self, filter))]
    pub async fn list_business_partners(
        &self,
        filter: &ListBusinessPartnersFilter,
        page: PageRequest,
    ) -> Result<(Vec<BusinessPartner>, i64), AppError> {
        self.fetch_page(
            "list_business_partners",
            &BUSINESS_PARTNER_QUERY,
            &filter.where_clause(),
            page,
        )
        .await
    }

    /// Every partner matching the filter, for exports.
    pub async fn all_business_partners(
        &self,
        filter: &ListBusinessPartnersFilter,
    ) -> Result<Vec<BusinessPartner>, AppError> {
        self.fetch_all_matching(
            "export_business_partners",
            &BUSINESS_PARTNER_QUERY,
            &filter.where_clause(),
        )
        .await
    }

    /// Locations and contacts of several partners, keyed by partner id.
    #[instrument(skip(self, partner_ids), fields(partners = partner_ids.len()))]
    pub async fn partner_children(
        &self,
        partner_ids: &[i64],
    ) -> Result<(HashMap<i64, Vec<Location>>, HashMap<i64, Vec<Contact>>), AppError> {
        if partner_ids.is_empty() {
            return Ok((HashMap::new(), HashMap::new()));
        }
        let locations: Vec<Location> = self
            .fetch_all_matching(
                "list_locations",
                &LOCATION_QUERY,
                &in_ids("l.business_partner_id", partner_ids),
            )
            .await?;
        let contacts: Vec<Contact> = self
            .fetch_all_matching(
                "list_contacts",
                &CONTACT_QUERY,
                &in_ids("ct.business_partner_id", partner_ids),
            )
            .await?;

        Ok((
            group_by_partner(locations, |l| l.business_partner_id),
            group_by_partner(contacts, |c| c.business_partner_id),
        ))
    }

    /// Apply a partial update; `None` fields keep their stored value.
    #[instrument(skip(self, update))]
    pub async fn update_business_partner(
        &self,
        id: i64,
        update: &UpdateBusinessPartner,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_business_partner"])
            .start_timer();

        let conflict = format!(
            "Business partner value {} already exists",
            update.value.as_deref().unwrap_or_default()
        );
        sqlx::query(
            r#"
            UPDATE business_partners SET
                value = COALESCE(?, value),
                tax_id = COALESCE(?, tax_id),
                duns = COALESCE(?, duns),
                naics = COALESCE(?, naics),
                name = COALESCE(?, name),
                name2 = COALESCE(?, name2),
                description = COALESCE(?, description),
                is_customer = COALESCE(?, is_customer),
                is_vendor = COALESCE(?, is_vendor),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.value)
        .bind(&update.tax_id)
        .bind(&update.duns)
        .bind(&update.naics)
        .bind(&update.name)
        .bind(&update.name2)
        .bind(&update.description)
        .bind(update.is_customer)
        .bind(update.is_vendor)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(db_error_or_conflict("update business partner", conflict))?;

        timer.observe_duration();
        Ok(())
    }

    /// Delete a partner with its contacts and locations.
    ///
    /// Refused while payments or payroll movements reference the partner.
    #[instrument(skip(self))]
    pub async fn delete_business_partner(&self, id: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_business_partner"])
            .start_timer();

        let mut tx = self.begin().await?;

        let references: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM payments WHERE business_partner_id = ?) \
             + (SELECT COUNT(*) FROM payroll_movements WHERE business_partner_id = ?)",
        )
        .bind(id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("check business partner references"))?;

        if references > 0 {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Business partner {} is referenced by {} documents",
                id,
                references
            )));
        }

        for sql in [
            "DELETE FROM bp_contacts WHERE business_partner_id = ?",
            "DELETE FROM bp_locations WHERE business_partner_id = ?",
            "DELETE FROM business_partners WHERE id = ?",
        ] {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("delete business partner"))?;
        }

        commit(tx).await?;
        timer.observe_duration();
        info!(business_partner_id = id, "Business partner deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner(value: &str) -> CreateBusinessPartner {
        CreateBusinessPartner {
            value: value.to_string(),
            name: format!("{} Inc.", value),
            is_customer: true,
            ..Default::default()
        }
    }

    async fn row_count(db: &Database, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_value_is_conflict() {
        let db = Database::in_memory().await.unwrap();
        db.create_business_partner(&partner("ACME")).await.unwrap();
        let err = db.create_business_partner(&partner("ACME")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_country_writes_nothing() {
        let db = Database::in_memory().await.unwrap();
        let mut input = partner("GLOBEX");
        input.location = Some(NewLocation {
            city: Some("Springfield".to_string()),
            country_code: Some("QQ".to_string()),
            ..Default::default()
        });
        input.contact = Some(NewContact {
            name: "Hank".to_string(),
            ..Default::default()
        });

        let err = db.create_business_partner(&input).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(row_count(&db, "business_partners").await, 0);
        assert_eq!(row_count(&db, "bp_locations").await, 0);
        assert_eq!(row_count(&db, "bp_contacts").await, 0);

        input.location = Some(NewLocation {
            country_id: Some(9999),
            ..Default::default()
        });
        let err = db.create_business_partner(&input).await.unwrap_err();
        assert_eq!(err.to_string(), "Not found: Country 9999 not found");
        assert_eq!(row_count(&db, "business_partners").await, 0);
    }

    #[tokio::test]
    async fn children_are_grouped_by_partner() {
        let db = Database::in_memory().await.unwrap();
        let mut input = partner("INITECH");
        input.location = Some(NewLocation {
            country_code: Some("us".to_string()),
            postal_code: Some("73301".to_string()),
            ..Default::default()
        });
        input.contact = Some(NewContact {
            name: "Bill".to_string(),
            email: Some("bill@initech.test".to_string()),
            ..Default::default()
        });
        let id = db.create_business_partner(&input).await.unwrap();
        let other = db.create_business_partner(&partner("HOOLI")).await.unwrap();

        let (locations, contacts) = db.partner_children(&[id, other]).await.unwrap();
        assert_eq!(locations[&id].len(), 1);
        assert_eq!(locations[&id][0].country_code.as_deref(), Some("US"));
        assert_eq!(contacts[&id][0].name, "Bill");
        assert!(!locations.contains_key(&other));
    }

    #[tokio::test]
    async fn update_keeps_unset_fields() {
        let db = Database::in_memory().await.unwrap();
        let mut input = partner("UMBRELLA");
        input.description = Some("pharma".to_string());
        let id = db.create_business_partner(&input).await.unwrap();

        db.update_business_partner(
            id,
            &UpdateBusinessPartner {
                name: Some("Umbrella Corp".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let bp = db
            .get_business_partner(&RecordKey::Id(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bp.name, "Umbrella Corp");
        assert_eq!(bp.description.as_deref(), Some("pharma"));
        assert!(bp.is_customer);
    }

    #[tokio::test]
    async fn delete_removes_children() {
        let db = Database::in_memory().await.unwrap();
        let mut input = partner("STARK");
        input.contact = Some(NewContact {
            name: "Pepper".to_string(),
            ..Default::default()
        });
        let id = db.create_business_partner(&input).await.unwrap();

        db.delete_business_partner(id).await.unwrap();
        assert_eq!(row_count(&db, "business_partners").await, 0);
        assert_eq!(row_count(&db, "bp_contacts").await, 0);
    }
}
