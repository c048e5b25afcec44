use super::Database;
use crate::models::Country;
use crate::services::query::ListQuery;
use service_core::error::AppError;
use service_core::filter::WhereClause;
use service_core::pagination::PageRequest;
use tracing::instrument;

pub(crate) const COUNTRY_QUERY: ListQuery = ListQuery {
    columns: "c.id, c.uuid, c.code, c.name, c.currency_code, c.has_region",
    from: "countries c",
    order_by: "c.name, c.id",
};

impl Database {
    #[instrument(skip(self))]
    pub async fn get_country_by_id(&self, id: i64) -> Result<Option<Country>, AppError> {
        let mut clause = WhereClause::new();
        clause.eq("c.id", id);
        self.fetch_optional_matching("get_country", &COUNTRY_QUERY, &clause)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_country_by_code(&self, code: &str) -> Result<Option<Country>, AppError> {
        let mut clause = WhereClause::new();
        clause.eq_text("c.code", code);
        if clause.is_empty() {
            return Ok(None);
        }
        self.fetch_optional_matching("get_country", &COUNTRY_QUERY, &clause)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_countries(
        &self,
        search_value: &str,
        page: PageRequest,
    ) -> Result<(Vec<Country>, i64), AppError> {
        let mut clause = WhereClause::new();
        clause.contains_any(&["c.code", "c.name"], search_value);
        self.fetch_page("list_countries", &COUNTRY_QUERY, &clause, page)
            .await
    }
}
