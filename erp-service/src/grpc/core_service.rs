//! CoreService gRPC implementation: countries, read through a bounded cache.

use crate::grpc::proto::reference::{
    core_service_server::CoreService, Country as ProtoCountry, GetCountryRequest,
    ListCountriesRequest, ListCountriesResponse,
};
use crate::grpc::{assemble_page, observe, page_request};
use crate::models::{non_empty, Country};
use crate::services::metrics::record_cache_lookup;
use crate::services::{Database, SessionManager};
use service_core::cache::BoundedCache;
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::sync::Arc;
use tonic::Request;
use tracing::instrument;

/// Country lookups are cached under both the id and the ISO code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CountryKey {
    Id(i64),
    Code(String),
}

pub type CountryCache = BoundedCache<CountryKey, Country>;

pub struct CoreServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
    countries: Arc<CountryCache>,
}

fn country_to_proto(country: &Country) -> ProtoCountry {
    ProtoCountry {
        id: country.id,
        uuid: country.uuid.clone(),
        code: country.code.clone(),
        name: country.name.clone(),
        currency_code: country.currency_code.clone().unwrap_or_default(),
        has_region: country.has_region,
    }
}

impl CoreServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager, countries: Arc<CountryCache>) -> Self {
        Self {
            db,
            sessions,
            countries,
        }
    }

    async fn cached_country(&self, key: CountryKey) -> Result<Country, AppError> {
        if let Some(country) = self.countries.get(&key).await {
            record_cache_lookup("country", true);
            return Ok(country);
        }
        record_cache_lookup("country", false);

        let found = match &key {
            CountryKey::Id(id) => self.db.get_country_by_id(*id).await?,
            CountryKey::Code(code) => self.db.get_country_by_code(code).await?,
        };
        let country = found.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Country {:?} not found", key))
        })?;

        self.countries
            .insert(CountryKey::Id(country.id), country.clone())
            .await;
        self.countries
            .insert(CountryKey::Code(country.code.to_ascii_uppercase()), country.clone())
            .await;
        Ok(country)
    }
}

#[tonic::async_trait]
impl CoreService for CoreServiceImpl {
    #[instrument(skip(self, request), fields(service = "erp-service", method = "GetCountry"))]
    async fn get_country(&self, request: Request<GetCountryRequest>) -> GrpcResult<ProtoCountry> {
        observe("GetCountry", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();

            let key = if req.id > 0 {
                CountryKey::Id(req.id)
            } else if let Some(code) = non_empty(&req.code) {
                CountryKey::Code(code.to_ascii_uppercase())
            } else {
                return Err(AppError::mandatory("id"));
            };

            let country = self.cached_country(key).await?;
            Ok(country_to_proto(&country))
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "ListCountries"))]
    async fn list_countries(
        &self,
        request: Request<ListCountriesRequest>,
    ) -> GrpcResult<ListCountriesResponse> {
        observe("ListCountries", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let rows = self.db.list_countries(&req.search_value, page).await?;
            let page = assemble_page(&context, page, rows, |c| country_to_proto(&c));

            Ok(ListCountriesResponse {
                record_count: page.record_count,
                countries: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn lookups_fill_both_cache_keys() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let cache = Arc::new(CountryCache::new(10, Duration::from_secs(60)));
        let service = CoreServiceImpl::new(
            db.clone(),
            SessionManager::new(db, 60),
            cache.clone(),
        );

        let country = service
            .cached_country(CountryKey::Code("DE".to_string()))
            .await
            .unwrap();
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&CountryKey::Id(country.id)).await, Some(country));
    }

    #[tokio::test]
    async fn unknown_country_is_not_cached() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let cache = Arc::new(CountryCache::new(10, Duration::from_secs(60)));
        let service = CoreServiceImpl::new(db.clone(), SessionManager::new(db, 60), cache.clone());

        let err = service.cached_country(CountryKey::Id(9999)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(cache.is_empty().await);
    }

    #[test]
    fn missing_currency_maps_to_empty_string() {
        let proto = country_to_proto(&Country {
            id: 1,
            uuid: "u".to_string(),
            code: "AQ".to_string(),
            name: "Antarctica".to_string(),
            currency_code: None,
            has_region: false,
        });
        assert_eq!(proto.currency_code, "");
    }
}
