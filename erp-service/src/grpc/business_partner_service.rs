//! BusinessPartnerService gRPC implementation.

use crate::grpc::proto::business_partner::{
    business_partner_service_server::BusinessPartnerService,
    BusinessPartner as ProtoBusinessPartner, Contact as ProtoContact, ContactInput,
    CreateBusinessPartnerRequest, DeleteBusinessPartnerRequest, DeleteBusinessPartnerResponse,
    GetBusinessPartnerRequest, ListBusinessPartnersRequest, ListBusinessPartnersResponse,
    Location as ProtoLocation, LocationInput, UpdateBusinessPartnerRequest,
};
use crate::grpc::{observe, page_request, positive, timestamp};
use crate::models::{
    non_empty, BusinessPartner, Contact, CreateBusinessPartner, ListBusinessPartnersFilter,
    Location, NewContact, NewLocation, RecordKey, UpdateBusinessPartner,
};
use crate::services::{Database, SessionManager};
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::sync::Arc;
use tonic::Request;
use tracing::{info, instrument};

pub struct BusinessPartnerServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
}

fn location_to_proto(location: &Location) -> ProtoLocation {
    ProtoLocation {
        id: location.id,
        uuid: location.uuid.clone(),
        address1: location.address1.clone().unwrap_or_default(),
        address2: location.address2.clone().unwrap_or_default(),
        address3: location.address3.clone().unwrap_or_default(),
        address4: location.address4.clone().unwrap_or_default(),
        city: location.city.clone().unwrap_or_default(),
        postal_code: location.postal_code.clone().unwrap_or_default(),
        region_name: location.region_name.clone().unwrap_or_default(),
        country_id: location.country_id.unwrap_or_default(),
        country_code: location.country_code.clone().unwrap_or_default(),
        country_name: location.country_name.clone().unwrap_or_default(),
        phone: location.phone.clone().unwrap_or_default(),
        is_bill_to: location.is_bill_to,
        is_ship_to: location.is_ship_to,
    }
}

fn contact_to_proto(contact: &Contact) -> ProtoContact {
    ProtoContact {
        id: contact.id,
        uuid: contact.uuid.clone(),
        name: contact.name.clone(),
        email: contact.email.clone().unwrap_or_default(),
        phone: contact.phone.clone().unwrap_or_default(),
        description: contact.description.clone().unwrap_or_default(),
    }
}

fn business_partner_to_proto(
    partner: &BusinessPartner,
    locations: &[Location],
    contacts: &[Contact],
) -> ProtoBusinessPartner {
    ProtoBusinessPartner {
        id: partner.id,
        uuid: partner.uuid.clone(),
        value: partner.value.clone(),
        tax_id: partner.tax_id.clone().unwrap_or_default(),
        duns: partner.duns.clone().unwrap_or_default(),
        naics: partner.naics.clone().unwrap_or_default(),
        name: partner.name.clone(),
        name2: partner.name2.clone().unwrap_or_default(),
        description: partner.description.clone().unwrap_or_default(),
        is_customer: partner.is_customer,
        is_vendor: partner.is_vendor,
        is_active: partner.is_active,
        locations: locations.iter().map(location_to_proto).collect(),
        contacts: contacts.iter().map(contact_to_proto).collect(),
        created_at: timestamp(&partner.created_at),
        updated_at: timestamp(&partner.updated_at),
    }
}

fn new_location(input: LocationInput) -> NewLocation {
    NewLocation {
        address1: non_empty(&input.address1),
        address2: non_empty(&input.address2),
        address3: non_empty(&input.address3),
        address4: non_empty(&input.address4),
        city: non_empty(&input.city),
        postal_code: non_empty(&input.postal_code),
        region_name: non_empty(&input.region_name),
        country_id: positive(input.country_id),
        country_code: non_empty(&input.country_code),
        phone: non_empty(&input.phone),
    }
}

fn new_contact(input: ContactInput) -> Result<NewContact, AppError> {
    let name = non_empty(&input.name).ok_or_else(|| AppError::mandatory("contact.name"))?;
    Ok(NewContact {
        name,
        email: non_empty(&input.email),
        phone: non_empty(&input.phone),
        description: non_empty(&input.description),
    })
}

impl BusinessPartnerServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager) -> Self {
        Self { db, sessions }
    }

    /// Load a partner with its locations and contacts.
    async fn load(&self, key: &RecordKey) -> Result<ProtoBusinessPartner, AppError> {
        let partner = self.db.get_business_partner(key).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Business partner {} not found", key))
        })?;
        let (mut locations, mut contacts) = self.db.partner_children(&[partner.id]).await?;
        Ok(business_partner_to_proto(
            &partner,
            &locations.remove(&partner.id).unwrap_or_default(),
            &contacts.remove(&partner.id).unwrap_or_default(),
        ))
    }
}

#[tonic::async_trait]
impl BusinessPartnerService for BusinessPartnerServiceImpl {
    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "CreateBusinessPartner")
    )]
    async fn create_business_partner(
        &self,
        request: Request<CreateBusinessPartnerRequest>,
    ) -> GrpcResult<ProtoBusinessPartner> {
        observe("CreateBusinessPartner", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();

            let value = non_empty(&req.value).ok_or_else(|| AppError::mandatory("value"))?;
            let name = non_empty(&req.name).ok_or_else(|| AppError::mandatory("name"))?;
            let contact = req.contact.map(new_contact).transpose()?;

            let input = CreateBusinessPartner {
                value,
                tax_id: non_empty(&req.tax_id),
                duns: non_empty(&req.duns),
                naics: non_empty(&req.naics),
                name,
                name2: non_empty(&req.name2),
                description: non_empty(&req.description),
                is_customer: req.is_customer,
                is_vendor: req.is_vendor,
                location: req.location.map(new_location),
                contact,
            };

            let id = self.db.create_business_partner(&input).await?;
            self.load(&RecordKey::Id(id)).await
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "GetBusinessPartner")
    )]
    async fn get_business_partner(
        &self,
        request: Request<GetBusinessPartnerRequest>,
    ) -> GrpcResult<ProtoBusinessPartner> {
        observe("GetBusinessPartner", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.id, &req.uuid, "id")?;
            self.load(&key).await
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "ListBusinessPartners")
    )]
    async fn list_business_partners(
        &self,
        request: Request<ListBusinessPartnersRequest>,
    ) -> GrpcResult<ListBusinessPartnersResponse> {
        observe("ListBusinessPartners", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let filter = ListBusinessPartnersFilter {
                search_value: req.search_value,
                value: req.value,
                name: req.name,
                contact_name: req.contact_name,
                email: req.email,
                phone: req.phone,
                postal_code: req.postal_code,
                is_customer: req.is_customer,
                is_vendor: req.is_vendor,
            };
            let (partners, record_count) = self.db.list_business_partners(&filter, page).await?;

            let ids: Vec<i64> = partners.iter().map(|bp| bp.id).collect();
            let (locations, contacts) = self.db.partner_children(&ids).await?;
            let business_partners = partners
                .iter()
                .map(|bp| {
                    business_partner_to_proto(
                        bp,
                        locations.get(&bp.id).map(Vec::as_slice).unwrap_or_default(),
                        contacts.get(&bp.id).map(Vec::as_slice).unwrap_or_default(),
                    )
                })
                .collect();

            Ok(ListBusinessPartnersResponse {
                record_count,
                business_partners,
                next_page_token: page.next_page_token(context.session_uuid(), record_count),
            })
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "UpdateBusinessPartner")
    )]
    async fn update_business_partner(
        &self,
        request: Request<UpdateBusinessPartnerRequest>,
    ) -> GrpcResult<ProtoBusinessPartner> {
        observe("UpdateBusinessPartner", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.id, &req.uuid, "id")?;
            let id = self.db.business_partner_id(&key).await?;

            let update = UpdateBusinessPartner {
                value: non_empty(&req.value),
                tax_id: non_empty(&req.tax_id),
                duns: non_empty(&req.duns),
                naics: non_empty(&req.naics),
                name: non_empty(&req.name),
                name2: non_empty(&req.name2),
                description: non_empty(&req.description),
                is_customer: req.is_customer,
                is_vendor: req.is_vendor,
            };
            self.db.update_business_partner(id, &update).await?;
            info!(business_partner_id = id, "Business partner updated");
            self.load(&RecordKey::Id(id)).await
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "DeleteBusinessPartner")
    )]
    async fn delete_business_partner(
        &self,
        request: Request<DeleteBusinessPartnerRequest>,
    ) -> GrpcResult<DeleteBusinessPartnerResponse> {
        observe("DeleteBusinessPartner", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.id, &req.uuid, "id")?;
            let id = self.db.business_partner_id(&key).await?;
            self.db.delete_business_partner(id).await?;
            Ok(DeleteBusinessPartnerResponse {})
        })
        .await
    }
}
