//! FileManagementService gRPC implementation: attachments and their resources.

use crate::grpc::proto::attachment::{
    file_management_service_server::FileManagementService, load_resource_request,
    Attachment as ProtoAttachment, DeleteResourceReferenceRequest,
    DeleteResourceReferenceResponse, GetAttachmentRequest, GetResourceReferenceRequest,
    GetResourceRequest, GetResourceResponse, LoadResourceRequest,
    ResourceReference as ProtoResourceReference, SetAttachmentDescriptionRequest,
};
use crate::grpc::{observe, timestamp};
use crate::models::{non_empty, Attachment, NewResource, ResourceReference};
use crate::services::{Database, SessionManager, Storage};
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use service_core::transfer::{chunk_bytes, UploadBuffer};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Status, Streaming};
use tracing::{info, instrument, warn};
use uuid::Uuid;

type ResourceStream =
    Pin<Box<dyn futures::Stream<Item = Result<GetResourceResponse, Status>> + Send>>;

pub struct FileManagementServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
    storage: Arc<dyn Storage>,
    max_upload_bytes: usize,
}

fn resource_to_proto(resource: ResourceReference) -> ProtoResourceReference {
    ProtoResourceReference {
        id: resource.id,
        uuid: resource.uuid,
        attachment_id: resource.attachment_id,
        file_name: resource.file_name,
        content_type: resource.content_type,
        file_size: resource.file_size,
        description: resource.description.unwrap_or_default(),
        created_at: timestamp(&resource.created_at),
    }
}

fn attachment_to_proto(
    attachment: Attachment,
    resources: Vec<ResourceReference>,
) -> ProtoAttachment {
    ProtoAttachment {
        id: attachment.id,
        uuid: attachment.uuid,
        table_name: attachment.table_name,
        record_id: attachment.record_id,
        title: attachment.title.unwrap_or_default(),
        text_msg: attachment.text_msg.unwrap_or_default(),
        resource_references: resources.into_iter().map(resource_to_proto).collect(),
    }
}

/// Validated `(table_name, record_id)` pair an attachment hangs off.
fn record_reference(table_name: &str, record_id: i64) -> Result<(String, i64), AppError> {
    let table_name = non_empty(table_name).ok_or_else(|| AppError::mandatory("table_name"))?;
    if record_id <= 0 {
        return Err(AppError::mandatory("record_id"));
    }
    Ok((table_name, record_id))
}

/// `<table>/<record_id>/<resource uuid>`
fn storage_key(table_name: &str, record_id: i64, resource_uuid: &str) -> String {
    format!("{}/{}/{}", table_name, record_id, resource_uuid)
}

fn stream_error(err: Status) -> AppError {
    AppError::InvalidArgument(anyhow::anyhow!("Upload stream failed: {}", err.message()))
}

impl FileManagementServiceImpl {
    pub fn new(
        db: Arc<Database>,
        sessions: SessionManager,
        storage: Arc<dyn Storage>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            db,
            sessions,
            storage,
            max_upload_bytes,
        }
    }

    async fn attachment(&self, table_name: &str, record_id: i64) -> Result<ProtoAttachment, AppError> {
        let attachment = self
            .db
            .get_attachment(table_name, record_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "No attachment for {} record {}",
                    table_name,
                    record_id
                ))
            })?;
        let resources = self.db.list_resource_references(attachment.id).await?;
        Ok(attachment_to_proto(attachment, resources))
    }

    async fn resource(&self, uuid: &str) -> Result<ResourceReference, AppError> {
        let uuid = non_empty(uuid).ok_or_else(|| AppError::mandatory("uuid"))?;
        self.db
            .get_resource_reference(&uuid)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Resource {} not found", uuid)))
    }

    /// Read the metadata message, then every chunk up to the declared size.
    async fn receive_upload(
        &self,
        stream: &mut Streaming<LoadResourceRequest>,
    ) -> Result<(NewResource, Vec<u8>), AppError> {
        let first = stream
            .message()
            .await
            .map_err(stream_error)?
            .ok_or_else(|| AppError::InvalidArgument(anyhow::anyhow!("Empty upload stream")))?;

        let metadata = match first.data {
            Some(load_resource_request::Data::Metadata(metadata)) => metadata,
            _ => {
                return Err(AppError::InvalidArgument(anyhow::anyhow!(
                    "First message must contain metadata"
                )))
            }
        };
        let (table_name, record_id) = record_reference(&metadata.table_name, metadata.record_id)?;
        let file_name =
            non_empty(&metadata.file_name).ok_or_else(|| AppError::mandatory("file_name"))?;
        let content_type = non_empty(&metadata.content_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut buffer = UploadBuffer::new(metadata.file_size, self.max_upload_bytes)?;
        while let Some(message) = stream.message().await.map_err(stream_error)? {
            match message.data {
                Some(load_resource_request::Data::Chunk(chunk)) => buffer.push(&chunk)?,
                _ => {
                    return Err(AppError::InvalidArgument(anyhow::anyhow!(
                        "Metadata may only be sent once"
                    )))
                }
            }
        }
        let data = buffer.finish()?;

        let resource = NewResource {
            table_name,
            record_id,
            file_name,
            content_type,
            file_size: metadata.file_size,
            description: non_empty(&metadata.description),
        };
        Ok((resource, data))
    }
}

#[tonic::async_trait]
impl FileManagementService for FileManagementServiceImpl {
    type GetResourceStream = ResourceStream;

    #[instrument(skip(self, request), fields(service = "erp-service", method = "GetAttachment"))]
    async fn get_attachment(
        &self,
        request: Request<GetAttachmentRequest>,
    ) -> GrpcResult<ProtoAttachment> {
        observe("GetAttachment", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let (table_name, record_id) = record_reference(&req.table_name, req.record_id)?;
            self.attachment(&table_name, record_id).await
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "SetAttachmentDescription")
    )]
    async fn set_attachment_description(
        &self,
        request: Request<SetAttachmentDescriptionRequest>,
    ) -> GrpcResult<ProtoAttachment> {
        observe("SetAttachmentDescription", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let (table_name, record_id) = record_reference(&req.table_name, req.record_id)?;

            let title = non_empty(&req.title);
            let text_msg = non_empty(&req.text_msg);
            self.db
                .set_attachment_description(
                    &table_name,
                    record_id,
                    title.as_deref(),
                    text_msg.as_deref(),
                )
                .await?;
            self.attachment(&table_name, record_id).await
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "LoadResource"))]
    async fn load_resource(
        &self,
        request: Request<Streaming<LoadResourceRequest>>,
    ) -> GrpcResult<ProtoResourceReference> {
        observe("LoadResource", async {
            self.sessions.authenticate(request.metadata()).await?;
            let mut stream = request.into_inner();
            let (resource, data) = self.receive_upload(&mut stream).await?;

            let resource_uuid = Uuid::new_v4().to_string();
            let key = storage_key(&resource.table_name, resource.record_id, &resource_uuid);
            self.storage.upload(&key, data).await?;

            if let Err(err) = self
                .db
                .create_resource_reference(&resource, &resource_uuid, &key)
                .await
            {
                if let Err(cleanup) = self.storage.delete(&key).await {
                    warn!(storage_key = %key, error = %cleanup, "Orphaned resource bytes");
                }
                return Err(err);
            }
            info!(
                resource_uuid = %resource_uuid,
                size = resource.file_size,
                "Resource loaded"
            );

            let stored = self.resource(&resource_uuid).await?;
            Ok(resource_to_proto(stored))
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "GetResourceReference")
    )]
    async fn get_resource_reference(
        &self,
        request: Request<GetResourceReferenceRequest>,
    ) -> GrpcResult<ProtoResourceReference> {
        observe("GetResourceReference", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let resource = self.resource(&req.uuid).await?;
            Ok(resource_to_proto(resource))
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "GetResource"))]
    async fn get_resource(
        &self,
        request: Request<GetResourceRequest>,
    ) -> GrpcResult<Self::GetResourceStream> {
        observe("GetResource", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let resource = self.resource(&req.uuid).await?;
            let data = self.storage.download(&resource.storage_key).await?;

            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(async move {
                for chunk in chunk_bytes(&data) {
                    if tx.send(Ok(GetResourceResponse { data: chunk })).await.is_err() {
                        return;
                    }
                }
            });

            let stream: Self::GetResourceStream = Box::pin(ReceiverStream::new(rx));
            Ok(stream)
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "DeleteResourceReference")
    )]
    async fn delete_resource_reference(
        &self,
        request: Request<DeleteResourceReferenceRequest>,
    ) -> GrpcResult<DeleteResourceReferenceResponse> {
        observe("DeleteResourceReference", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let resource = self.resource(&req.uuid).await?;

            self.db.delete_resource_reference(resource.id).await?;
            if let Err(err) = self.storage.delete(&resource.storage_key).await {
                warn!(storage_key = %resource.storage_key, error = %err, "Orphaned resource bytes");
            }
            info!(resource_uuid = %resource.uuid, "Resource deleted");
            Ok(DeleteResourceReferenceResponse {})
        })
        .await
    }
}
