//! IssueService gRPC implementation: issues (requests) and their comments.

use crate::grpc::proto::issue::{
    issue_service_server::IssueService, CreateIssueCommentRequest, CreateIssueRequest,
    DeleteIssueCommentRequest, DeleteIssueCommentResponse, DeleteIssueRequest,
    DeleteIssueResponse, Issue as ProtoIssue, IssueComment as ProtoIssueComment,
    IssueStatus as ProtoIssueStatus, ListIssueCommentsRequest, ListIssueCommentsResponse,
    ListIssuesRequest, ListIssuesResponse, Priority as ProtoPriority, UpdateIssueCommentRequest,
    UpdateIssueRequest,
};
use crate::grpc::{
    assemble_page, format_date, observe, page_request, parse_date, positive, timestamp,
};
use crate::models::{
    non_empty, CreateIssue, Issue, IssueComment, IssuePriority, IssueStatus, ListIssuesFilter,
    RecordKey, UpdateIssue,
};
use crate::services::{Database, SessionContext, SessionManager};
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::sync::Arc;
use tonic::Request;
use tracing::{info, instrument};

pub struct IssueServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
}

fn priority_from_proto(value: i32) -> Option<IssuePriority> {
    match ProtoPriority::try_from(value).ok()? {
        ProtoPriority::Unspecified => None,
        ProtoPriority::Urgent => Some(IssuePriority::Urgent),
        ProtoPriority::High => Some(IssuePriority::High),
        ProtoPriority::Medium => Some(IssuePriority::Medium),
        ProtoPriority::Low => Some(IssuePriority::Low),
        ProtoPriority::Minor => Some(IssuePriority::Minor),
    }
}

fn priority_to_proto(priority: IssuePriority) -> ProtoPriority {
    match priority {
        IssuePriority::Urgent => ProtoPriority::Urgent,
        IssuePriority::High => ProtoPriority::High,
        IssuePriority::Medium => ProtoPriority::Medium,
        IssuePriority::Low => ProtoPriority::Low,
        IssuePriority::Minor => ProtoPriority::Minor,
    }
}

fn status_from_proto(value: i32) -> Option<IssueStatus> {
    match ProtoIssueStatus::try_from(value).ok()? {
        ProtoIssueStatus::Unspecified => None,
        ProtoIssueStatus::Open => Some(IssueStatus::Open),
        ProtoIssueStatus::InProgress => Some(IssueStatus::InProgress),
        ProtoIssueStatus::Closed => Some(IssueStatus::Closed),
    }
}

fn status_to_proto(status: IssueStatus) -> ProtoIssueStatus {
    match status {
        IssueStatus::Open => ProtoIssueStatus::Open,
        IssueStatus::InProgress => ProtoIssueStatus::InProgress,
        IssueStatus::Closed => ProtoIssueStatus::Closed,
    }
}

fn issue_to_proto(issue: &Issue) -> ProtoIssue {
    ProtoIssue {
        id: issue.id,
        uuid: issue.uuid.clone(),
        document_no: issue.document_no.clone(),
        subject: issue.subject.clone(),
        summary: issue.summary.clone().unwrap_or_default(),
        priority: priority_to_proto(IssuePriority::from_string(&issue.priority)) as i32,
        status: status_to_proto(IssueStatus::from_string(&issue.status)) as i32,
        created_by_id: issue.created_by,
        created_by_name: issue.created_by_name.clone().unwrap_or_default(),
        sales_representative_id: issue.sales_representative_id.unwrap_or_default(),
        sales_representative_name: issue.sales_representative_name.clone().unwrap_or_default(),
        table_name: issue.table_name.clone().unwrap_or_default(),
        record_id: issue.record_id.unwrap_or_default(),
        due_date: format_date(issue.due_date),
        created_at: timestamp(&issue.created_at),
        updated_at: timestamp(&issue.updated_at),
    }
}

fn comment_to_proto(comment: &IssueComment) -> ProtoIssueComment {
    ProtoIssueComment {
        id: comment.id,
        uuid: comment.uuid.clone(),
        issue_id: comment.issue_id,
        user_id: comment.user_id,
        user_name: comment.user_name.clone().unwrap_or_default(),
        result: comment.result.clone(),
        created_at: timestamp(&comment.created_at),
        updated_at: timestamp(&comment.updated_at),
    }
}

/// Only the author may change or remove a comment.
fn ensure_author(context: &SessionContext, comment: &IssueComment) -> Result<(), AppError> {
    if comment.user_id != context.user_id() {
        return Err(AppError::AccessDenied(anyhow::anyhow!(
            "Only the author can change comment {}",
            comment.uuid
        )));
    }
    Ok(())
}

impl IssueServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager) -> Self {
        Self { db, sessions }
    }

    async fn issue(&self, key: &RecordKey) -> Result<Issue, AppError> {
        self.db
            .get_issue(key)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Issue {} not found", key)))
    }

    async fn comment(&self, id: i64, uuid: &str) -> Result<IssueComment, AppError> {
        let key = RecordKey::resolve(id, uuid, "id")?;
        self.db
            .get_issue_comment(&key)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Issue comment {} not found", key)))
    }

    async fn sales_representative(&self, id: i64) -> Result<Option<i64>, AppError> {
        let Some(id) = positive(id) else {
            return Ok(None);
        };
        if !self.db.user_exists(id).await? {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Sales representative {} not found",
                id
            )));
        }
        Ok(Some(id))
    }
}

#[tonic::async_trait]
impl IssueService for IssueServiceImpl {
    #[instrument(skip(self, request), fields(service = "erp-service", method = "ListIssues"))]
    async fn list_issues(
        &self,
        request: Request<ListIssuesRequest>,
    ) -> GrpcResult<ListIssuesResponse> {
        observe("ListIssues", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let filter = ListIssuesFilter {
                search_value: req.search_value,
                status: status_from_proto(req.status),
                priority: priority_from_proto(req.priority),
                table_name: req.table_name,
                record_id: req.record_id,
            };
            let rows = self.db.list_issues(&filter, page).await?;
            let page = assemble_page(&context, page, rows, |i| issue_to_proto(&i));
            Ok(ListIssuesResponse {
                record_count: page.record_count,
                issues: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "CreateIssue"))]
    async fn create_issue(&self, request: Request<CreateIssueRequest>) -> GrpcResult<ProtoIssue> {
        observe("CreateIssue", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();

            let subject = non_empty(&req.subject).ok_or_else(|| AppError::mandatory("subject"))?;
            let input = CreateIssue {
                subject,
                summary: non_empty(&req.summary),
                priority: priority_from_proto(req.priority).unwrap_or(IssuePriority::Medium),
                created_by: context.user_id(),
                sales_representative_id: self
                    .sales_representative(req.sales_representative_id)
                    .await?,
                table_name: non_empty(&req.table_name),
                record_id: positive(req.record_id),
                due_date: parse_date("due_date", &req.due_date)?,
            };

            let id = self.db.create_issue(&input).await?;
            let issue = self.issue(&RecordKey::Id(id)).await?;
            Ok(issue_to_proto(&issue))
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "UpdateIssue"))]
    async fn update_issue(&self, request: Request<UpdateIssueRequest>) -> GrpcResult<ProtoIssue> {
        observe("UpdateIssue", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.id, &req.uuid, "id")?;
            let issue = self.issue(&key).await?;

            let update = UpdateIssue {
                subject: non_empty(&req.subject),
                summary: non_empty(&req.summary),
                priority: priority_from_proto(req.priority),
                status: status_from_proto(req.status),
                sales_representative_id: self
                    .sales_representative(req.sales_representative_id)
                    .await?,
                due_date: parse_date("due_date", &req.due_date)?,
            };
            self.db.update_issue(issue.id, &update).await?;
            info!(issue_id = issue.id, "Issue updated");

            let issue = self.issue(&RecordKey::Id(issue.id)).await?;
            Ok(issue_to_proto(&issue))
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "DeleteIssue"))]
    async fn delete_issue(
        &self,
        request: Request<DeleteIssueRequest>,
    ) -> GrpcResult<DeleteIssueResponse> {
        observe("DeleteIssue", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.id, &req.uuid, "id")?;
            let issue = self.issue(&key).await?;
            self.db.delete_issue(issue.id).await?;
            Ok(DeleteIssueResponse {})
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "ListIssueComments")
    )]
    async fn list_issue_comments(
        &self,
        request: Request<ListIssueCommentsRequest>,
    ) -> GrpcResult<ListIssueCommentsResponse> {
        observe("ListIssueComments", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.issue_id, &req.issue_uuid, "issue_id")?;
            let issue = self.issue(&key).await?;
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let rows = self.db.list_issue_comments(issue.id, page).await?;
            let page = assemble_page(&context, page, rows, |c| comment_to_proto(&c));
            Ok(ListIssueCommentsResponse {
                record_count: page.record_count,
                comments: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "CreateIssueComment")
    )]
    async fn create_issue_comment(
        &self,
        request: Request<CreateIssueCommentRequest>,
    ) -> GrpcResult<ProtoIssueComment> {
        observe("CreateIssueComment", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.issue_id, &req.issue_uuid, "issue_id")?;
            let result = non_empty(&req.result).ok_or_else(|| AppError::mandatory("result"))?;
            let issue = self.issue(&key).await?;

            let id = self
                .db
                .create_issue_comment(issue.id, context.user_id(), &result)
                .await?;
            let comment = self.comment(id, "").await?;
            Ok(comment_to_proto(&comment))
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "UpdateIssueComment")
    )]
    async fn update_issue_comment(
        &self,
        request: Request<UpdateIssueCommentRequest>,
    ) -> GrpcResult<ProtoIssueComment> {
        observe("UpdateIssueComment", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let comment = self.comment(req.id, &req.uuid).await?;
            ensure_author(&context, &comment)?;
            let result = non_empty(&req.result).ok_or_else(|| AppError::mandatory("result"))?;

            self.db.update_issue_comment(comment.id, &result).await?;
            let comment = self.comment(comment.id, "").await?;
            Ok(comment_to_proto(&comment))
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "DeleteIssueComment")
    )]
    async fn delete_issue_comment(
        &self,
        request: Request<DeleteIssueCommentRequest>,
    ) -> GrpcResult<DeleteIssueCommentResponse> {
        observe("DeleteIssueComment", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let comment = self.comment(req.id, &req.uuid).await?;
            ensure_author(&context, &comment)?;
            self.db.delete_issue_comment(comment.id).await?;
            Ok(DeleteIssueCommentResponse {})
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_enums_mean_no_filter() {
        assert_eq!(priority_from_proto(0), None);
        assert_eq!(status_from_proto(0), None);
        assert_eq!(
            status_from_proto(ProtoIssueStatus::InProgress as i32),
            Some(IssueStatus::InProgress)
        );
    }

    #[test]
    fn stored_codes_map_to_wire_enums() {
        for priority in [
            IssuePriority::Urgent,
            IssuePriority::High,
            IssuePriority::Medium,
            IssuePriority::Low,
            IssuePriority::Minor,
        ] {
            let wire = priority_to_proto(priority) as i32;
            assert_eq!(priority_from_proto(wire), Some(priority));
        }
    }
}
