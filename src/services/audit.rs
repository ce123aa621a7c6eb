use crate::api::error::AppError;
use crate::entities::{audit_logs, prelude::*};
use crate::models::{AuditAction, AuditQuery, Identity, Page, RequestContext, Role, fetch_page};
use crate::services::authorization;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// One append-only audit record, as handed to a sink.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: String,
    pub actor_external_id: String,
    pub action: AuditAction,
    pub details: Value,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Where audit entries end up. Only appends; there is no update or delete.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> anyhow::Result<()>;
}

/// Persists entries to the `audit_logs` table.
pub struct DatabaseAuditSink {
    db: DatabaseConnection,
}

impl DatabaseAuditSink {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for DatabaseAuditSink {
    async fn append(&self, entry: AuditEntry) -> anyhow::Result<()> {
        audit_logs::ActiveModel {
            id: Set(entry.id),
            actor_external_id: Set(entry.actor_external_id),
            action: Set(entry.action),
            details: Set(entry.details),
            source_ip: Set(entry.source_ip),
            user_agent: Set(entry.user_agent),
            timestamp: Set(entry.timestamp),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}

/// Fire-and-forget audit trail. `record` never fails and never waits on the sink.
#[derive(Clone)]
pub struct AuditService {
    db: DatabaseConnection,
    sink: Arc<dyn AuditSink>,
}

impl AuditService {
    pub fn new(db: DatabaseConnection) -> Self {
        let sink = Arc::new(DatabaseAuditSink::new(db.clone()));
        Self { db, sink }
    }

    pub fn with_sink(db: DatabaseConnection, sink: Arc<dyn AuditSink>) -> Self {
        Self { db, sink }
    }

    pub fn record(
        &self,
        actor_external_id: &str,
        action: AuditAction,
        details: Value,
        context: Option<&RequestContext>,
    ) {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            actor_external_id: actor_external_id.to_string(),
            action,
            details,
            source_ip: context.and_then(|c| c.source_ip.clone()),
            user_agent: context.and_then(|c| c.user_agent.clone()),
            timestamp: Utc::now(),
        };

        info!(
            target: "audit",
            action = %entry.action,
            actor = %entry.actor_external_id,
            details = %entry.details,
            "Audit Event Occurred"
        );

        let sink = self.sink.clone();
        tokio::spawn(async move {
            let action = entry.action;
            if let Err(e) = sink.append(entry).await {
                error!("Failed to persist audit log ({}): {:#}", action, e);
            }
        });
    }

    /// Admin-only read of the trail, newest first.
    pub async fn list(
        &self,
        actor: &Identity,
        query: &AuditQuery,
    ) -> Result<Page<audit_logs::Model>, AppError> {
        authorization::require_role(actor, Role::Admin)?;

        let mut select = AuditLogs::find();
        if let Some(action) = query.action {
            select = select.filter(audit_logs::Column::Action.eq(action));
        }
        if let Some(actor_id) = &query.actor_external_id {
            select = select.filter(audit_logs::Column::ActorExternalId.eq(actor_id.as_str()));
        }

        let paginator = select
            .order_by_desc(audit_logs::Column::Timestamp)
            .order_by_desc(audit_logs::Column::Id)
            .paginate(&self.db, query.page_size.max(1));

        Ok(fetch_page(paginator, query.page, query.page_size).await?)
    }
}
