//! # LabStock Service
//!
//! The facade the HTTP handlers call. Every operation runs its database
//! procedure through `labstock-db` and then performs the side effects that
//! live outside the transaction.
//!
//! ## Ordering of Side Effects
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_request(input, proof)                                          │
//! │    1. store proof file            (fails → nothing written)            │
//! │    2. db transaction              (fails → stored file removed)        │
//! │    3. notify RequestCreated       (best effort, never fails the call)  │
//! │                                                                        │
//! │  reject_request / delete_request                                       │
//! │    1. db transaction              (reject clears file_url)             │
//! │    2. delete proof file           (best effort, logged)                │
//! │    3. notify                      (reject only)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::notify::{ChannelNotifier, Notification, NotificationSink};
use crate::storage::{FileStore, LocalFileStore, Upload};
use labstock_core::input::{
    ComponentStatusFilter, ComponentUpdate, LoanFilter, LowStockFilter, MovementFilter,
    NewAcademicPeriod, NewComponent, NewMovement, NewRequest, RequestFilter,
};
use labstock_core::report::{
    ComponentLoanCount, ComponentStock, DeletedRequest, LoanDurationSummary, PeriodReport,
    PeriodSummary, RequestWithPeriod, ReturnTimeComparison,
};
use labstock_core::{
    AcademicPeriod, Actor, Availability, Category, Component, ComponentMovement, LoanHistory,
    LoanStatus, Request, RequestPeriod,
};
use labstock_db::Database;

/// Inventory and loan operations with their side effects.
pub struct LabService<F: FileStore = LocalFileStore> {
    db: Database,
    notifier: Arc<dyn NotificationSink>,
    files: F,
}

impl LabService<LocalFileStore> {
    /// Connects to the configured database and wires the channel notifier
    /// and local file store. The receiver feeds the mail worker.
    pub async fn from_config(
        config: &ServiceConfig,
    ) -> ServiceResult<(Self, mpsc::Receiver<Notification>)> {
        let db = Database::new(config.db_config()).await?;
        let (notifier, rx) = ChannelNotifier::new(config.notify_capacity);
        let files = LocalFileStore::new(
            config.upload_dir.clone(),
            config.public_upload_prefix.clone(),
        );

        info!(
            database = %config.database_path.display(),
            uploads = %config.upload_dir.display(),
            "LabStock service ready"
        );
        Ok((LabService::new(db, Arc::new(notifier), files), rx))
    }
}

impl<F: FileStore> LabService<F> {
    pub fn new(db: Database, notifier: Arc<dyn NotificationSink>, files: F) -> Self {
        LabService {
            db,
            notifier,
            files,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn create_category(&self, name: &str) -> ServiceResult<Category> {
        Ok(self.db.categories().create(name).await?)
    }

    pub async fn list_categories(&self) -> ServiceResult<Vec<Category>> {
        Ok(self.db.categories().list().await?)
    }

    pub async fn get_category(&self, id: i64) -> ServiceResult<Category> {
        Ok(self.db.categories().get(id).await?)
    }

    pub async fn rename_category(&self, id: i64, name: &str) -> ServiceResult<Category> {
        Ok(self.db.categories().rename(id, name).await?)
    }

    pub async fn delete_category(&self, id: i64) -> ServiceResult<Category> {
        Ok(self.db.categories().delete(id).await?)
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Creates a component with its initial stock movement. An uploaded image
    /// is stored first and removed again if the transaction fails.
    pub async fn create_component(
        &self,
        mut input: NewComponent,
        image: Option<Upload>,
    ) -> ServiceResult<Component> {
        let stored = self.store_upload(image).await?;
        if stored.is_some() {
            input.image_url = stored.clone();
        }

        match self.db.components().create_with_stock(&input).await {
            Ok(component) => Ok(component),
            Err(e) => {
                self.discard_upload(stored.as_deref()).await;
                Err(e.into())
            }
        }
    }

    pub async fn get_component(&self, id: i64) -> ServiceResult<Component> {
        Ok(self.db.components().get(id).await?)
    }

    pub async fn list_components(
        &self,
        filter: ComponentStatusFilter,
    ) -> ServiceResult<Vec<ComponentStock>> {
        Ok(self.db.components().list(filter).await?)
    }

    pub async fn component_availability(&self, id: i64) -> ServiceResult<Availability> {
        Ok(self.db.components().availability(id).await?)
    }

    pub async fn check_component_availability(
        &self,
        id: i64,
        requested: i64,
    ) -> ServiceResult<Availability> {
        Ok(self.db.components().check_availability(id, requested).await?)
    }

    pub async fn search_components(&self, fragment: &str) -> ServiceResult<Vec<Component>> {
        Ok(self.db.components().search_by_name(fragment).await?)
    }

    pub async fn low_stock_components(
        &self,
        filter: &LowStockFilter,
    ) -> ServiceResult<Vec<Component>> {
        Ok(self.db.components().low_stock(filter).await?)
    }

    pub async fn filter_components(&self, category_ids: &[i64]) -> ServiceResult<Vec<Component>> {
        Ok(self.db.components().filter_by_categories(category_ids).await?)
    }

    /// Edits component metadata. A new image replaces the stored one.
    pub async fn update_component(
        &self,
        id: i64,
        mut changes: ComponentUpdate,
        image: Option<Upload>,
    ) -> ServiceResult<Component> {
        let previous = self.db.components().get(id).await?;
        let stored = self.store_upload(image).await?;
        if stored.is_some() {
            changes.image_url = stored.clone();
        }

        match self.db.components().update(id, &changes).await {
            Ok(component) => {
                if changes.image_url.is_some() && previous.image_url != component.image_url {
                    self.discard_upload(previous.image_url.as_deref()).await;
                }
                Ok(component)
            }
            Err(e) => {
                self.discard_upload(stored.as_deref()).await;
                Err(e.into())
            }
        }
    }

    pub async fn delete_component(&self, id: i64) -> ServiceResult<Component> {
        let component = self.db.components().delete(id).await?;
        self.discard_upload(component.image_url.as_deref()).await;
        Ok(component)
    }

    // =========================================================================
    // Movements
    // =========================================================================

    pub async fn create_movement(&self, input: &NewMovement) -> ServiceResult<ComponentMovement> {
        Ok(self.db.movements().create(input).await?)
    }

    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> ServiceResult<Vec<ComponentMovement>> {
        Ok(self.db.movements().list(filter).await?)
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Creates a pending request. A proof file is stored before the
    /// transaction and removed if it fails.
    pub async fn create_request(
        &self,
        mut input: NewRequest,
        proof: Option<Upload>,
    ) -> ServiceResult<Request> {
        let stored = self.store_upload(proof).await?;
        if stored.is_some() {
            input.file_url = stored.clone();
        }

        let request = match self.db.requests().create(&input).await {
            Ok(request) => request,
            Err(e) => {
                self.discard_upload(stored.as_deref()).await;
                return Err(e.into());
            }
        };

        self.notifier.notify(Notification::RequestCreated {
            request_id: request.request_id,
            user_id: request.user_id,
        });
        Ok(request)
    }

    pub async fn get_request(&self, id: i64) -> ServiceResult<Request> {
        Ok(self.db.requests().get(id).await?)
    }

    pub async fn list_requests(&self, filter: &RequestFilter) -> ServiceResult<Vec<Request>> {
        Ok(self.db.requests().list(filter).await?)
    }

    pub async fn requests_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<Vec<Request>> {
        Ok(self.db.requests().due_between(from, to).await?)
    }

    pub async fn request_events(&self, id: i64) -> ServiceResult<Vec<RequestPeriod>> {
        Ok(self.db.requests().period_events(id).await?)
    }

    pub async fn accept_request(&self, id: i64) -> ServiceResult<Request> {
        let request = self.db.requests().accept(id).await?;
        self.notifier.notify(Notification::RequestAccepted {
            request_id: request.request_id,
            user_id: request.user_id,
        });
        Ok(request)
    }

    /// Rejects a pending request. The proof file is removed once the
    /// request no longer references it.
    pub async fn reject_request(&self, id: i64, notes: &str) -> ServiceResult<Request> {
        let rejected = self.db.requests().reject(id, notes).await?;
        self.discard_upload(rejected.detached_file_url.as_deref()).await;
        let request = rejected.request;
        self.notifier.notify(Notification::RequestRejected {
            request_id: request.request_id,
            user_id: request.user_id,
            reason: request.admin_notes.clone().unwrap_or_default(),
        });
        Ok(request)
    }

    pub async fn finalize_request(
        &self,
        id: i64,
        admin_notes: Option<String>,
    ) -> ServiceResult<RequestWithPeriod> {
        Ok(self.db.requests().finalize(id, admin_notes).await?)
    }

    pub async fn mark_not_returned(
        &self,
        id: i64,
        admin_notes: Option<String>,
    ) -> ServiceResult<RequestWithPeriod> {
        Ok(self.db.requests().mark_not_returned(id, admin_notes).await?)
    }

    pub async fn update_return_date(
        &self,
        id: i64,
        actor: &Actor,
        return_date: DateTime<Utc>,
    ) -> ServiceResult<Request> {
        Ok(self
            .db
            .requests()
            .update_return_date(id, actor, return_date)
            .await?)
    }

    pub async fn delete_request(&self, id: i64, actor: &Actor) -> ServiceResult<DeletedRequest> {
        let deleted = self.db.requests().delete(id, actor).await?;
        self.discard_upload(deleted.request.file_url.as_deref()).await;
        Ok(deleted)
    }

    // =========================================================================
    // Academic Periods
    // =========================================================================

    pub async fn create_period(&self, input: &NewAcademicPeriod) -> ServiceResult<AcademicPeriod> {
        Ok(self.db.periods().create(input).await?)
    }

    pub async fn list_periods(&self, include_stats: bool) -> ServiceResult<Vec<PeriodSummary>> {
        Ok(self.db.periods().list(include_stats).await?)
    }

    pub async fn get_period(&self, id: i64) -> ServiceResult<AcademicPeriod> {
        Ok(self.db.periods().get(id).await?)
    }

    pub async fn active_period(&self) -> ServiceResult<Option<AcademicPeriod>> {
        Ok(self.db.periods().active().await?)
    }

    pub async fn update_period(
        &self,
        id: i64,
        input: &NewAcademicPeriod,
    ) -> ServiceResult<AcademicPeriod> {
        Ok(self.db.periods().update(id, input).await?)
    }

    pub async fn set_active_period(&self, id: i64) -> ServiceResult<AcademicPeriod> {
        Ok(self.db.periods().set_active(id).await?)
    }

    pub async fn delete_period(&self, id: i64) -> ServiceResult<AcademicPeriod> {
        Ok(self.db.periods().delete(id).await?)
    }

    pub async fn period_report(&self, id: i64) -> ServiceResult<PeriodReport> {
        Ok(self.db.periods().report(id).await?)
    }

    // =========================================================================
    // Loan Reports
    // =========================================================================

    pub async fn current_loans(&self, filter: &LoanFilter) -> ServiceResult<Vec<LoanHistory>> {
        Ok(self.db.loans().current(filter).await?)
    }

    pub async fn not_returned_loans(&self, filter: &LoanFilter) -> ServiceResult<Vec<LoanHistory>> {
        Ok(self.db.loans().not_returned(filter).await?)
    }

    pub async fn loans_by_user(&self, user_id: i64) -> ServiceResult<Vec<LoanHistory>> {
        Ok(self.db.loans().by_user(user_id).await?)
    }

    pub async fn loans_by_period(
        &self,
        period_id: i64,
        status: Option<LoanStatus>,
    ) -> ServiceResult<Vec<LoanHistory>> {
        Ok(self.db.loans().by_period(period_id, status).await?)
    }

    pub async fn most_requested_components(
        &self,
        filter: &LoanFilter,
    ) -> ServiceResult<Vec<ComponentLoanCount>> {
        Ok(self.db.loans().most_requested(filter).await?)
    }

    pub async fn return_time_comparison(
        &self,
        filter: &LoanFilter,
    ) -> ServiceResult<Vec<ReturnTimeComparison>> {
        Ok(self.db.loans().return_time_comparison(filter).await?)
    }

    pub async fn average_loan_duration(&self) -> ServiceResult<LoanDurationSummary> {
        Ok(self.db.loans().average_duration().await?)
    }

    // =========================================================================
    // Uploads
    // =========================================================================

    async fn store_upload(&self, upload: Option<Upload>) -> ServiceResult<Option<String>> {
        match upload {
            Some(upload) => self
                .files
                .store(upload)
                .await
                .map(Some)
                .map_err(|e| ServiceError::storage(e.to_string())),
            None => Ok(None),
        }
    }

    async fn discard_upload(&self, url: Option<&str>) {
        if let Some(url) = url {
            if let Err(e) = self.files.delete(url).await {
                warn!(url, error = %e, "Failed to remove stored file");
            }
        }
    }
}
