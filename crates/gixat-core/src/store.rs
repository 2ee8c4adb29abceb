//! Store traits for tenant-scoped persistence
//!
//! Every tenant-owned operation takes an explicit [`OrganizationId`]. An
//! implementation must filter every read and write by it, so a row owned by
//! another organization behaves exactly like a missing row.
//!
//! Implementations:
//! - `SqliteGarageStore` in `gixat-store-sqlite`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::*;
use crate::{tenant::OrganizationId, Result};

/// Organizations (tenants) themselves
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Create an organization
    ///
    /// # Arguments
    /// * `input` - Name, address and an optional already-uploaded logo key
    /// * `admin` - User to attach to the new organization as `OrgAdmin`
    ///
    /// The organization, its logo media row and the admin assignment are
    /// written atomically.
    async fn create_organization(
        &self,
        input: NewOrganization,
        admin: Option<Uuid>,
    ) -> Result<Organization>;

    async fn get_organization(&self, id: Uuid) -> Result<Option<Organization>>;

    async fn list_organizations(&self) -> Result<Vec<Organization>>;

    /// # Errors
    /// - `Error::NotFound` with "Organization not found"
    async fn rename_organization(&self, org: OrganizationId, name: &str) -> Result<Organization>;
}

/// User accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    /// # Errors
    /// - `Error::BusinessRule` (`DuplicateEmail`) when the email is taken
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Create a user and, when `invite_id` is given, mark that invite
    /// accepted in the same transaction
    async fn register_user(&self, user: NewUser, invite_id: Option<Uuid>) -> Result<User>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Case-insensitive lookup
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Move a user into an organization, optionally changing their role.
    ///
    /// # Returns
    /// `false` when the user does not exist
    async fn assign_user_to_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        role: Option<UserRole>,
    ) -> Result<bool>;

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<User>;

    /// Replace the avatar key, returning the previous one
    async fn set_avatar(&self, user_id: Uuid, key: Option<String>) -> Result<Option<String>>;

    async fn list_organization_users(&self, org: OrganizationId) -> Result<Vec<User>>;

    /// A user, only if they belong to `org`
    async fn get_tenant_user(&self, org: OrganizationId, user_id: Uuid) -> Result<Option<User>>;
}

#[async_trait]
pub trait InviteStore: Send + Sync {
    async fn create_invite(&self, org: OrganizationId, invite: NewInvite) -> Result<UserInvite>;

    /// # Returns
    /// `false` when no such invite exists in `org`
    async fn cancel_invite(&self, org: OrganizationId, invite_id: Uuid) -> Result<bool>;

    /// Newest first
    async fn list_invites(&self, org: OrganizationId) -> Result<Vec<UserInvite>>;

    /// A Pending invite with this code whose expiry is after `now`.
    /// Not tenant-scoped: the code is the credential.
    async fn find_pending_invite(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserInvite>>;
}

/// Customers and their cars
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// # Errors
    /// - `Error::BusinessRule` (`DuplicateValue`) for a phone number or
    ///   email already used in the organization
    async fn create_customer(&self, org: OrganizationId, input: NewCustomer) -> Result<Customer>;

    async fn update_customer(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: CustomerUpdate,
    ) -> Result<Customer>;

    async fn get_customer(&self, org: OrganizationId, id: Uuid) -> Result<Option<Customer>>;

    /// Ordered by last name then first name. `search` matches names, email
    /// and phone case-insensitively.
    async fn list_customers(
        &self,
        org: OrganizationId,
        search: Option<&str>,
        page: Page,
    ) -> Result<Vec<Customer>>;

    /// # Errors
    /// - `Error::NotFound` when the customer is not in `org`
    /// - `Error::BusinessRule` (`DuplicateValue`) for a duplicate plate or VIN
    async fn create_car(&self, org: OrganizationId, input: NewCar) -> Result<Car>;

    async fn update_car(&self, org: OrganizationId, id: Uuid, update: CarUpdate) -> Result<Car>;

    async fn get_car(&self, org: OrganizationId, id: Uuid) -> Result<Option<Car>>;

    async fn list_cars(&self, org: OrganizationId, customer_id: Option<Uuid>) -> Result<Vec<Car>>;

    async fn customer_activity(
        &self,
        org: OrganizationId,
        customer_id: Uuid,
    ) -> Result<CustomerActivity>;

    async fn customer_statistics(
        &self,
        org: OrganizationId,
        now: DateTime<Utc>,
    ) -> Result<CustomerStatistics>;

    /// Rows for the CSV export, ordered by first name then last name
    async fn customer_export_rows(&self, org: OrganizationId) -> Result<Vec<CustomerExportRow>>;
}

/// The garage session workflow
///
/// Every status change appends a [`SessionLog`] in the same transaction.
#[async_trait]
pub trait GarageSessionStore: Send + Sync {
    /// Open a session at `Intake`
    ///
    /// # Errors
    /// - `Error::NotFound` when the car or customer is not in `org`
    /// - `Error::BusinessRule` (`ActiveSessionExists`) when the car already
    ///   has an active session
    async fn create_session(
        &self,
        org: OrganizationId,
        car_id: Uuid,
        customer_id: Uuid,
    ) -> Result<GarageSession>;

    async fn get_session(&self, org: OrganizationId, id: Uuid) -> Result<Option<GarageSession>>;

    /// Newest first
    async fn list_sessions(
        &self,
        org: OrganizationId,
        filter: SessionFilter,
        page: Page,
    ) -> Result<Vec<GarageSession>>;

    async fn update_session_status(
        &self,
        org: OrganizationId,
        id: Uuid,
        status: SessionStatus,
        notes: Option<String>,
    ) -> Result<GarageSession>;

    async fn update_intake(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: IntakeUpdate,
    ) -> Result<GarageSession>;

    async fn update_customer_requests(
        &self,
        org: OrganizationId,
        id: Uuid,
        requests: String,
    ) -> Result<GarageSession>;

    async fn update_inspection(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: InspectionUpdate,
    ) -> Result<GarageSession>;

    async fn update_test_drive(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: TestDriveUpdate,
    ) -> Result<GarageSession>;

    async fn generate_initial_report(
        &self,
        org: OrganizationId,
        id: Uuid,
        report: String,
    ) -> Result<GarageSession>;

    /// Oldest first
    async fn session_logs(&self, org: OrganizationId, session_id: Uuid) -> Result<Vec<SessionLog>>;

    async fn sessions_for_customer(
        &self,
        org: OrganizationId,
        customer_id: Uuid,
    ) -> Result<Vec<GarageSession>>;

    async fn sessions_for_car(&self, org: OrganizationId, car_id: Uuid)
        -> Result<Vec<GarageSession>>;
}

/// Job cards and their items
#[async_trait]
pub trait JobCardStore: Send + Sync {
    /// Build a job card from a session in `ReportGenerated`.
    ///
    /// Notes and items are derived from the session text fields, and the
    /// session moves to `JobCardCreated`.
    ///
    /// # Errors
    /// - `Error::NotFound` when the session is not in `org`
    /// - `Error::BusinessRule` (`InvalidSessionStatus`) for any other status
    async fn create_job_card_from_session(
        &self,
        org: OrganizationId,
        session_id: Uuid,
    ) -> Result<JobCard>;

    async fn get_job_card(&self, org: OrganizationId, id: Uuid) -> Result<Option<JobCard>>;

    async fn list_job_cards(
        &self,
        org: OrganizationId,
        filter: JobCardFilter,
        page: Page,
    ) -> Result<Vec<JobCard>>;

    async fn job_cards_for_session(
        &self,
        org: OrganizationId,
        session_id: Uuid,
    ) -> Result<Vec<JobCard>>;

    async fn job_items(&self, org: OrganizationId, job_card_id: Uuid) -> Result<Vec<JobItem>>;

    async fn get_job_item(&self, org: OrganizationId, id: Uuid) -> Result<Option<JobItem>>;

    /// Add an item and fold its estimates into the card totals
    async fn add_job_item(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
        item: NewJobItem,
    ) -> Result<JobItem>;

    /// Record progress on an item and recalculate the card's actual totals
    ///
    /// # Errors
    /// - `Error::BusinessRule` when completing without actual costs or
    ///   starting an unapproved item
    async fn update_job_item_status(
        &self,
        org: OrganizationId,
        item_id: Uuid,
        update: JobItemStatusUpdate,
    ) -> Result<JobItem>;

    /// # Errors
    /// - `Error::BusinessRule` (`OpenItemsRemaining`) when completing a card
    ///   with open items
    async fn update_job_card_status(
        &self,
        org: OrganizationId,
        id: Uuid,
        status: JobCardStatus,
    ) -> Result<JobCard>;

    async fn assign_technician_to_job_card(
        &self,
        org: OrganizationId,
        id: Uuid,
        technician_id: Uuid,
    ) -> Result<JobCard>;

    async fn assign_technician_to_job_item(
        &self,
        org: OrganizationId,
        item_id: Uuid,
        technician_id: Uuid,
    ) -> Result<JobItem>;

    /// Approve the card and every item on it
    async fn approve_job_card(
        &self,
        org: OrganizationId,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<JobCard>;

    async fn approve_job_item(
        &self,
        org: OrganizationId,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<JobItem>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn create_inventory_item(
        &self,
        org: OrganizationId,
        input: NewInventoryItem,
    ) -> Result<InventoryItem>;

    async fn update_inventory_item(
        &self,
        org: OrganizationId,
        update: InventoryItemUpdate,
    ) -> Result<InventoryItem>;

    /// Add `adjustment` (may be negative) to the stock level
    async fn adjust_inventory_quantity(
        &self,
        org: OrganizationId,
        id: Uuid,
        adjustment: Decimal,
        reason: Option<String>,
    ) -> Result<InventoryItem>;

    /// Soft delete; returns `false` when the item does not exist
    async fn delete_inventory_item(&self, org: OrganizationId, id: Uuid) -> Result<bool>;

    async fn get_inventory_item(&self, org: OrganizationId, id: Uuid)
        -> Result<Option<InventoryItem>>;

    async fn list_inventory_items(&self, org: OrganizationId) -> Result<Vec<InventoryItem>>;

    async fn low_stock_items(&self, org: OrganizationId) -> Result<Vec<InventoryItem>>;

    async fn search_inventory(&self, org: OrganizationId, term: &str)
        -> Result<Vec<InventoryItem>>;

    async fn inventory_by_category(
        &self,
        org: OrganizationId,
        category: &str,
    ) -> Result<Vec<InventoryItem>>;
}

/// Parts and labor booked against job items
///
/// Parts marked actual move inventory stock. Every stock change happens in
/// the same transaction as the part row change.
#[async_trait]
pub trait PartsLaborStore: Send + Sync {
    async fn add_part_to_job_item(
        &self,
        org: OrganizationId,
        input: NewJobItemPart,
    ) -> Result<JobItemPart>;

    async fn update_job_item_part(
        &self,
        org: OrganizationId,
        update: JobItemPartUpdate,
    ) -> Result<JobItemPart>;

    async fn remove_part_from_job_item(&self, org: OrganizationId, id: Uuid) -> Result<bool>;

    async fn parts_for_job_item(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
    ) -> Result<Vec<JobItemPart>>;

    /// # Errors
    /// - `Error::NotFound` ("Technician with ID '{id}' not found.") when the
    ///   technician is not a user of `org`
    async fn add_labor_entry(&self, org: OrganizationId, input: NewLaborEntry)
        -> Result<LaborEntry>;

    async fn update_labor_entry(
        &self,
        org: OrganizationId,
        update: LaborEntryUpdate,
    ) -> Result<LaborEntry>;

    async fn clock_out_labor_entry(
        &self,
        org: OrganizationId,
        id: Uuid,
        end_time: DateTime<Utc>,
    ) -> Result<LaborEntry>;

    async fn delete_labor_entry(&self, org: OrganizationId, id: Uuid) -> Result<bool>;

    async fn get_labor_entry(&self, org: OrganizationId, id: Uuid) -> Result<Option<LaborEntry>>;

    async fn labor_entries_by_job_item(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
    ) -> Result<Vec<LaborEntry>>;

    async fn labor_entries_by_technician(
        &self,
        org: OrganizationId,
        technician_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LaborEntry>>;

    async fn active_labor_entries(&self, org: OrganizationId) -> Result<Vec<LaborEntry>>;

    async fn labor_summary_by_job_card(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
    ) -> Result<LaborSummary>;
}

/// Job card discussion threads and @mentions
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Insert a comment and a mention row for every tenant user it names
    async fn add_comment(&self, org: OrganizationId, input: NewComment)
        -> Result<JobCardComment>;

    /// # Errors
    /// - `Error::Forbidden` when `author_id` did not write the comment
    async fn edit_comment(
        &self,
        org: OrganizationId,
        comment_id: Uuid,
        author_id: Uuid,
        content: String,
    ) -> Result<JobCardComment>;

    async fn delete_comment(
        &self,
        org: OrganizationId,
        comment_id: Uuid,
        author_id: Uuid,
    ) -> Result<bool>;

    /// Only mentions addressed to `user_id` are touched
    async fn mark_mentions_read(
        &self,
        org: OrganizationId,
        user_id: Uuid,
        mention_ids: &[Uuid],
    ) -> Result<bool>;

    async fn get_comment(&self, org: OrganizationId, id: Uuid) -> Result<Option<JobCardComment>>;

    async fn job_card_comments(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
    ) -> Result<Vec<JobCardComment>>;

    async fn job_item_comments(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
    ) -> Result<Vec<JobCardComment>>;

    async fn comment_replies(
        &self,
        org: OrganizationId,
        comment_id: Uuid,
    ) -> Result<Vec<JobCardComment>>;

    async fn comment_mentions(
        &self,
        org: OrganizationId,
        comment_id: Uuid,
    ) -> Result<Vec<JobCardCommentMention>>;

    async fn unread_mentions(
        &self,
        org: OrganizationId,
        user_id: Uuid,
    ) -> Result<Vec<JobCardCommentMention>>;

    async fn unread_mention_count(&self, org: OrganizationId, user_id: Uuid) -> Result<i64>;

    async fn recent_comments(&self, org: OrganizationId, take: i64)
        -> Result<Vec<JobCardComment>>;
}

/// Appointment booking
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Book an appointment after checking ownership, timing and conflicts.
    ///
    /// # Errors
    /// - `Error::BusinessRule` carrying the user-facing reason (customer or
    ///   car missing, bad interval, past start, slot taken, customer
    ///   double-booked)
    async fn create_appointment(
        &self,
        org: OrganizationId,
        input: NewAppointment,
        created_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Appointment>;

    async fn update_appointment(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment>;

    async fn update_appointment_status(
        &self,
        org: OrganizationId,
        id: Uuid,
        status: AppointmentStatus,
        cancellation_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Appointment>;

    /// Open an `Intake` session for the appointment and link it
    async fn convert_appointment_to_session(
        &self,
        org: OrganizationId,
        id: Uuid,
    ) -> Result<Appointment>;

    async fn delete_appointment(&self, org: OrganizationId, id: Uuid) -> Result<bool>;

    async fn get_appointment(&self, org: OrganizationId, id: Uuid) -> Result<Option<Appointment>>;

    /// Ordered by start time
    async fn list_appointments(
        &self,
        org: OrganizationId,
        status: Option<AppointmentStatus>,
        page: Page,
    ) -> Result<Vec<Appointment>>;

    /// Appointments whose start is in `[start, end)`
    async fn appointments_by_date_range(
        &self,
        org: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>>;

    /// Intervals of slot-blocking appointments starting in `[start, end)`
    async fn busy_intervals(
        &self,
        org: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        technician_id: Option<Uuid>,
    ) -> Result<Vec<BusyInterval>>;

    async fn customer_upcoming_appointments(
        &self,
        org: OrganizationId,
        customer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Appointment>>;

    async fn customer_appointments(
        &self,
        org: OrganizationId,
        customer_id: Uuid,
    ) -> Result<Vec<Appointment>>;

    async fn technician_appointments(
        &self,
        org: OrganizationId,
        technician_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>>;
}

/// Global lookup data. Not tenant-scoped.
#[async_trait]
pub trait LookupStore: Send + Sync {
    async fn lookup_items(
        &self,
        category: Option<&str>,
        parent_id: Option<Uuid>,
    ) -> Result<Vec<LookupItem>>;

    async fn create_lookup_item(&self, input: NewLookupItem) -> Result<LookupItem>;

    /// Insert the built-in lookup data; safe to run repeatedly.
    ///
    /// # Returns
    /// Number of rows inserted by this call
    async fn seed_lookups(&self) -> Result<usize>;
}

/// Media rows and their attachments
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn create_media(&self, org: Option<OrganizationId>, media: NewMedia) -> Result<Media>;

    /// Unscoped; callers reach media through an already scoped parent
    async fn get_media(&self, id: Uuid) -> Result<Option<Media>>;

    /// Attaching a key the session already holds returns the existing link
    async fn attach_session_media(
        &self,
        org: OrganizationId,
        session_id: Uuid,
        media: NewMedia,
        stage: SessionStage,
    ) -> Result<SessionMedia>;

    async fn session_media(&self, org: OrganizationId, session_id: Uuid)
        -> Result<Vec<SessionMedia>>;

    /// Attachment of the object at `key` to `session_id`, if one exists
    async fn session_media_by_key(
        &self,
        org: OrganizationId,
        session_id: Uuid,
        key: &str,
    ) -> Result<Option<SessionMedia>>;

    /// Remove a session attachment and its media row.
    ///
    /// # Returns
    /// The deleted media so the caller can remove the object, or `None` when
    /// nothing matched in `org`
    async fn delete_session_media(&self, org: OrganizationId, media_id: Uuid)
        -> Result<Option<Media>>;

    async fn attach_job_card_media(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
        media: NewMedia,
        media_type: JobCardMediaType,
    ) -> Result<JobCardMedia>;

    async fn job_card_media(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
    ) -> Result<Vec<JobCardMedia>>;

    async fn attach_job_item_media(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
        media: NewMedia,
        media_type: JobCardMediaType,
    ) -> Result<JobItemMedia>;

    async fn job_item_media(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
    ) -> Result<Vec<JobItemMedia>>;

    /// Organization owning the entity behind a media path, if it exists
    async fn media_owner_organization(&self, owner: MediaOwner) -> Result<Option<Uuid>>;
}

/// Everything the API needs from persistence
#[async_trait]
pub trait GarageStore:
    OrganizationStore
    + UserStore
    + InviteStore
    + CustomerStore
    + GarageSessionStore
    + JobCardStore
    + InventoryStore
    + PartsLaborStore
    + CommentStore
    + AppointmentStore
    + LookupStore
    + MediaStore
{
    /// Cheap connectivity probe used by readiness and health checks
    async fn ping(&self) -> Result<()>;
}
