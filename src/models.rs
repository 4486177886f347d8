use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(AccountRole { Admin, User });
string_enum!(RecordStatus { Active, Inactive });
string_enum!(RequestStatus { Pending, Approved, Rejected });
string_enum!(WorkflowStatus { Pending, Approved, Rejected, Completed });
string_enum!(
    /// Kinds of history record written by the service itself; clients may
    /// record other kinds.
    WorkflowKind { RequestApproval, RequestStatusChange, DepartmentTransfer, Onboarding }
);

// Accounts

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Account {
    pub id: Uuid,
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[schema(example = "Ms")]
    pub title: Option<String>,
    #[schema(example = "Alice")]
    pub first_name: String,
    #[schema(example = "Smith")]
    pub last_name: String,
    #[schema(example = "User")]
    pub role: String,
    #[schema(example = "Active")]
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::accounts)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub title: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::accounts)]
pub struct AccountChanges {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub title: Option<Option<String>>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

impl AccountChanges {
    /// True when no column other than the timestamp would change.
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password_hash.is_none()
            && self.title.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.role.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::refresh_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RefreshToken {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    #[schema(example = "127.0.0.1")]
    pub created_by_ip: Option<String>,
    pub revoked_at: Option<NaiveDateTime>,
    pub account_id: Uuid,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::refresh_tokens)]
pub struct NewRefreshToken {
    pub account_id: Uuid,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
    pub created_by_ip: Option<String>,
}

// Departments

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::departments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Department {
    pub id: Uuid,
    #[schema(example = "Engineering")]
    pub name: String,
    #[schema(example = "Builds and runs the product")]
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::departments)]
pub struct NewDepartment {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::departments)]
pub struct DepartmentChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub updated_at: Option<NaiveDateTime>,
}

impl DepartmentChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

// Employees

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::employees)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Employee {
    pub id: Uuid,
    #[schema(example = "EMP-0001")]
    pub employee_code: String,
    #[schema(example = "Backend Engineer")]
    pub position: String,
    pub hire_date: NaiveDateTime,
    #[schema(example = "Active")]
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub account_id: Uuid,
    pub department_id: Option<Uuid>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::employees)]
pub struct NewEmployee {
    pub employee_code: String,
    pub position: String,
    pub hire_date: NaiveDateTime,
    pub status: Option<String>,
    pub account_id: Uuid,
    pub department_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::employees)]
pub struct EmployeeChanges {
    pub employee_code: Option<String>,
    pub position: Option<String>,
    pub hire_date: Option<NaiveDateTime>,
    pub status: Option<String>,
    pub department_id: Option<Option<Uuid>>,
    pub updated_at: Option<NaiveDateTime>,
}

impl EmployeeChanges {
    pub fn is_empty(&self) -> bool {
        self.employee_code.is_none()
            && self.position.is_none()
            && self.hire_date.is_none()
            && self.status.is_none()
            && self.department_id.is_none()
    }
}

// Requests

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Request {
    pub id: Uuid,
    #[schema(example = "Equipment")]
    pub request_type: String,
    #[schema(example = "Pending")]
    pub status: String,
    #[schema(example = "New laptop for onboarding")]
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub employee_id: Uuid,
    pub approver_id: Option<Uuid>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::requests)]
pub struct NewRequest {
    pub request_type: String,
    pub description: Option<String>,
    pub employee_id: Uuid,
    pub approver_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::requests)]
pub struct RequestChanges {
    pub request_type: Option<String>,
    pub status: Option<String>,
    pub description: Option<Option<String>>,
    pub approver_id: Option<Option<Uuid>>,
    pub updated_at: Option<NaiveDateTime>,
}

impl RequestChanges {
    pub fn is_empty(&self) -> bool {
        self.request_type.is_none()
            && self.status.is_none()
            && self.description.is_none()
            && self.approver_id.is_none()
    }
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::request_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RequestItem {
    pub id: Uuid,
    #[schema(example = "Laptop")]
    pub name: String,
    #[schema(example = 1)]
    pub quantity: i32,
    pub created_at: NaiveDateTime,
    pub request_id: Uuid,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::request_items)]
pub struct NewRequestItem {
    pub request_id: Uuid,
    pub name: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::request_items)]
pub struct RequestItemChanges {
    pub name: Option<String>,
    pub quantity: Option<i32>,
}

impl RequestItemChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.quantity.is_none()
    }
}

// Workflows

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::workflows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Workflow {
    pub id: Uuid,
    #[schema(example = "RequestApproval")]
    pub workflow_type: String,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    #[schema(example = "Pending")]
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub employee_id: Uuid,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::workflows)]
pub struct NewWorkflow {
    pub employee_id: Uuid,
    pub workflow_type: String,
    pub details: serde_json::Value,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::workflows)]
pub struct WorkflowChanges {
    pub workflow_type: Option<String>,
    pub details: Option<serde_json::Value>,
    pub status: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

impl WorkflowChanges {
    pub fn is_empty(&self) -> bool {
        self.workflow_type.is_none() && self.details.is_none() && self.status.is_none()
    }
}
