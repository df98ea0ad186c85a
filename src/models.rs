use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Identity & Authorization Schemas (Mapped to Database) ---

/// User
///
/// The principal's canonical record from the `users` table. The password hash is never
/// selected into this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: i64,
    // Natural key.
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    // National identity number.
    pub dni: String,
    // Postal address.
    pub direction: String,
    pub phone: String,
    pub is_staff: bool,
    // Superusers bypass group scoping entirely when menus are resolved.
    pub is_superuser: bool,
    // Inactive users are treated as anonymous by the auth extractor.
    pub is_active: bool,
}

/// Group
///
/// Named collection of users; the authorization scope for menu visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

/// ContentType
///
/// Registry entry for a domain model (e.g. `doctor.patient`) that permissions are declared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ContentType {
    pub id: i64,
    pub app_label: String,
    pub model: String,
}

/// Permission
///
/// A fine-grained action grant on a content type, identified by its codename
/// (`view_patient`, `delete_diagnosis`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub codename: String,
    pub content_type_id: i64,
}

/// Menu
///
/// Top-level navigation entry. Owns zero or more modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Menu {
    pub id: i64,
    pub name: String,
    pub icon: String,

    /// Maps SQL column "sort_order" to Rust field "order".
    /// `order` is reserved in SQL, so the column carries a different name.
    #[sqlx(rename = "sort_order")]
    pub order: i32,
}

/// Module
///
/// A navigable unit within exactly one menu. Only active modules are ever displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Module {
    pub id: i64,
    // Natural key.
    pub url: String,
    pub name: String,
    // FK to menus.id
    pub menu_id: i64,
    pub description: String,
    pub icon: String,
    #[sqlx(rename = "sort_order")]
    pub order: i32,
    pub is_active: bool,
}

/// GroupModulePermission
///
/// The grant record binding a (group, module) pair. The granted permission subset is stored
/// in a separate link table and loaded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct GroupModulePermission {
    pub id: i64,
    pub group_id: i64,
    pub module_id: i64,
}

// --- Join Rows (Read Side) ---

/// GrantedModule
///
/// One grant row joined with its module, as produced by the group-scoped menu query.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct GrantedModule {
    pub grant_id: i64,
    #[sqlx(flatten)]
    pub module: Module,
}

/// OwnedPermission
///
/// A permission tagged with the id of the row that owns it. The owner is a grant id when
/// loaded through `grant_permissions`, and a module id when loaded through `module_permissions`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OwnedPermission {
    pub owner_id: i64,
    #[sqlx(flatten)]
    pub permission: Permission,
}

// --- Seed Inputs (Write Side) ---

#[derive(Debug, Clone)]
pub struct NewMenu {
    pub name: String,
    pub icon: String,
    pub order: i32,
}

#[derive(Debug, Clone)]
pub struct NewModule {
    pub url: String,
    pub name: String,
    pub menu_id: i64,
    pub description: String,
    pub icon: String,
    pub order: i32,
}

/// NewUser
///
/// Input for user creation. `password_hash` must already be a PHC string; it is only
/// written when the row is created, never on subsequent lookups.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub direction: String,
    pub phone: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub codename: String,
    pub name: String,
    pub content_type_id: i64,
}

/// RowCounts
///
/// Per-table row totals. Two consecutive seed runs must leave these unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow, Default)]
pub struct RowCounts {
    pub menus: i64,
    pub modules: i64,
    pub users: i64,
    pub groups: i64,
    pub user_groups: i64,
    pub permissions: i64,
    pub module_permissions: i64,
    pub grants: i64,
    pub grant_permissions: i64,
}
