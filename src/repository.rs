use crate::{
    error::RepoError,
    models::{
        ContentType, GrantedModule, Group, GroupModulePermission, Menu, Module, NewMenu,
        NewModule, NewPermission, NewUser, OwnedPermission, Permission, RowCounts, User,
    },
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

/// Repository Trait
///
/// The abstract contract for all persistence operations used by the menu resolver and the
/// seed initializer. Handlers and services only ever see `Arc<dyn Repository>`, so the Postgres
/// implementation and the in-memory one are interchangeable.
///
/// Every "get or create" method looks the row up by its natural key and only inserts when it
/// is absent; the returned flag is `true` when a row was created. Existing rows are never updated.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identity ---
    async fn get_user(&self, id: i64) -> Result<Option<User>, RepoError>;
    // Groups the user belongs to, ascending by group id.
    async fn user_groups(&self, user_id: i64) -> Result<Vec<Group>, RepoError>;
    async fn get_group(&self, id: i64) -> Result<Option<Group>, RepoError>;

    // --- Menu Resolution ---
    /// Grants of `group_id` whose module is active, ordered by (menu order, module order).
    async fn active_group_grants(&self, group_id: i64) -> Result<Vec<GrantedModule>, RepoError>;
    /// Permissions granted by each of the given grants, keyed by grant id.
    async fn grant_permissions(&self, grant_ids: &[i64]) -> Result<Vec<OwnedPermission>, RepoError>;
    /// Every active module, ordered by (menu order, module order).
    async fn active_modules(&self) -> Result<Vec<Module>, RepoError>;
    /// Permissions declared by each of the given modules, keyed by module id.
    async fn module_permissions(&self, module_ids: &[i64]) -> Result<Vec<OwnedPermission>, RepoError>;
    // Ascending by menu order.
    async fn menus_by_ids(&self, ids: &[i64]) -> Result<Vec<Menu>, RepoError>;

    // --- Seeding ---
    async fn get_or_create_menu(&self, menu: &NewMenu) -> Result<(Menu, bool), RepoError>;
    async fn get_or_create_module(&self, module: &NewModule) -> Result<(Module, bool), RepoError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;
    async fn get_or_create_user(&self, user: &NewUser) -> Result<(User, bool), RepoError>;
    async fn get_or_create_group(&self, name: &str) -> Result<(Group, bool), RepoError>;
    async fn add_user_to_group(&self, user_id: i64, group_id: i64) -> Result<(), RepoError>;
    async fn find_content_type(
        &self,
        app_label: &str,
        model: &str,
    ) -> Result<Option<ContentType>, RepoError>;
    async fn get_or_create_permission(
        &self,
        permission: &NewPermission,
    ) -> Result<(Permission, bool), RepoError>;
    async fn add_module_permissions(
        &self,
        module_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), RepoError>;
    async fn get_or_create_grant(
        &self,
        group_id: i64,
        module_id: i64,
    ) -> Result<(GroupModulePermission, bool), RepoError>;
    async fn add_grant_permissions(
        &self,
        grant_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), RepoError>;

    async fn row_counts(&self) -> Result<RowCounts, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, dni, direction, phone, \
                            is_staff, is_superuser, is_active";

const MODULE_COLUMNS: &str =
    "m.id, m.url, m.name, m.menu_id, m.description, m.icon, m.sort_order, m.is_active";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Queries are checked at runtime
/// (`query_as::<_, T>`) so the crate builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i64) -> Result<Option<User>, RepoError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn user_groups(&self, user_id: i64) -> Result<Vec<Group>, RepoError> {
        let groups = sqlx::query_as::<_, Group>(
            r#"
            SELECT g.id, g.name
            FROM groups g
            JOIN user_groups ug ON ug.group_id = g.id
            WHERE ug.user_id = $1
            ORDER BY g.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }

    async fn get_group(&self, id: i64) -> Result<Option<Group>, RepoError> {
        let group = sqlx::query_as::<_, Group>("SELECT id, name FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(group)
    }

    /// active_group_grants
    ///
    /// Joins grants with their module and the module's menu so the ordering can use the
    /// menu's `sort_order`. Inactive modules are filtered out in SQL.
    async fn active_group_grants(&self, group_id: i64) -> Result<Vec<GrantedModule>, RepoError> {
        let query = format!(
            r#"
            SELECT gmp.id AS grant_id, {MODULE_COLUMNS}
            FROM group_module_permissions gmp
            JOIN modules m ON m.id = gmp.module_id
            JOIN menus mn ON mn.id = m.menu_id
            WHERE gmp.group_id = $1 AND m.is_active = true
            ORDER BY mn.sort_order ASC, m.sort_order ASC, m.id ASC
            "#
        );
        let grants = sqlx::query_as::<_, GrantedModule>(&query)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(grants)
    }

    async fn grant_permissions(&self, grant_ids: &[i64]) -> Result<Vec<OwnedPermission>, RepoError> {
        if grant_ids.is_empty() {
            return Ok(vec![]);
        }
        let permissions = sqlx::query_as::<_, OwnedPermission>(
            r#"
            SELECT gp.grant_id AS owner_id, p.id, p.name, p.codename, p.content_type_id
            FROM group_module_permission_permissions gp
            JOIN permissions p ON p.id = gp.permission_id
            WHERE gp.grant_id = ANY($1)
            ORDER BY gp.grant_id ASC, p.id ASC
            "#,
        )
        .bind(grant_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn active_modules(&self) -> Result<Vec<Module>, RepoError> {
        let query = format!(
            r#"
            SELECT {MODULE_COLUMNS}
            FROM modules m
            JOIN menus mn ON mn.id = m.menu_id
            WHERE m.is_active = true
            ORDER BY mn.sort_order ASC, m.sort_order ASC, m.id ASC
            "#
        );
        let modules = sqlx::query_as::<_, Module>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(modules)
    }

    async fn module_permissions(&self, module_ids: &[i64]) -> Result<Vec<OwnedPermission>, RepoError> {
        if module_ids.is_empty() {
            return Ok(vec![]);
        }
        let permissions = sqlx::query_as::<_, OwnedPermission>(
            r#"
            SELECT mp.module_id AS owner_id, p.id, p.name, p.codename, p.content_type_id
            FROM module_permissions mp
            JOIN permissions p ON p.id = mp.permission_id
            WHERE mp.module_id = ANY($1)
            ORDER BY mp.module_id ASC, p.id ASC
            "#,
        )
        .bind(module_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    async fn menus_by_ids(&self, ids: &[i64]) -> Result<Vec<Menu>, RepoError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let menus = sqlx::query_as::<_, Menu>(
            "SELECT id, name, icon, sort_order FROM menus WHERE id = ANY($1) ORDER BY sort_order ASC, id ASC",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(menus)
    }

    // --- SEEDING ---
    //
    // Each get-or-create first attempts `INSERT ... ON CONFLICT DO NOTHING RETURNING`. When the
    // natural key already exists nothing is returned and the existing row is read back instead.
    // The unique constraints make concurrent runs converge on a single row.

    async fn get_or_create_menu(&self, menu: &NewMenu) -> Result<(Menu, bool), RepoError> {
        let inserted = sqlx::query_as::<_, Menu>(
            r#"
            INSERT INTO menus (name, icon, sort_order) VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, icon, sort_order
            "#,
        )
        .bind(&menu.name)
        .bind(&menu.icon)
        .bind(menu.order)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let existing = sqlx::query_as::<_, Menu>(
            "SELECT id, name, icon, sort_order FROM menus WHERE name = $1",
        )
        .bind(&menu.name)
        .fetch_one(&self.pool)
        .await?;
        Ok((existing, false))
    }

    async fn get_or_create_module(&self, module: &NewModule) -> Result<(Module, bool), RepoError> {
        let inserted = sqlx::query_as::<_, Module>(
            r#"
            INSERT INTO modules (url, name, menu_id, description, icon, sort_order, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, true)
            ON CONFLICT (url) DO NOTHING
            RETURNING id, url, name, menu_id, description, icon, sort_order, is_active
            "#,
        )
        .bind(&module.url)
        .bind(&module.name)
        .bind(module.menu_id)
        .bind(&module.description)
        .bind(&module.icon)
        .bind(module.order)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let existing = sqlx::query_as::<_, Module>(
            r#"
            SELECT id, url, name, menu_id, description, icon, sort_order, is_active
            FROM modules WHERE url = $1
            "#,
        )
        .bind(&module.url)
        .fetch_one(&self.pool)
        .await?;
        Ok((existing, false))
    }

    /// get_or_create_user
    ///
    /// The password hash is only written on insert. An existing account keeps its credentials.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_or_create_user(&self, user: &NewUser) -> Result<(User, bool), RepoError> {
        let insert = format!(
            r#"
            INSERT INTO users (username, email, password, first_name, last_name, dni, direction, phone, is_staff, is_superuser, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, true)
            ON CONFLICT (username) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, User>(&insert)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.dni)
            .bind(&user.direction)
            .bind(&user.phone)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let select = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let existing = sqlx::query_as::<_, User>(&select)
            .bind(&user.username)
            .fetch_one(&self.pool)
            .await?;
        Ok((existing, false))
    }

    async fn get_or_create_group(&self, name: &str) -> Result<(Group, bool), RepoError> {
        let inserted = sqlx::query_as::<_, Group>(
            "INSERT INTO groups (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id, name",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let existing = sqlx::query_as::<_, Group>("SELECT id, name FROM groups WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok((existing, false))
    }

    async fn add_user_to_group(&self, user_id: i64, group_id: i64) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO user_groups (user_id, group_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_content_type(
        &self,
        app_label: &str,
        model: &str,
    ) -> Result<Option<ContentType>, RepoError> {
        let content_type = sqlx::query_as::<_, ContentType>(
            "SELECT id, app_label, model FROM content_types WHERE app_label = $1 AND model = $2",
        )
        .bind(app_label)
        .bind(model)
        .fetch_optional(&self.pool)
        .await?;
        Ok(content_type)
    }

    async fn get_or_create_permission(
        &self,
        permission: &NewPermission,
    ) -> Result<(Permission, bool), RepoError> {
        let inserted = sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (name, codename, content_type_id) VALUES ($1, $2, $3)
            ON CONFLICT (content_type_id, codename) DO NOTHING
            RETURNING id, name, codename, content_type_id
            "#,
        )
        .bind(&permission.name)
        .bind(&permission.codename)
        .bind(permission.content_type_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let existing = sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, name, codename, content_type_id
            FROM permissions WHERE content_type_id = $1 AND codename = $2
            "#,
        )
        .bind(permission.content_type_id)
        .bind(&permission.codename)
        .fetch_one(&self.pool)
        .await?;
        Ok((existing, false))
    }

    async fn add_module_permissions(
        &self,
        module_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO module_permissions (module_id, permission_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(module_id)
        .bind(permission_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_or_create_grant(
        &self,
        group_id: i64,
        module_id: i64,
    ) -> Result<(GroupModulePermission, bool), RepoError> {
        let inserted = sqlx::query_as::<_, GroupModulePermission>(
            r#"
            INSERT INTO group_module_permissions (group_id, module_id) VALUES ($1, $2)
            ON CONFLICT (group_id, module_id) DO NOTHING
            RETURNING id, group_id, module_id
            "#,
        )
        .bind(group_id)
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let existing = sqlx::query_as::<_, GroupModulePermission>(
            r#"
            SELECT id, group_id, module_id
            FROM group_module_permissions WHERE group_id = $1 AND module_id = $2
            "#,
        )
        .bind(group_id)
        .bind(module_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((existing, false))
    }

    async fn add_grant_permissions(
        &self,
        grant_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO group_module_permission_permissions (grant_id, permission_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(grant_id)
        .bind(permission_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// row_counts
    ///
    /// Compiles every table counter in a single round trip.
    async fn row_counts(&self) -> Result<RowCounts, RepoError> {
        let counts = sqlx::query_as::<_, RowCounts>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM menus) AS menus,
                (SELECT COUNT(*) FROM modules) AS modules,
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM groups) AS groups,
                (SELECT COUNT(*) FROM user_groups) AS user_groups,
                (SELECT COUNT(*) FROM permissions) AS permissions,
                (SELECT COUNT(*) FROM module_permissions) AS module_permissions,
                (SELECT COUNT(*) FROM group_module_permissions) AS grants,
                (SELECT COUNT(*) FROM group_module_permission_permissions) AS grant_permissions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }
}
