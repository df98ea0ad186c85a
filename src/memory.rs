use crate::{
    error::RepoError,
    models::{
        ContentType, GrantedModule, Group, GroupModulePermission, Menu, Module, NewMenu,
        NewModule, NewPermission, NewUser, OwnedPermission, Permission, RowCounts, User,
    },
    repository::Repository,
};
use async_trait::async_trait;
use std::{
    collections::{BTreeSet, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    passwords: HashMap<i64, String>,
    groups: Vec<Group>,
    // (user_id, group_id)
    user_groups: BTreeSet<(i64, i64)>,
    content_types: Vec<ContentType>,
    permissions: Vec<Permission>,
    menus: Vec<Menu>,
    modules: Vec<Module>,
    // (module_id, permission_id)
    module_permissions: BTreeSet<(i64, i64)>,
    grants: Vec<GroupModulePermission>,
    // (grant_id, permission_id)
    grant_permissions: BTreeSet<(i64, i64)>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn menu_order(&self, menu_id: i64) -> Option<i32> {
        self.menus.iter().find(|m| m.id == menu_id).map(|m| m.order)
    }

    /// Sort key mirroring `ORDER BY menu.sort_order, module.sort_order, module.id`.
    fn module_sort_key(&self, module: &Module) -> (i32, i32, i64) {
        (
            self.menu_order(module.menu_id).unwrap_or(i32::MAX),
            module.order,
            module.id,
        )
    }

    fn owned_permissions(&self, links: &BTreeSet<(i64, i64)>, owners: &[i64]) -> Vec<OwnedPermission> {
        links
            .iter()
            .filter(|(owner_id, _)| owners.contains(owner_id))
            .filter_map(|(owner_id, permission_id)| {
                self.permissions
                    .iter()
                    .find(|p| p.id == *permission_id)
                    .map(|permission| OwnedPermission {
                        owner_id: *owner_id,
                        permission: permission.clone(),
                    })
            })
            .collect()
    }
}

fn missing(entity: &'static str, key: impl ToString) -> RepoError {
    RepoError::NotFound {
        entity,
        key: key.to_string(),
    }
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory. It honours the same natural keys, ordering
/// and idempotency rules as the Postgres implementation, which makes it the test double for
/// the resolver, the seed initializer and the HTTP layer.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    /// When true, every read used by menu resolution returns a simulated failure.
    failing_reads: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), RepoError> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(RepoError::Internal(
                "simulated read failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Registers a domain model so permissions can be declared against it.
    pub async fn register_content_type(&self, app_label: &str, model: &str) -> ContentType {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .content_types
            .iter()
            .find(|ct| ct.app_label == app_label && ct.model == model)
        {
            return existing.clone();
        }
        let content_type = ContentType {
            id: tables.next_id(),
            app_label: app_label.to_string(),
            model: model.to_string(),
        };
        tables.content_types.push(content_type.clone());
        content_type
    }

    pub async fn set_module_active(&self, module_id: i64, active: bool) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        let module = tables
            .modules
            .iter_mut()
            .find(|m| m.id == module_id)
            .ok_or_else(|| missing("module", module_id))?;
        module.is_active = active;
        Ok(())
    }

    pub async fn set_user_active(&self, user_id: i64, active: bool) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| missing("user", user_id))?;
        user.is_active = active;
        Ok(())
    }

    /// The stored PHC password hash for a user, if any.
    pub async fn password_hash(&self, user_id: i64) -> Option<String> {
        self.tables.lock().await.passwords.get(&user_id).cloned()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> Result<Option<User>, RepoError> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_groups(&self, user_id: i64) -> Result<Vec<Group>, RepoError> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        let mut groups: Vec<Group> = tables
            .groups
            .iter()
            .filter(|g| tables.user_groups.contains(&(user_id, g.id)))
            .cloned()
            .collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    async fn get_group(&self, id: i64) -> Result<Option<Group>, RepoError> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn active_group_grants(&self, group_id: i64) -> Result<Vec<GrantedModule>, RepoError> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        let mut granted: Vec<GrantedModule> = tables
            .grants
            .iter()
            .filter(|grant| grant.group_id == group_id)
            .filter_map(|grant| {
                tables
                    .modules
                    .iter()
                    .find(|m| m.id == grant.module_id && m.is_active)
                    .map(|module| GrantedModule {
                        grant_id: grant.id,
                        module: module.clone(),
                    })
            })
            .collect();
        granted.sort_by_key(|g| tables.module_sort_key(&g.module));
        Ok(granted)
    }

    async fn grant_permissions(&self, grant_ids: &[i64]) -> Result<Vec<OwnedPermission>, RepoError> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        Ok(tables.owned_permissions(&tables.grant_permissions, grant_ids))
    }

    async fn active_modules(&self) -> Result<Vec<Module>, RepoError> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        let mut modules: Vec<Module> = tables.modules.iter().filter(|m| m.is_active).cloned().collect();
        modules.sort_by_key(|m| tables.module_sort_key(m));
        Ok(modules)
    }

    async fn module_permissions(&self, module_ids: &[i64]) -> Result<Vec<OwnedPermission>, RepoError> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        Ok(tables.owned_permissions(&tables.module_permissions, module_ids))
    }

    async fn menus_by_ids(&self, ids: &[i64]) -> Result<Vec<Menu>, RepoError> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        let mut menus: Vec<Menu> = tables.menus.iter().filter(|m| ids.contains(&m.id)).cloned().collect();
        menus.sort_by_key(|m| (m.order, m.id));
        Ok(menus)
    }

    // --- SEEDING ---

    async fn get_or_create_menu(&self, menu: &NewMenu) -> Result<(Menu, bool), RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.menus.iter().find(|m| m.name == menu.name) {
            return Ok((existing.clone(), false));
        }
        let created = Menu {
            id: tables.next_id(),
            name: menu.name.clone(),
            icon: menu.icon.clone(),
            order: menu.order,
        };
        tables.menus.push(created.clone());
        Ok((created, true))
    }

    async fn get_or_create_module(&self, module: &NewModule) -> Result<(Module, bool), RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.modules.iter().find(|m| m.url == module.url) {
            return Ok((existing.clone(), false));
        }
        if tables.menu_order(module.menu_id).is_none() {
            return Err(missing("menu", module.menu_id));
        }
        let created = Module {
            id: tables.next_id(),
            url: module.url.clone(),
            name: module.name.clone(),
            menu_id: module.menu_id,
            description: module.description.clone(),
            icon: module.icon.clone(),
            order: module.order,
            is_active: true,
        };
        tables.modules.push(created.clone());
        Ok((created, true))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn get_or_create_user(&self, user: &NewUser) -> Result<(User, bool), RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.users.iter().find(|u| u.username == user.username) {
            return Ok((existing.clone(), false));
        }
        let created = User {
            id: tables.next_id(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            dni: user.dni.clone(),
            direction: user.direction.clone(),
            phone: user.phone.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            is_active: true,
        };
        tables.passwords.insert(created.id, user.password_hash.clone());
        tables.users.push(created.clone());
        Ok((created, true))
    }

    async fn get_or_create_group(&self, name: &str) -> Result<(Group, bool), RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.groups.iter().find(|g| g.name == name) {
            return Ok((existing.clone(), false));
        }
        let created = Group {
            id: tables.next_id(),
            name: name.to_string(),
        };
        tables.groups.push(created.clone());
        Ok((created, true))
    }

    async fn add_user_to_group(&self, user_id: i64, group_id: i64) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.iter().any(|u| u.id == user_id) {
            return Err(missing("user", user_id));
        }
        if !tables.groups.iter().any(|g| g.id == group_id) {
            return Err(missing("group", group_id));
        }
        tables.user_groups.insert((user_id, group_id));
        Ok(())
    }

    async fn find_content_type(
        &self,
        app_label: &str,
        model: &str,
    ) -> Result<Option<ContentType>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .content_types
            .iter()
            .find(|ct| ct.app_label == app_label && ct.model == model)
            .cloned())
    }

    async fn get_or_create_permission(
        &self,
        permission: &NewPermission,
    ) -> Result<(Permission, bool), RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.permissions.iter().find(|p| {
            p.content_type_id == permission.content_type_id && p.codename == permission.codename
        }) {
            return Ok((existing.clone(), false));
        }
        if !tables.content_types.iter().any(|ct| ct.id == permission.content_type_id) {
            return Err(missing("content type", permission.content_type_id));
        }
        let created = Permission {
            id: tables.next_id(),
            name: permission.name.clone(),
            codename: permission.codename.clone(),
            content_type_id: permission.content_type_id,
        };
        tables.permissions.push(created.clone());
        Ok((created, true))
    }

    async fn add_module_permissions(
        &self,
        module_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.modules.iter().any(|m| m.id == module_id) {
            return Err(missing("module", module_id));
        }
        for permission_id in permission_ids {
            tables.module_permissions.insert((module_id, *permission_id));
        }
        Ok(())
    }

    async fn get_or_create_grant(
        &self,
        group_id: i64,
        module_id: i64,
    ) -> Result<(GroupModulePermission, bool), RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .grants
            .iter()
            .find(|g| g.group_id == group_id && g.module_id == module_id)
        {
            return Ok((existing.clone(), false));
        }
        if !tables.groups.iter().any(|g| g.id == group_id) {
            return Err(missing("group", group_id));
        }
        if !tables.modules.iter().any(|m| m.id == module_id) {
            return Err(missing("module", module_id));
        }
        let created = GroupModulePermission {
            id: tables.next_id(),
            group_id,
            module_id,
        };
        tables.grants.push(created.clone());
        Ok((created, true))
    }

    async fn add_grant_permissions(
        &self,
        grant_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.grants.iter().any(|g| g.id == grant_id) {
            return Err(missing("grant", grant_id));
        }
        for permission_id in permission_ids {
            tables.grant_permissions.insert((grant_id, *permission_id));
        }
        Ok(())
    }

    async fn row_counts(&self) -> Result<RowCounts, RepoError> {
        let tables = self.tables.lock().await;
        let count = |n: usize| n as i64;
        Ok(RowCounts {
            menus: count(tables.menus.len()),
            modules: count(tables.modules.len()),
            users: count(tables.users.len()),
            groups: count(tables.groups.len()),
            user_groups: count(tables.user_groups.len()),
            permissions: count(tables.permissions.len()),
            module_permissions: count(tables.module_permissions.len()),
            grants: count(tables.grants.len()),
            grant_permissions: count(tables.grant_permissions.len()),
        })
    }
}
