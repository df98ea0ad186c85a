use std::collections::HashMap;

use axum::http::Method;
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::MenuError,
    models::{Group, Menu, Module, OwnedPermission, Permission, User},
    repository::RepositoryState,
};

/// Session key under which the active group id is persisted between requests.
pub const SESSION_GROUP_KEY: &str = "group_id";

/// Principal
///
/// Who is making the request. Produced by the auth extractor; anonymous whenever no valid,
/// active identity could be established.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
    #[default]
    Anonymous,
    Authenticated(User),
}

impl Principal {
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::Authenticated(_))
    }
}

/// SessionState
///
/// The slice of the session the resolver reads and writes. Callers load it before resolution
/// and persist it afterwards if it changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub group_id: Option<i64>,
}

impl SessionState {
    /// select_active_group
    ///
    /// Seeds the active group with `default_group` when none is stored yet, then lets a
    /// numeric `gpid` override it. Non-numeric overrides are ignored and leave the stored
    /// value untouched. The override is not checked against the principal's memberships.
    pub fn select_active_group(&mut self, default_group: Option<i64>, gpid: Option<&str>) {
        if self.group_id.is_none() {
            self.group_id = default_group;
        }

        let Some(raw) = gpid.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return;
        };

        match raw.parse::<i64>() {
            Ok(group_id) => self.group_id = Some(group_id),
            Err(_) => tracing::debug!(gpid = %raw, "ignoring non-numeric group override"),
        }
    }
}

/// MenuQuery
///
/// Query parameters understood by the menu context. `gpid` is kept as raw text so that a
/// malformed value can be ignored instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct MenuQuery {
    /// Explicit active-group override.
    pub gpid: Option<String>,
}

impl MenuQuery {
    /// from_pairs
    ///
    /// Builds the query from raw decoded pairs. A repeated `gpid` keeps its last value.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let gpid = pairs
            .into_iter()
            .filter(|(key, _)| key == "gpid")
            .map(|(_, value)| value)
            .last();
        Self { gpid }
    }
}

/// ModulePermissions
///
/// A module paired with the permissions the viewer holds on it. For a group this is the grant's
/// subset; for a superuser it is everything the module declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ModulePermissions {
    pub module: Module,
    pub permissions: Vec<Permission>,
}

/// MenuEntry
///
/// One menu and its visible modules, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MenuEntry {
    pub menu: Menu,
    #[serde(rename = "group_module_permission_list")]
    pub modules: Vec<ModulePermissions>,
}

/// ResolvedContext
///
/// The navigation context handed to the rendering layer. Optional keys are omitted entirely
/// when they were not computed (anonymous principal, non-GET request, no active group).
#[derive(Debug, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ResolvedContext {
    pub user: Option<User>,
    #[ts(type = "string")]
    pub date_time: DateTime<Local>,
    #[ts(type = "string")]
    pub date_date: NaiveDate,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub group_list: Option<Vec<Group>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub group: Option<Group>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub menu_list: Option<Vec<MenuEntry>>,

    /// Why `menu_list` was degraded to empty, if it was. Never rendered.
    #[serde(skip)]
    #[ts(skip)]
    pub menu_error: Option<MenuError>,
}

impl ResolvedContext {
    fn base(user: Option<User>, now: DateTime<Local>) -> Self {
        Self {
            user,
            date_time: now,
            date_date: now.date_naive(),
            group_list: None,
            group: None,
            menu_list: None,
            menu_error: None,
        }
    }

    /// Records a computed menu list, or degrades to an empty one and keeps the error.
    fn set_menu_list(&mut self, result: Result<Vec<MenuEntry>, MenuError>) {
        match result {
            Ok(menu_list) => self.menu_list = Some(menu_list),
            Err(err) => self.degrade(err),
        }
    }

    fn degrade(&mut self, err: MenuError) {
        match &err {
            MenuError::GroupNotFound(group_id) => {
                tracing::warn!(group_id, "active group no longer exists; rendering empty menu");
            }
            MenuError::Repository(source) => {
                tracing::error!(error = %source, "menu resolution failed; rendering empty menu");
            }
        }
        self.menu_list = Some(vec![]);
        self.menu_error = Some(err);
    }
}

/// MenuResolver
///
/// Computes which menus and modules a principal may see. Read-only with respect to the store;
/// the only state it writes is the caller-supplied `SessionState`.
#[derive(Clone)]
pub struct MenuResolver {
    repo: RepositoryState,
}

impl MenuResolver {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// resolve
    ///
    /// Builds the navigation context for one request.
    ///
    /// 1. `user`, `date_time` and `date_date` are always present.
    /// 2. Anonymous principals and non-GET requests stop there.
    /// 3. `group_list` holds the principal's groups, ascending by id.
    /// 4. Superusers get the full catalog and skip all session handling.
    /// 5. Everyone else gets the menu of the session's active group, which defaults to the
    ///    lowest-id membership and may be overridden by `gpid`.
    ///
    /// Failures never propagate: they are logged and the menu list degrades to empty.
    pub async fn resolve(
        &self,
        principal: &Principal,
        session: &mut SessionState,
        query: &MenuQuery,
        method: &Method,
    ) -> ResolvedContext {
        let mut context = ResolvedContext::base(principal.user().cloned(), Local::now());

        let Principal::Authenticated(user) = principal else {
            return context;
        };

        if *method != Method::GET {
            return context;
        }

        let groups = match self.repo.user_groups(user.id).await {
            Ok(groups) => groups,
            Err(err) => {
                context.degrade(err.into());
                return context;
            }
        };
        let default_group = groups.first().map(|g| g.id);
        context.group_list = Some(groups);

        if user.is_superuser {
            context.set_menu_list(self.superuser_menu_list().await);
            return context;
        }

        session.select_active_group(default_group, query.gpid.as_deref());

        let Some(group_id) = session.group_id else {
            return context;
        };

        match self.repo.get_group(group_id).await {
            Ok(Some(group)) => {
                context.set_menu_list(self.group_menu_list(&group).await);
                context.group = Some(group);
            }
            Ok(None) => context.degrade(MenuError::GroupNotFound(group_id)),
            Err(err) => context.degrade(err.into()),
        }

        context
    }

    /// group_menu_list
    ///
    /// Menus visible to `group`: only modules the group holds a grant on, each carrying the
    /// grant's permission subset. Menus without a granted active module are absent.
    pub async fn group_menu_list(&self, group: &Group) -> Result<Vec<MenuEntry>, MenuError> {
        let grants = self.repo.active_group_grants(group.id).await?;

        let grant_ids: Vec<i64> = grants.iter().map(|g| g.grant_id).collect();
        let mut permissions = by_owner(self.repo.grant_permissions(&grant_ids).await?);

        let modules = grants
            .into_iter()
            .map(|granted| ModulePermissions {
                permissions: permissions.remove(&granted.grant_id).unwrap_or_default(),
                module: granted.module,
            })
            .collect();

        self.group_by_menu(modules).await
    }

    /// superuser_menu_list
    ///
    /// The full catalog: every active module with every permission it declares.
    pub async fn superuser_menu_list(&self) -> Result<Vec<MenuEntry>, MenuError> {
        let modules = self.repo.active_modules().await?;

        let module_ids: Vec<i64> = modules.iter().map(|m| m.id).collect();
        let mut permissions = by_owner(self.repo.module_permissions(&module_ids).await?);

        let modules = modules
            .into_iter()
            .map(|module| ModulePermissions {
                permissions: permissions.remove(&module.id).unwrap_or_default(),
                module,
            })
            .collect();

        self.group_by_menu(modules).await
    }

    /// Loads the menus referenced by `modules` and distributes the modules under them,
    /// preserving the incoming module order within each menu.
    async fn group_by_menu(&self, modules: Vec<ModulePermissions>) -> Result<Vec<MenuEntry>, MenuError> {
        let mut menu_ids: Vec<i64> = modules.iter().map(|m| m.module.menu_id).collect();
        menu_ids.sort_unstable();
        menu_ids.dedup();

        let mut entries: Vec<MenuEntry> = self
            .repo
            .menus_by_ids(&menu_ids)
            .await?
            .into_iter()
            .map(|menu| MenuEntry {
                menu,
                modules: vec![],
            })
            .collect();

        for item in modules {
            if let Some(entry) = entries.iter_mut().find(|e| e.menu.id == item.module.menu_id) {
                entry.modules.push(item);
            }
        }

        Ok(entries)
    }
}

fn by_owner(rows: Vec<OwnedPermission>) -> HashMap<i64, Vec<Permission>> {
    let mut grouped: HashMap<i64, Vec<Permission>> = HashMap::new();
    for row in rows {
        grouped.entry(row.owner_id).or_default().push(row.permission);
    }
    grouped
}
