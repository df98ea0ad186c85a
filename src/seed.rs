use std::collections::HashMap;

use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use serde::Serialize;

use crate::{
    error::SeedError,
    models::{Group, Module, NewMenu, NewModule, NewPermission, NewUser, Permission, User},
    repository::RepositoryState,
};

// --- Fixed Catalog ---

struct MenuSeed {
    name: &'static str,
    icon: &'static str,
    order: i32,
}

const MENUS: [MenuSeed; 3] = [
    MenuSeed { name: "Pacientes", icon: "bi bi-person", order: 1 },
    MenuSeed { name: "Consultas", icon: "bi bi-calendar-check", order: 2 },
    MenuSeed { name: "Administración", icon: "bi bi-gear", order: 4 },
];

struct ModuleSeed {
    url: &'static str,
    name: &'static str,
    menu: &'static str,
    description: &'static str,
    icon: &'static str,
    order: i32,
}

const MODULES: [ModuleSeed; 9] = [
    ModuleSeed {
        url: "pacientes/",
        name: "Registro de Pacientes",
        menu: "Pacientes",
        description: "Gestión de información de pacientes",
        icon: "bi bi-person-plus",
        order: 1,
    },
    ModuleSeed {
        url: "historial/",
        name: "Historial Médico",
        menu: "Pacientes",
        description: "Historial clínico de pacientes",
        icon: "bi bi-file-medical",
        order: 2,
    },
    ModuleSeed {
        url: "seguimiento/",
        name: "Seguimiento",
        menu: "Pacientes",
        description: "Seguimiento de tratamientos y evolución",
        icon: "bi bi-graph-up",
        order: 3,
    },
    ModuleSeed {
        url: "citas/",
        name: "Citas",
        menu: "Consultas",
        description: "Programación de citas médicas",
        icon: "bi bi-calendar-date",
        order: 1,
    },
    ModuleSeed {
        url: "diagnosticos/",
        name: "Diagnósticos",
        menu: "Consultas",
        description: "Registro de diagnósticos médicos",
        icon: "bi bi-clipboard-pulse",
        order: 2,
    },
    ModuleSeed {
        url: "recetas/",
        name: "Recetas",
        menu: "Consultas",
        description: "Emisión de recetas médicas",
        icon: "bi bi-file-earmark-text",
        order: 3,
    },
    ModuleSeed {
        url: "usuarios/",
        name: "Usuarios",
        menu: "Administración",
        description: "Gestión de usuarios del sistema",
        icon: "bi bi-people",
        order: 1,
    },
    ModuleSeed {
        url: "configuracion/",
        name: "Configuración",
        menu: "Administración",
        description: "Configuración general del sistema",
        icon: "bi bi-sliders",
        order: 2,
    },
    ModuleSeed {
        url: "reportes/",
        name: "Reportes",
        menu: "Administración",
        description: "Generación de reportes y estadísticas",
        icon: "bi bi-bar-chart",
        order: 3,
    },
];

struct UserSeed {
    username: &'static str,
    email: &'static str,
    password: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    dni: &'static str,
    direction: &'static str,
    phone: &'static str,
    is_staff: bool,
}

const USERS: [UserSeed; 2] = [
    UserSeed {
        username: "drgomez",
        email: "drgomez@clinica.med",
        password: "secure123!",
        first_name: "Carlos",
        last_name: "Gómez",
        dni: "0912345678",
        direction: "Av. Principal 123, Guayaquil",
        phone: "0991234567",
        is_staff: true,
    },
    UserSeed {
        username: "asistente",
        email: "asistente@clinica.med",
        password: "asist2025!",
        first_name: "María",
        last_name: "Sánchez",
        dni: "0923456789",
        direction: "Calle Secundaria 456, Guayaquil",
        phone: "0982345678",
        is_staff: false,
    },
];

const GROUPS: [&str; 2] = ["Médicos", "Asistentes"];

// (username, group)
const MEMBERSHIPS: [(&str, &str); 2] = [("drgomez", "Médicos"), ("asistente", "Asistentes")];

/// Standard CRUD actions, in the order their permissions are created.
const ACTIONS: [&str; 4] = ["view", "add", "change", "delete"];

struct DomainModel {
    model: &'static str,
    verbose_name: &'static str,
    // Module that declares every permission of this model.
    module: &'static str,
}

const DOMAIN_MODELS: [DomainModel; 2] = [
    DomainModel { model: "patient", verbose_name: "Paciente", module: "Registro de Pacientes" },
    DomainModel { model: "diagnosis", verbose_name: "Diagnóstico", module: "Diagnósticos" },
];

struct GrantSeed {
    group: &'static str,
    module: &'static str,
    model: &'static str,
    actions: &'static [&'static str],
}

const GRANTS: [GrantSeed; 4] = [
    GrantSeed {
        group: "Médicos",
        module: "Registro de Pacientes",
        model: "patient",
        actions: &["view", "add", "change", "delete"],
    },
    GrantSeed {
        group: "Médicos",
        module: "Diagnósticos",
        model: "diagnosis",
        actions: &["view", "add", "change"],
    },
    GrantSeed {
        group: "Asistentes",
        module: "Registro de Pacientes",
        model: "patient",
        actions: &["view", "add"],
    },
    GrantSeed {
        group: "Asistentes",
        module: "Diagnósticos",
        model: "diagnosis",
        actions: &["view"],
    },
];

/// SeedReport
///
/// What a single run created. A second run on the same store reports zero everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub menus_created: usize,
    pub modules_created: usize,
    pub users_created: usize,
    pub groups_created: usize,
    pub permissions_created: usize,
    pub grants_created: usize,
    /// False when the domain content types were missing and permission seeding was skipped.
    pub permissions_seeded: bool,
}

/// SeedInitializer
///
/// Populates the store with the default clinic catalog. Every step is a get-or-create on a
/// natural key, so re-running heals a partially completed run and never duplicates rows.
pub struct SeedInitializer {
    repo: RepositoryState,
    app_label: String,
}

impl SeedInitializer {
    /// `app_label` is the application that owns the `patient` and `diagnosis` content types.
    pub fn new(repo: RepositoryState, app_label: impl Into<String>) -> Self {
        Self {
            repo,
            app_label: app_label.into(),
        }
    }

    /// run
    ///
    /// Seeds menus, modules, users, groups and memberships, then permissions and grants.
    /// Missing content types only skip the permission portion.
    pub async fn run(&self) -> Result<SeedReport, SeedError> {
        let mut report = SeedReport::default();

        let modules = self.seed_navigation(&mut report).await?;
        let users = self.seed_users(&mut report).await?;
        let groups = self.seed_groups(&mut report).await?;

        for (username, group_name) in MEMBERSHIPS {
            if let (Some(user), Some(group)) = (users.get(username), groups.get(group_name)) {
                self.repo.add_user_to_group(user.id, group.id).await?;
            }
        }

        self.seed_permissions(&modules, &groups, &mut report).await?;

        tracing::info!(?report, "Database initialization completed successfully.");
        Ok(report)
    }

    async fn seed_navigation(
        &self,
        report: &mut SeedReport,
    ) -> Result<HashMap<&'static str, Module>, SeedError> {
        let mut menus = HashMap::new();
        for seed in &MENUS {
            let new_menu = NewMenu {
                name: seed.name.to_string(),
                icon: seed.icon.to_string(),
                order: seed.order,
            };
            let (menu, created) = self.repo.get_or_create_menu(&new_menu).await?;
            if created {
                tracing::info!(menu = %menu.name, "created menu");
                report.menus_created += 1;
            }
            menus.insert(seed.name, menu);
        }

        let mut modules = HashMap::new();
        for seed in &MODULES {
            let Some(menu) = menus.get(seed.menu) else {
                continue;
            };
            let new_module = NewModule {
                url: seed.url.to_string(),
                name: seed.name.to_string(),
                menu_id: menu.id,
                description: seed.description.to_string(),
                icon: seed.icon.to_string(),
                order: seed.order,
            };
            let (module, created) = self.repo.get_or_create_module(&new_module).await?;
            if created {
                tracing::info!(module = %module.name, url = %module.url, "created module");
                report.modules_created += 1;
            }
            modules.insert(seed.name, module);
        }

        Ok(modules)
    }

    async fn seed_users(
        &self,
        report: &mut SeedReport,
    ) -> Result<HashMap<&'static str, User>, SeedError> {
        let mut users = HashMap::new();
        for seed in &USERS {
            // Existing users are reused as-is; only new ones get a password hash.
            if let Some(existing) = self.repo.find_user_by_username(seed.username).await? {
                users.insert(seed.username, existing);
                continue;
            }
            let new_user = NewUser {
                username: seed.username.to_string(),
                email: seed.email.to_string(),
                password_hash: hash_password(seed.password)?,
                first_name: seed.first_name.to_string(),
                last_name: seed.last_name.to_string(),
                dni: seed.dni.to_string(),
                direction: seed.direction.to_string(),
                phone: seed.phone.to_string(),
                is_staff: seed.is_staff,
                is_superuser: false,
            };
            let (user, created) = self.repo.get_or_create_user(&new_user).await?;
            if created {
                tracing::info!(username = %user.username, "created user");
                report.users_created += 1;
            }
            users.insert(seed.username, user);
        }
        Ok(users)
    }

    async fn seed_groups(
        &self,
        report: &mut SeedReport,
    ) -> Result<HashMap<&'static str, Group>, SeedError> {
        let mut groups = HashMap::new();
        for name in GROUPS {
            let (group, created) = self.repo.get_or_create_group(name).await?;
            if created {
                tracing::info!(group = %group.name, "created group");
                report.groups_created += 1;
            }
            groups.insert(name, group);
        }
        Ok(groups)
    }

    /// seed_permissions
    ///
    /// Creates the CRUD permissions of each domain model, attaches them to the declaring module
    /// and writes the group grants. Returns early, with a warning, when a content type is absent.
    async fn seed_permissions(
        &self,
        modules: &HashMap<&'static str, Module>,
        groups: &HashMap<&'static str, Group>,
        report: &mut SeedReport,
    ) -> Result<(), SeedError> {
        let mut content_types = HashMap::new();
        for domain in &DOMAIN_MODELS {
            match self.repo.find_content_type(&self.app_label, domain.model).await? {
                Some(content_type) => {
                    content_types.insert(domain.model, content_type);
                }
                None => {
                    tracing::warn!(
                        app_label = %self.app_label,
                        "Warning: ContentTypes for {0}.patient or {0}.diagnosis not found. Permissions not created.",
                        self.app_label
                    );
                    return Ok(());
                }
            }
        }

        // (model, action) -> permission
        let mut permissions: HashMap<(&str, &str), Permission> = HashMap::new();
        for domain in &DOMAIN_MODELS {
            let content_type_id = content_types[domain.model].id;
            for action in ACTIONS {
                let new_permission = NewPermission {
                    codename: format!("{action}_{}", domain.model),
                    name: format!("Can {action} {}", domain.verbose_name),
                    content_type_id,
                };
                let (permission, created) =
                    self.repo.get_or_create_permission(&new_permission).await?;
                if created {
                    report.permissions_created += 1;
                }
                permissions.insert((domain.model, action), permission);
            }

            if let Some(module) = modules.get(domain.module) {
                let ids: Vec<i64> = ACTIONS
                    .iter()
                    .filter_map(|action| permissions.get(&(domain.model, *action)))
                    .map(|p| p.id)
                    .collect();
                self.repo.add_module_permissions(module.id, &ids).await?;
            }
        }

        for seed in &GRANTS {
            let (Some(group), Some(module)) = (groups.get(seed.group), modules.get(seed.module))
            else {
                continue;
            };
            let (grant, created) = self.repo.get_or_create_grant(group.id, module.id).await?;
            if created {
                tracing::info!(group = %group.name, module = %module.name, "created grant");
                report.grants_created += 1;
            }
            let ids: Vec<i64> = seed
                .actions
                .iter()
                .filter_map(|action| permissions.get(&(seed.model, *action)))
                .map(|p| p.id)
                .collect();
            self.repo.add_grant_permissions(grant.id, &ids).await?;
        }

        report.permissions_seeded = true;
        Ok(())
    }
}

/// Hashes a plaintext password into an Argon2id PHC string.
fn hash_password(password: &str) -> Result<String, SeedError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SeedError::PasswordHash(e.to_string()))
}
