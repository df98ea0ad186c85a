mod common;

use axum::http::Method;
use clinic_security::{
    MenuResolver, Principal, SessionState,
    error::MenuError,
    menu::{MenuEntry, MenuQuery},
    models::{Group, NewMenu, NewModule},
    repository::{Repository, RepositoryState},
};
use common::{group, plain_user, seeded_repo, superuser, user};
use std::sync::Arc;
use tokio::test;

// --- TEST UTILITIES ---

fn resolver(repo: &Arc<clinic_security::InMemoryRepository>) -> MenuResolver {
    MenuResolver::new(repo.clone() as RepositoryState)
}

fn no_query() -> MenuQuery {
    MenuQuery::default()
}

fn gpid(value: &str) -> MenuQuery {
    MenuQuery {
        gpid: Some(value.to_string()),
    }
}

fn menu_names(menus: &[MenuEntry]) -> Vec<&str> {
    menus.iter().map(|e| e.menu.name.as_str()).collect()
}

fn module_names(entry: &MenuEntry) -> Vec<&str> {
    entry.modules.iter().map(|m| m.module.name.as_str()).collect()
}

fn codenames(entry: &MenuEntry, module: &str) -> Vec<String> {
    entry
        .modules
        .iter()
        .find(|m| m.module.name == module)
        .map(|m| m.permissions.iter().map(|p| p.codename.clone()).collect())
        .unwrap_or_default()
}

// --- BASE CONTEXT ---

#[test]
async fn test_anonymous_gets_only_base_fields() {
    let repo = seeded_repo().await;
    let mut session = SessionState::default();

    let context = resolver(&repo)
        .resolve(&Principal::Anonymous, &mut session, &gpid("1"), &Method::GET)
        .await;

    assert!(context.user.is_none());
    assert!(context.group_list.is_none());
    assert!(context.group.is_none());
    assert!(context.menu_list.is_none());
    assert_eq!(session, SessionState::default());

    let json = serde_json::to_value(&context).unwrap();
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert!(json.get("user").is_some(), "user key must always be present");
    assert!(json.get("date_time").is_some());
    assert!(json.get("date_date").is_some());
    assert!(json.get("group_list").is_none(), "unexpected keys: {:?}", keys);
    assert!(json.get("group").is_none());
    assert!(json.get("menu_list").is_none());
}

#[test]
async fn test_date_fields_agree() {
    let repo = seeded_repo().await;
    let context = resolver(&repo)
        .resolve(&Principal::Anonymous, &mut SessionState::default(), &no_query(), &Method::GET)
        .await;

    assert_eq!(context.date_date, context.date_time.date_naive());
}

#[test]
async fn test_non_get_request_skips_menu_computation() {
    let repo = seeded_repo().await;
    let doctor = user(&repo, "drgomez").await;
    let mut session = SessionState::default();

    for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
        let context = resolver(&repo)
            .resolve(&Principal::Authenticated(doctor.clone()), &mut session, &no_query(), &method)
            .await;

        assert_eq!(context.user.as_ref().map(|u| u.username.as_str()), Some("drgomez"));
        assert!(context.group_list.is_none(), "{} must not compute groups", method);
        assert!(context.group.is_none());
        assert!(context.menu_list.is_none());
    }

    // The session is never touched outside GET.
    assert_eq!(session.group_id, None);
}

// --- GROUP-SCOPED RESOLUTION ---

#[test]
async fn test_doctor_defaults_to_first_group_and_sees_granted_modules() {
    let repo = seeded_repo().await;
    let doctor = user(&repo, "drgomez").await;
    let medicos = group(&repo, "Médicos").await;
    let mut session = SessionState::default();

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(doctor), &mut session, &no_query(), &Method::GET)
        .await;

    assert_eq!(session.group_id, Some(medicos.id));
    assert_eq!(context.group.as_ref(), Some(&medicos));
    assert_eq!(context.group_list, Some(vec![medicos]));
    assert!(context.menu_error.is_none());

    let menus = context.menu_list.expect("menu list should be computed");
    assert_eq!(menu_names(&menus), vec!["Pacientes", "Consultas"]);

    assert_eq!(module_names(&menus[0]), vec!["Registro de Pacientes"]);
    assert_eq!(
        codenames(&menus[0], "Registro de Pacientes"),
        vec!["view_patient", "add_patient", "change_patient", "delete_patient"]
    );

    assert_eq!(module_names(&menus[1]), vec!["Diagnósticos"]);
    assert_eq!(
        codenames(&menus[1], "Diagnósticos"),
        vec!["view_diagnosis", "add_diagnosis", "change_diagnosis"]
    );
}

#[test]
async fn test_assistant_sees_restricted_permissions() {
    let repo = seeded_repo().await;
    let assistant = user(&repo, "asistente").await;
    let mut session = SessionState::default();

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(assistant), &mut session, &no_query(), &Method::GET)
        .await;

    let menus = context.menu_list.unwrap();
    assert_eq!(menu_names(&menus), vec!["Pacientes", "Consultas"]);
    assert_eq!(
        codenames(&menus[0], "Registro de Pacientes"),
        vec!["view_patient", "add_patient"]
    );
    assert_eq!(codenames(&menus[1], "Diagnósticos"), vec!["view_diagnosis"]);
}

#[test]
async fn test_existing_session_group_is_kept_without_override() {
    let repo = seeded_repo().await;
    let doctor = user(&repo, "drgomez").await;
    let asistentes = group(&repo, "Asistentes").await;
    let mut session = SessionState {
        group_id: Some(asistentes.id),
    };

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(doctor), &mut session, &no_query(), &Method::GET)
        .await;

    assert_eq!(session.group_id, Some(asistentes.id));
    assert_eq!(context.group.map(|g| g.name), Some("Asistentes".to_string()));
}

#[test]
async fn test_gpid_override_is_trusted_without_membership_check() {
    let repo = seeded_repo().await;
    let doctor = user(&repo, "drgomez").await;
    let asistentes = group(&repo, "Asistentes").await;
    let mut session = SessionState::default();

    let context = resolver(&repo)
        .resolve(
            &Principal::Authenticated(doctor),
            &mut session,
            &gpid(&asistentes.id.to_string()),
            &Method::GET,
        )
        .await;

    assert_eq!(session.group_id, Some(asistentes.id));
    assert_eq!(context.group.as_ref().map(|g| g.id), Some(asistentes.id));

    let menus = context.menu_list.unwrap();
    assert_eq!(codenames(&menus[1], "Diagnósticos"), vec!["view_diagnosis"]);
}

#[test]
async fn test_gpid_for_missing_group_yields_empty_menu() {
    let repo = seeded_repo().await;
    let doctor = user(&repo, "drgomez").await;
    let mut session = SessionState::default();

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(doctor), &mut session, &gpid("999999"), &Method::GET)
        .await;

    assert_eq!(session.group_id, Some(999999));
    assert!(context.group.is_none());
    assert_eq!(context.menu_list, Some(vec![]));
    assert!(matches!(context.menu_error, Some(MenuError::GroupNotFound(999999))));
    // The group list itself is unaffected by a stale reference.
    assert_eq!(context.group_list.map(|g| g.len()), Some(1));
}

#[test]
async fn test_non_numeric_gpid_keeps_previous_group() {
    let repo = seeded_repo().await;
    let doctor = user(&repo, "drgomez").await;
    let asistentes = group(&repo, "Asistentes").await;
    let mut session = SessionState {
        group_id: Some(asistentes.id),
    };

    for raw in ["abc", "1.5", "", "  "] {
        let context = resolver(&repo)
            .resolve(&Principal::Authenticated(doctor.clone()), &mut session, &gpid(raw), &Method::GET)
            .await;

        assert_eq!(session.group_id, Some(asistentes.id), "gpid={:?} must be ignored", raw);
        assert_eq!(context.group.map(|g| g.id), Some(asistentes.id));
    }
}

#[test]
async fn test_user_without_groups_gets_no_menu_list() {
    let repo = seeded_repo().await;
    let loner = plain_user(&repo, "recepcion").await;
    let mut session = SessionState::default();

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(loner), &mut session, &no_query(), &Method::GET)
        .await;

    assert_eq!(context.group_list, Some(vec![]));
    assert_eq!(session.group_id, None);
    assert!(context.group.is_none());
    assert!(context.menu_list.is_none());
}

#[test]
async fn test_inactive_module_hides_its_menu() {
    let repo = seeded_repo().await;
    let doctor = user(&repo, "drgomez").await;

    let diagnosticos = repo
        .active_modules()
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.name == "Diagnósticos")
        .unwrap();
    repo.set_module_active(diagnosticos.id, false).await.unwrap();

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(doctor), &mut SessionState::default(), &no_query(), &Method::GET)
        .await;

    let menus = context.menu_list.unwrap();
    assert_eq!(menu_names(&menus), vec!["Pacientes"]);
}

// --- SUPERUSER RESOLUTION ---

#[test]
async fn test_superuser_sees_full_catalog_with_declared_permissions() {
    let repo = seeded_repo().await;
    let admin = superuser(&repo).await;
    let mut session = SessionState::default();

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(admin), &mut session, &gpid("1"), &Method::GET)
        .await;

    // Session and group handling are bypassed entirely.
    assert_eq!(session, SessionState::default());
    assert!(context.group.is_none());

    let menus = context.menu_list.unwrap();
    assert_eq!(menu_names(&menus), vec!["Pacientes", "Consultas", "Administración"]);
    assert_eq!(
        module_names(&menus[0]),
        vec!["Registro de Pacientes", "Historial Médico", "Seguimiento"]
    );
    assert_eq!(module_names(&menus[1]), vec!["Citas", "Diagnósticos", "Recetas"]);
    assert_eq!(module_names(&menus[2]), vec!["Usuarios", "Configuración", "Reportes"]);

    assert_eq!(codenames(&menus[0], "Registro de Pacientes").len(), 4);
    // Not restricted by any grant: delete is included.
    assert_eq!(
        codenames(&menus[1], "Diagnósticos"),
        vec!["view_diagnosis", "add_diagnosis", "change_diagnosis", "delete_diagnosis"]
    );
    assert!(codenames(&menus[2], "Usuarios").is_empty());
}

#[test]
async fn test_superuser_menu_without_active_modules_is_absent() {
    let repo = seeded_repo().await;
    let admin = superuser(&repo).await;

    let admin_modules: Vec<i64> = repo
        .active_modules()
        .await
        .unwrap()
        .into_iter()
        .filter(|m| ["usuarios/", "configuracion/", "reportes/"].contains(&m.url.as_str()))
        .map(|m| m.id)
        .collect();
    assert_eq!(admin_modules.len(), 3);
    for id in admin_modules {
        repo.set_module_active(id, false).await.unwrap();
    }

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(admin), &mut SessionState::default(), &no_query(), &Method::GET)
        .await;

    assert_eq!(menu_names(&context.menu_list.unwrap()), vec!["Pacientes", "Consultas"]);
}

// --- DEGRADATION ---

#[test]
async fn test_store_failure_degrades_to_empty_menu() {
    let repo = seeded_repo().await;
    let doctor = user(&repo, "drgomez").await;
    repo.set_failing_reads(true);

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(doctor), &mut SessionState::default(), &no_query(), &Method::GET)
        .await;

    assert!(context.user.is_some(), "base fields survive a failing store");
    assert_eq!(context.menu_list, Some(vec![]));
    assert!(matches!(context.menu_error, Some(MenuError::Repository(_))));

    let json = serde_json::to_value(&context).unwrap();
    assert!(json.get("menu_error").is_none());
    assert_eq!(json["menu_list"], serde_json::json!([]));
}

#[test]
async fn test_group_menu_list_direct_call() {
    let repo = seeded_repo().await;
    let medicos = group(&repo, "Médicos").await;

    let menus = resolver(&repo).group_menu_list(&medicos).await.unwrap();
    let json = serde_json::to_value(&menus).unwrap();

    // Template-facing key for the module list.
    assert!(json[0].get("group_module_permission_list").is_some());
    assert_eq!(json[0]["menu"]["name"], "Pacientes");
}

// --- DISPLAY ORDER ---

/// A store whose menus and modules are inserted in the reverse of their display order.
async fn reversed_catalog() -> (Arc<clinic_security::InMemoryRepository>, Group) {
    let repo = Arc::new(clinic_security::InMemoryRepository::new());

    let late = NewMenu { name: "Late".to_string(), icon: String::new(), order: 9 };
    let early = NewMenu { name: "Early".to_string(), icon: String::new(), order: 1 };
    let (late, _) = repo.get_or_create_menu(&late).await.unwrap();
    let (early, _) = repo.get_or_create_menu(&early).await.unwrap();

    let mut module_ids = Vec::new();
    for (url, menu_id, order) in [("z/", late.id, 1), ("b/", early.id, 2), ("a/", early.id, 1)] {
        let new_module = NewModule {
            url: url.to_string(),
            name: url.to_string(),
            menu_id,
            description: String::new(),
            icon: String::new(),
            order,
        };
        module_ids.push(repo.get_or_create_module(&new_module).await.unwrap().0.id);
    }

    let (staff, _) = repo.get_or_create_group("Staff").await.unwrap();
    for module_id in module_ids {
        repo.get_or_create_grant(staff.id, module_id).await.unwrap();
    }
    (repo, staff)
}

fn module_urls(entry: &MenuEntry) -> Vec<&str> {
    entry.modules.iter().map(|m| m.module.url.as_str()).collect()
}

#[test]
async fn test_group_menu_follows_order_not_insertion() {
    let (repo, staff) = reversed_catalog().await;

    let menus = resolver(&repo).group_menu_list(&staff).await.unwrap();

    assert_eq!(menu_names(&menus), vec!["Early", "Late"]);
    assert_eq!(module_urls(&menus[0]), vec!["a/", "b/"]);
    assert_eq!(module_urls(&menus[1]), vec!["z/"]);
}

#[test]
async fn test_superuser_menu_follows_order_not_insertion() {
    let (repo, _) = reversed_catalog().await;
    let admin = superuser(&repo).await;

    let context = resolver(&repo)
        .resolve(&Principal::Authenticated(admin), &mut SessionState::default(), &no_query(), &Method::GET)
        .await;

    let menus = context.menu_list.unwrap();
    assert_eq!(menu_names(&menus), vec!["Early", "Late"]);
    assert_eq!(module_urls(&menus[0]), vec!["a/", "b/"]);
}
