use stack_doctor::app::checks::settings::planned_ops;
use stack_doctor::core::patcher::{self, PatchOp};
use stack_doctor::Profile;

const BASE: &str = include_str!("fixtures/base_settings.py");

/// 內建設定檔的規則套用到 cookiecutter 設定檔後應收斂
#[test]
fn test_builtin_rules_converge_on_cookiecutter_settings() {
    let profile = Profile::builtin().unwrap();
    let section = &profile.settings;

    let ops = planned_ops(section, BASE);
    assert!(!ops.is_empty());

    let first = patcher::apply_all(&section.file, BASE, &ops).unwrap();
    assert!(first.changed());

    let again = planned_ops(section, &first.content);
    let second = patcher::apply_all(&section.file, &first.content, &again).unwrap();
    assert!(!second.changed(), "{:?}", second.changes);
    assert_eq!(second.content, first.content);
}

#[test]
fn test_patched_settings_content() {
    let profile = Profile::builtin().unwrap();
    let section = &profile.settings;
    let patched = patcher::apply_all(&section.file, BASE, &planned_ops(section, BASE))
        .unwrap()
        .content;

    let apps = patcher::list_entries(&patched, "THIRD_PARTY_APPS").unwrap();
    assert_eq!(apps.iter().filter(|a| a.as_str() == "django_tables2").count(), 1);
    assert!(patcher::duplicate_entries(&patched, &section.app_lists).is_empty());

    let middleware = patcher::list_entries(&patched, "MIDDLEWARE").unwrap();
    let auth = middleware
        .iter()
        .position(|m| m == "django.contrib.auth.middleware.AuthenticationMiddleware")
        .unwrap();
    assert_eq!(
        middleware[auth + 1],
        "oscar.apps.basket.middleware.BasketMiddleware"
    );

    assert!(patched.contains("SITE_ID = 1"));
    assert!(!patched.contains("from oscar import get_core_apps\n"));
}

#[test]
fn test_remove_duplicates_keeps_first_occurrence() {
    let content = "INSTALLED_APPS = [\n    \"wagtail\",\n    \"oscar\",\n    \"wagtail\",\n]\n";
    let op = PatchOp::RemoveDuplicateEntries {
        lists: vec!["INSTALLED_APPS".to_string()],
        entry: "wagtail".to_string(),
    };

    let patched = op.apply(content).unwrap().unwrap();
    assert_eq!(
        patcher::list_entries(&patched, "INSTALLED_APPS").unwrap(),
        vec!["wagtail", "oscar"]
    );
    assert!(op.apply(&patched).unwrap().is_none());
}
