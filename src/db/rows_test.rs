use super::*;
use serde_json::json;

fn scene_row(widgets: Option<serde_json::Value>) -> SceneRow {
    SceneRow {
        id: Uuid::new_v4(),
        workspace_id: Uuid::new_v4(),
        name: "Board".into(),
        canvas_data: Some(json!({ "elements": [], "appState": {} })),
        widgets,
        share_token: None,
        share_permission: Some("none".into()),
        created_at: 10,
        updated_at: 20,
    }
}

fn widget_json(id: &str) -> serde_json::Value {
    json!({
        "id": id, "x": 100.0, "y": 100.0, "width": 400.0, "height": 300.0,
        "code": "print(1)", "language": "python", "isMinimized": false
    })
}

#[test]
fn widgets_decode_from_array() {
    let scene = Scene::from(scene_row(Some(json!([widget_json("a"), widget_json("b")]))));
    assert_eq!(scene.widgets.len(), 2);
    assert_eq!(scene.widgets[0].id, "a");
    assert_eq!(scene.widgets[0].language, crate::model::Language::Python);
}

#[test]
fn widgets_decode_from_json_string() {
    let encoded = serde_json::to_string(&json!([widget_json("a")])).unwrap();
    let scene = Scene::from(scene_row(Some(serde_json::Value::String(encoded))));
    assert_eq!(scene.widgets.len(), 1);
}

#[test]
fn malformed_widgets_fall_back_to_empty() {
    let scene = Scene::from(scene_row(Some(serde_json::Value::String("not json".into()))));
    assert!(scene.widgets.is_empty());

    let scene = Scene::from(scene_row(Some(json!({ "id": "a" }))));
    assert!(scene.widgets.is_empty());

    let scene = Scene::from(scene_row(None));
    assert!(scene.widgets.is_empty());
}

#[test]
fn unknown_share_permission_reads_as_none() {
    let mut row = scene_row(None);
    row.share_token = Some("abc".into());
    row.share_permission = Some("owner".into());
    let scene = Scene::from(row);
    assert_eq!(scene.share_permission, SharePermission::None);
    assert!(!scene.is_shared());
}

#[test]
fn null_canvas_column_is_absent() {
    let mut row = scene_row(None);
    row.canvas_data = Some(serde_json::Value::Null);
    assert!(Scene::from(row).canvas_data.is_none());
}

#[test]
fn scene_maps_back_to_row() {
    let original = scene_row(Some(json!([widget_json("a")])));
    let scene = Scene::from(original.clone());
    let row = SceneRow::from(&scene);
    assert_eq!(row.id, original.id);
    assert_eq!(row.share_permission.as_deref(), Some("none"));
    assert_eq!(row.widgets.as_ref().and_then(|w| w.as_array()).map(Vec::len), Some(1));
    assert_eq!(row.updated_at, 20);
}

#[test]
fn profile_unknown_tier_is_free() {
    let row = ProfileRow { id: Uuid::new_v4(), tier: "gold".into(), current_workspace_id: None, onboarding_complete: true };
    let profile = Profile::from(row);
    assert_eq!(profile.tier, Tier::Free);
    assert!(profile.onboarding_complete);
}

#[test]
fn workspace_round_trips_through_row() {
    let ws = Workspace { id: Uuid::new_v4(), owner_id: Uuid::new_v4(), name: "Home".into(), created_at: 1, updated_at: 2 };
    assert_eq!(Workspace::from(WorkspaceRow::from(&ws)), ws);
}
