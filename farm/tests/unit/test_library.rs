//! JSON library tests

use tempfile::TempDir;

use farmctl::errors::FarmError;
use farmctl::filesys::Dir;
use farmctl::library::{GroupSource, JsonLibrary, MacroSource};
use farmctl::macros::StepAction;

struct Fixture {
    _root: TempDir,
    library: JsonLibrary,
}

fn fixture(groups: &[(&str, &str)], macros: &[(&str, &str)]) -> Fixture {
    let root = TempDir::new().unwrap();
    let groups_dir = root.path().join("groups");
    let macros_dir = root.path().join("macros");
    std::fs::create_dir_all(&groups_dir).unwrap();
    std::fs::create_dir_all(&macros_dir).unwrap();

    for (name, body) in groups {
        std::fs::write(groups_dir.join(name), body).unwrap();
    }
    for (name, body) in macros {
        std::fs::write(macros_dir.join(name), body).unwrap();
    }

    Fixture {
        library: JsonLibrary::new(Dir::new(groups_dir), Dir::new(macros_dir)),
        _root: root,
    }
}

#[tokio::test]
async fn test_group_by_file_name() {
    let fx = fixture(
        &[("g1.json", r#"{ "id": "g1", "name": "Rack A", "devices": ["d1", "d2"] }"#)],
        &[],
    );

    let group = fx.library.group("g1").await.unwrap();
    assert_eq!(group.name, "Rack A");
    assert_eq!(group.devices, vec!["d1", "d2"]);
}

#[tokio::test]
async fn test_group_found_by_scanning() {
    let fx = fixture(
        &[
            ("rack-a.json", r#"{ "id": "a", "devices": ["d1"] }"#),
            ("rack-b.json", r#"{ "id": "b", "devices": ["d2", "d3"] }"#),
            ("broken.json", "{ not json"),
            ("notes.txt", "ignored"),
        ],
        &[],
    );

    let group = fx.library.group("b").await.unwrap();
    assert_eq!(group.devices, vec!["d2", "d3"]);

    let ids: Vec<String> = fx.library.groups().await.unwrap().into_iter().map(|g| g.id).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_unknown_group_is_not_found() {
    let fx = fixture(&[("g1.json", r#"{ "id": "g1" }"#)], &[]);

    let result = fx.library.group("g2").await;
    assert!(matches!(result, Err(FarmError::NotFound(_))));

    let result = fx.library.group("../g1").await;
    assert!(matches!(result, Err(FarmError::NotFound(_))));
}

#[tokio::test]
async fn test_load_macro() {
    let fx = fixture(
        &[],
        &[(
            "warmup.json",
            r#"{
                "meta": { "id": "warmup", "name": "Warm up" },
                "steps": [
                    { "type": "TAP", "x": 0.5, "y": 0.5 },
                    { "type": "WAIT", "durationMs": 250, "dtMs": 10 }
                ],
                "settings": { "randomize": { "xyJitterPct": 2 } }
            }"#,
        )],
    );

    let definition = fx.library.load_macro("warmup").await.unwrap();
    assert_eq!(definition.id(), "warmup");
    assert_eq!(definition.steps.len(), 2);
    assert_eq!(definition.steps[0].action, StepAction::Tap { x: 0.5, y: 0.5 });
    assert_eq!(definition.steps[1].dt_ms, 10);
    assert_eq!(definition.settings.randomize.xy_jitter_pct, 2.0);
    assert_eq!(definition.settings.randomize.delay_jitter_pct, 0.0);
}

#[tokio::test]
async fn test_missing_or_unsafe_macro_is_not_found() {
    let fx = fixture(&[], &[]);

    for id in ["nope", "../../etc/passwd", ""] {
        let result = fx.library.load_macro(id).await;
        assert!(matches!(result, Err(FarmError::NotFound(_))), "{id:?}");
    }
}

#[tokio::test]
async fn test_malformed_macro_is_an_error() {
    let fx = fixture(&[], &[("bad.json", r#"{ "steps": "nope" }"#)]);

    let result = fx.library.load_macro("bad").await;
    assert!(result.is_err());
    assert!(!matches!(result, Err(FarmError::NotFound(_))));
}
