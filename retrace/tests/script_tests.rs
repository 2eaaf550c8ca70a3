use retrace::{Action, Offset, Script, Step, Target};

#[test]
fn test_script_round_trip_keeps_absent_and_empty_apart() {
    let mut script = Script::new("notepad.exe");
    script.push(
        Step::new(Action::Click).with_target(Target {
            automation_id: Some(String::new()),
            name: Some("Save".to_string()),
            offset: Some(Offset { dx: 3, dy: -1 }),
            ..Target::default()
        }),
    );
    script.push(
        Step::new(Action::SetText)
            .with_target(Target {
                class_name: Some("Edit".to_string()),
                image_path: Some("images/step1.png".to_string()),
                ..Target::default()
            })
            .with_value("{{name}}")
            .with_delay_ms(250)
            .with_note("customer name"),
    );
    script.push(Step::new(Action::Delay).with_value("100"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.json");
    script.save_to_file(&path).unwrap();
    let loaded = Script::load_from_file(&path).unwrap();
    assert_eq!(loaded, script);

    let first = loaded.steps[0].target.as_ref().unwrap();
    assert_eq!(first.automation_id, Some(String::new()));
    assert_eq!(first.class_name, None);
    assert!(loaded.steps[2].target.is_none());
}

#[test]
fn test_script_json_shape() {
    let json = r#"{
        "app": "",
        "steps": [
            { "action": "AssertTextEquals", "target": { "name": "Total" }, "value": "42" },
            { "action": "TypeText", "value": "hi{ENTER}" }
        ]
    }"#;
    let script: Script = serde_json::from_str(json).unwrap();
    assert_eq!(script.steps.len(), 2);
    assert_eq!(script.steps[0].action, Action::AssertTextEquals);
    assert_eq!(script.steps[1].delay_ms, None);
    assert_eq!(script.scope(), retrace::Scope::Desktop);

    let out = serde_json::to_value(&script.steps[1]).unwrap();
    assert!(out.get("target").is_none());
    assert!(out.get("note").is_none());
}

#[test]
fn test_runner_config_partial_json() -> anyhow::Result<()> {
    let config: retrace::RunnerConfig =
        serde_json::from_str(r#"{ "retry_count": 5, "stop_hotkey": "Ctrl+Alt+Q" }"#)?;
    assert_eq!(config.retry_count, 5);
    assert_eq!(config.retry_delay_ms, 500);
    assert_eq!(config.locator_timeout_ms, 6000);
    assert_eq!(config.stop_hotkey.to_string(), "CTRL+ALT+Q");
    assert!((config.template_threshold - 0.08).abs() < f64::EPSILON);
    Ok(())
}
