use retrace::testing::{init_tracing, MockDesktop, MockElement, MockPoller};
use retrace::{Action, Key, Point, Rect};
use retrace_recorder::{
    InputOrigin, ManualInputSource, RawInputEvent, Recorder, RecorderConfig, RecorderError,
    RecorderEvent, RecorderState,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn quiet_config() -> RecorderConfig {
    RecorderConfig {
        settle_window_ms: 0,
        capture_timeline: false,
        poll_interval_ms: 10,
        ..RecorderConfig::default()
    }
}

fn start(mock: &MockDesktop, config: RecorderConfig) -> (Recorder, Arc<ManualInputSource>) {
    let source = Arc::new(ManualInputSource::new());
    let mut recorder = Recorder::new(mock.desktop(), config).with_input_source(source.clone());
    recorder.start().unwrap();
    (recorder, source)
}

fn type_str(source: &ManualInputSource, text: &str) {
    for c in text.chars() {
        source.emit(RawInputEvent::char(c));
    }
}

#[test]
fn test_duplicate_click_notifications_make_one_step() {
    init_tracing();
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::new("OK")
            .with_bounds(Rect::new(10, 10, 40, 20))
            .to_element(),
    );
    let (mut recorder, source) = start(&mock, quiet_config());

    let t0 = Instant::now();
    source.emit(RawInputEvent::click(Point::new(20, 20)).at(t0));
    source.emit(
        RawInputEvent::click(Point::new(21, 20))
            .with_origin(InputOrigin::Poll)
            .at(t0 + Duration::from_millis(30)),
    );
    assert_eq!(recorder.steps().len(), 1);

    source.emit(RawInputEvent::click(Point::new(20, 20)).at(t0 + Duration::from_millis(300)));
    let script = recorder.stop().unwrap();
    assert_eq!(script.steps.len(), 2);
    assert!(script.steps.iter().all(|s| s.action == Action::Click));
    assert_eq!(script.steps[0].target.as_ref().unwrap().name(), Some("OK"));
    // Named targets replay structurally; no literal fallback is stored.
    assert_eq!(script.steps[0].value, "");
}

#[test]
fn test_settle_window_drops_the_starting_click() {
    let mock = MockDesktop::new();
    let config = RecorderConfig {
        settle_window_ms: 400,
        ..quiet_config()
    };
    let (mut recorder, source) = start(&mock, config);

    source.emit(RawInputEvent::click(Point::new(5, 5)));
    assert!(recorder.steps().is_empty());

    source.emit(RawInputEvent::click(Point::new(5, 5)).at(Instant::now() + Duration::from_millis(500)));
    assert_eq!(recorder.stop().unwrap().steps.len(), 1);
}

#[test]
fn test_clicks_outside_scoped_process_are_discarded() {
    let mock = MockDesktop::new();
    mock.engine.add(
        "calc.exe",
        MockElement::new("Equals")
            .with_pid(8)
            .with_bounds(Rect::new(0, 0, 50, 50))
            .to_element(),
    );
    mock.engine.add(
        "notepad.exe",
        MockElement::new("Save")
            .with_pid(7)
            .with_bounds(Rect::new(100, 0, 50, 50))
            .to_element(),
    );
    let config = RecorderConfig {
        process_name: Some("Notepad".to_string()),
        ..quiet_config()
    };
    let (mut recorder, source) = start(&mock, config);

    source.emit(RawInputEvent::click(Point::new(10, 10)));
    source.emit(RawInputEvent::click(Point::new(120, 10)));
    let script = recorder.stop().unwrap();
    assert_eq!(script.app, "Notepad");
    assert_eq!(script.steps.len(), 1);
    assert_eq!(script.steps[0].target.as_ref().unwrap().name(), Some("Save"));
}

#[test]
fn test_weak_target_gets_reference_image() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::anonymous()
            .with_control_type("Button")
            .with_bounds(Rect::new(20, 20, 30, 10))
            .to_element(),
    );
    let config = RecorderConfig {
        image_dir: Some(dir.path().to_path_buf()),
        ..quiet_config()
    };
    let (mut recorder, source) = start(&mock, config);

    source.emit(RawInputEvent::click(Point::new(25, 22)));
    let script = recorder.stop().unwrap();
    let step = &script.steps[0];
    let target = step.target.as_ref().unwrap();
    assert_eq!(target.control_type(), Some("Button"));
    assert_eq!(step.value, "25,22");

    let path = target.image_path().expect("weak target should carry an image");
    let image = image::open(path).unwrap();
    // Element bounds plus 6px padding on every side
    assert_eq!((image.width(), image.height()), (42, 22));
}

#[test]
fn test_strong_target_skips_image_unless_forced() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::new("OK")
            .with_bounds(Rect::new(20, 20, 30, 10))
            .to_element(),
    );
    let config = RecorderConfig {
        image_dir: Some(dir.path().to_path_buf()),
        ..quiet_config()
    };
    let (mut recorder, source) = start(&mock, config.clone());
    source.emit(RawInputEvent::click(Point::new(25, 22)));
    let script = recorder.stop().unwrap();
    assert!(script.steps[0].target.as_ref().unwrap().image_path.is_none());

    let (mut recorder, source) = start(
        &mock,
        RecorderConfig {
            capture_images: true,
            ..config
        },
    );
    source.emit(RawInputEvent::click(Point::new(25, 22)));
    let script = recorder.stop().unwrap();
    assert!(script.steps[0].target.as_ref().unwrap().image_path.is_some());
}

#[test]
fn test_click_on_nothing_records_coordinates_and_crop() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockDesktop::new();
    let config = RecorderConfig {
        image_dir: Some(dir.path().to_path_buf()),
        ..quiet_config()
    };
    let (mut recorder, source) = start(&mock, config);

    source.emit(RawInputEvent::click(Point::new(150, 100)));
    let script = recorder.stop().unwrap();
    let step = &script.steps[0];
    assert_eq!(step.value, "150,100");
    let target = step.target.as_ref().unwrap();
    assert!(!target.has_structural_fields());
    let image = image::open(target.image_path().unwrap()).unwrap();
    assert_eq!((image.width(), image.height()), (48, 48));
}

#[test]
fn test_capture_failure_does_not_stop_recording() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockDesktop::new();
    mock.screen.set_failing(true);
    let config = RecorderConfig {
        image_dir: Some(dir.path().to_path_buf()),
        ..quiet_config()
    };
    let (mut recorder, source) = start(&mock, config);
    let mut events = recorder.subscribe();

    source.emit(RawInputEvent::click(Point::new(150, 100)));
    assert!(matches!(
        events.try_recv(),
        Ok(RecorderEvent::CaptureFailed { .. })
    ));
    assert_eq!(recorder.state(), RecorderState::Recording);
    let script = recorder.stop().unwrap();
    assert_eq!(script.steps.len(), 1);
    assert!(script.steps[0].target.as_ref().unwrap().image_path.is_none());
    assert_eq!(script.steps[0].value, "150,100");
}

#[test]
fn test_timeline_frame_highlights_clicked_bounds() {
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::new("OK")
            .with_bounds(Rect::new(20, 20, 30, 10))
            .to_element(),
    );
    let config = RecorderConfig {
        capture_timeline: true,
        ..quiet_config()
    };
    let (mut recorder, source) = start(&mock, config);
    let mut events = recorder.subscribe();

    source.emit(RawInputEvent::click(Point::new(25, 22)));
    match events.try_recv() {
        Ok(RecorderEvent::StepAppended {
            index: 0,
            timeline: Some(frame),
            ..
        }) => {
            assert_eq!(frame.dimensions(), (200, 150));
            assert_eq!(frame.get_pixel(20, 20).0, [255, 0, 0, 255]);
            assert_eq!(frame.get_pixel(35, 25).0, [255, 255, 255, 255]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    recorder.stop().unwrap();
}

#[test]
fn test_typing_into_editable_field_becomes_set_text() {
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::new("User")
            .with_automation_id("user")
            .editable("")
            .with_bounds(Rect::new(0, 0, 100, 20))
            .to_element(),
    );
    let (mut recorder, source) = start(&mock, quiet_config());

    source.emit(RawInputEvent::click(Point::new(10, 10)));
    type_str(&source, "abc");
    source.emit(RawInputEvent::key_down(Key::Enter));

    let script = recorder.stop().unwrap();
    let actions: Vec<Action> = script.steps.iter().map(|s| s.action).collect();
    assert_eq!(actions, vec![Action::Click, Action::SetText, Action::TypeText]);
    assert_eq!(script.steps[1].value, "abc");
    assert_eq!(
        script.steps[1].target.as_ref().unwrap().automation_id(),
        Some("user")
    );
    assert_eq!(script.steps[2].value, "{ENTER}");
    assert_eq!(recorder.state(), RecorderState::Idle);
}

#[test]
fn test_tab_moves_typing_to_the_focused_field() {
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::new("User")
            .with_automation_id("user")
            .editable("")
            .with_bounds(Rect::new(0, 0, 100, 20))
            .to_element(),
    );
    let password = MockElement::new("Password")
        .with_automation_id("pass")
        .editable("")
        .with_bounds(Rect::new(0, 30, 100, 20))
        .to_element();
    let (mut recorder, source) = start(&mock, quiet_config());

    source.emit(RawInputEvent::click(Point::new(10, 10)));
    type_str(&source, "alice");
    source.emit(RawInputEvent::key_down(Key::Tab));
    mock.engine.set_focused(Some(password));
    type_str(&source, "secret");
    source.emit(RawInputEvent::key_down(Key::Enter));

    let script = recorder.stop().unwrap();
    let steps: Vec<(Action, Option<&str>, &str)> = script
        .steps
        .iter()
        .map(|s| {
            (
                s.action,
                s.target.as_ref().and_then(|t| t.automation_id()),
                s.value.as_str(),
            )
        })
        .collect();
    assert_eq!(
        steps,
        vec![
            (Action::Click, Some("user"), ""),
            (Action::SetText, Some("user"), "alice"),
            (Action::TypeText, None, "{TAB}"),
            (Action::SetText, Some("pass"), "secret"),
            (Action::TypeText, None, "{ENTER}"),
        ]
    );
}

#[test]
fn test_tab_into_plain_control_types_at_focus() {
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::new("User")
            .with_automation_id("user")
            .editable("")
            .with_bounds(Rect::new(0, 0, 100, 20))
            .to_element(),
    );
    let (mut recorder, source) = start(&mock, quiet_config());

    source.emit(RawInputEvent::click(Point::new(10, 10)));
    type_str(&source, "alice");
    source.emit(RawInputEvent::key_down(Key::Tab));
    type_str(&source, "x");

    let script = recorder.stop().unwrap();
    let last = script.steps.last().unwrap();
    assert_eq!(last.action, Action::TypeText);
    assert_eq!(last.value, "x");
    assert!(last.target.is_none());
}

#[test]
fn test_split_typing_into_one_field_keeps_the_whole_value() {
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::new("Note")
            .with_automation_id("note")
            .editable("")
            .with_bounds(Rect::new(0, 0, 200, 20))
            .to_element(),
    );
    let (mut recorder, _source) = start(&mock, quiet_config());

    let t0 = Instant::now();
    recorder.handle_event(RawInputEvent::click(Point::new(10, 10)).at(t0));
    for c in "hello".chars() {
        recorder.handle_event(RawInputEvent::char(c).at(t0));
    }
    recorder.tick(t0 + Duration::from_millis(1600));
    let t1 = t0 + Duration::from_millis(2000);
    for c in " world".chars() {
        recorder.handle_event(RawInputEvent::char(c).at(t1));
    }

    let script = recorder.stop().unwrap();
    let set_texts: Vec<&str> = script
        .steps
        .iter()
        .filter(|s| s.action == Action::SetText)
        .map(|s| s.value.as_str())
        .collect();
    // The last SetText replays the field exactly as typed.
    assert_eq!(set_texts, vec!["hello", "hello world"]);
}

#[test]
fn test_untargeted_typing_becomes_type_text() {
    let mock = MockDesktop::new();
    let (mut recorder, source) = start(&mock, quiet_config());

    type_str(&source, "helo");
    source.emit(RawInputEvent::key_down(Key::Backspace));
    source.emit(RawInputEvent::key_down(Key::Backspace));
    type_str(&source, "llo");
    source.emit(RawInputEvent::key_down(Key::Tab));

    let script = recorder.stop().unwrap();
    let values: Vec<(Action, &str)> = script
        .steps
        .iter()
        .map(|s| (s.action, s.value.as_str()))
        .collect();
    assert_eq!(
        values,
        vec![(Action::TypeText, "hello"), (Action::TypeText, "{TAB}")]
    );
    assert!(script.steps[0].target.is_none());
}

#[test]
fn test_clicking_elsewhere_commits_pending_text_first() {
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::new("Next")
            .with_bounds(Rect::new(50, 50, 20, 20))
            .to_element(),
    );
    let (mut recorder, source) = start(&mock, quiet_config());

    type_str(&source, "ab");
    source.emit(RawInputEvent::click(Point::new(60, 60)));
    let script = recorder.stop().unwrap();
    assert_eq!(script.steps[0].action, Action::TypeText);
    assert_eq!(script.steps[0].value, "ab");
    assert_eq!(script.steps[1].action, Action::Click);
}

#[test]
fn test_chords_are_not_typed() {
    let mock = MockDesktop::new();
    let (mut recorder, source) = start(&mock, quiet_config());

    source.emit(RawInputEvent::key_down(Key::Control));
    source.emit(RawInputEvent::char('c'));
    source.emit(RawInputEvent::key_up(Key::Control));
    source.emit(RawInputEvent::key_down(Key::Shift));
    source.emit(RawInputEvent::char('X'));
    source.emit(RawInputEvent::key_up(Key::Shift));
    source.emit(RawInputEvent::char('\u{8}'));

    let script = recorder.stop().unwrap();
    assert_eq!(script.steps.len(), 1);
    assert_eq!(script.steps[0].value, "X");
}

#[test]
fn test_idle_pause_flushes_buffer() {
    let mock = MockDesktop::new();
    let (mut recorder, _source) = start(&mock, quiet_config());

    let t0 = Instant::now();
    for c in "abc".chars() {
        recorder.handle_event(RawInputEvent::char(c).at(t0));
    }
    recorder.tick(t0 + Duration::from_millis(1000));
    assert!(recorder.steps().is_empty());

    recorder.tick(t0 + Duration::from_millis(1600));
    let steps = recorder.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].action, Action::TypeText);
    assert_eq!(steps[0].value, "abc");

    // Nothing left to flush on stop.
    assert_eq!(recorder.stop().unwrap().steps.len(), 1);
}

#[test]
fn test_stop_flushes_pending_text() {
    let mock = MockDesktop::new();
    let (mut recorder, source) = start(&mock, quiet_config());
    type_str(&source, "pending");
    let script = recorder.stop().unwrap();
    assert_eq!(script.steps.len(), 1);
    assert_eq!(script.steps[0].value, "pending");
    // Detached: later events go nowhere.
    assert!(!source.emit(RawInputEvent::char('x')));
}

#[test]
fn test_pause_suppresses_capture() {
    let mock = MockDesktop::new();
    let (mut recorder, source) = start(&mock, quiet_config());
    let mut events = recorder.subscribe();

    recorder.pause().unwrap();
    assert!(recorder.is_paused());
    assert_eq!(recorder.state(), RecorderState::Recording);
    source.emit(RawInputEvent::click(Point::new(30, 30)));
    type_str(&source, "ignored");
    assert!(recorder.steps().is_empty());

    recorder.resume().unwrap();
    source.emit(RawInputEvent::click(Point::new(30, 30)));
    assert_eq!(recorder.steps().len(), 1);

    assert!(matches!(events.try_recv(), Ok(RecorderEvent::Paused)));
    assert!(matches!(events.try_recv(), Ok(RecorderEvent::Resumed)));
    recorder.stop().unwrap();
}

#[tokio::test]
async fn test_stop_hotkey_from_hook() {
    let mock = MockDesktop::new();
    let (mut recorder, source) = start(&mock, quiet_config());

    type_str(&source, "done");
    source.emit(RawInputEvent::key_down(Key::Control));
    source.emit(RawInputEvent::key_down(Key::Shift));
    source.emit(RawInputEvent::key_down(Key::F(12)));

    tokio::time::timeout(Duration::from_secs(1), recorder.wait_for_stop_request())
        .await
        .expect("stop request");
    assert!(recorder.stop_requested());
    let script = recorder.stop().unwrap();
    assert_eq!(script.steps.len(), 1);
    assert_eq!(script.steps[0].value, "done");
}

#[tokio::test]
async fn test_poll_backs_up_the_hook() {
    init_tracing();
    let mock = MockDesktop::new();
    mock.engine.add(
        "",
        MockElement::new("OK")
            .with_bounds(Rect::new(0, 0, 50, 50))
            .to_element(),
    );
    let poller = Arc::new(MockPoller::new());
    poller.set_cursor(Point::new(25, 25));
    poller.set_left_button(true);

    let source = Arc::new(ManualInputSource::new());
    let mut recorder = Recorder::new(mock.desktop(), quiet_config())
        .with_input_source(source.clone())
        .with_poller(poller.clone());
    recorder.start().unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    // The button is still held; only the press edge counts.
    assert_eq!(recorder.steps().len(), 1);
    // The hook reporting the same click late is debounced.
    source.emit(RawInputEvent::click(Point::new(25, 25)));
    assert_eq!(recorder.steps().len(), 1);

    poller.press(&[Key::Control, Key::Shift, Key::F(12)]);
    tokio::time::timeout(Duration::from_secs(1), recorder.wait_for_stop_request())
        .await
        .expect("stop request");
    let script = recorder.stop().unwrap();
    assert_eq!(script.steps.len(), 1);
}

#[test]
fn test_state_transitions_are_checked() {
    let mock = MockDesktop::new();
    let mut recorder = Recorder::new(mock.desktop(), quiet_config());
    assert_eq!(recorder.state(), RecorderState::Idle);
    assert!(matches!(recorder.stop(), Err(RecorderError::InvalidState(_))));
    assert!(matches!(recorder.pause(), Err(RecorderError::InvalidState(_))));

    recorder.start().unwrap();
    assert!(matches!(recorder.start(), Err(RecorderError::InvalidState(_))));
    recorder.stop().unwrap();

    // A stopped recorder can record again from scratch.
    recorder.start().unwrap();
    recorder.handle_event(RawInputEvent::char('z'));
    assert_eq!(recorder.stop().unwrap().steps[0].value, "z");
}

#[test]
fn test_stop_and_save_writes_script() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.json");
    let mock = MockDesktop::new();
    let (mut recorder, source) = start(&mock, quiet_config());
    type_str(&source, "hi");
    recorder.stop_and_save(&path).unwrap();

    let loaded = retrace::Script::load_from_file(&path).unwrap();
    assert_eq!(loaded.steps.len(), 1);
    assert_eq!(loaded.steps[0].value, "hi");
}
