//! End-to-end runtime tests: scripted stacks driven tick by tick

use std::sync::{Arc, Mutex};

use decker_core::{Size, Value, Vec2};
use decker_engine::{
    Edge, EngineError, EventPayload, HandlerEvaluator, HandlerInvocation, Runtime, ScriptError,
};
use decker_model::{handlers, ModelId, ModelKind};

const DT: f64 = 1.0 / 60.0;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Test evaluator that records every dispatch and can fail on cue
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<(String, String, EventPayload)>>>,
    finished: Arc<Mutex<Vec<(ModelId, u64)>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<(String, String, EventPayload)> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, handler: &str) -> Vec<(String, EventPayload)> {
        self.calls()
            .into_iter()
            .filter(|(_, h, _)| h == handler)
            .map(|(name, _, payload)| (name, payload))
            .collect()
    }

    fn finished(&self) -> Vec<(ModelId, u64)> {
        self.finished.lock().unwrap().clone()
    }
}

struct RecordingEvaluator {
    recorder: Recorder,
    fail_handler: Option<&'static str>,
}

impl RecordingEvaluator {
    fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            fail_handler: None,
        }
    }

    fn failing_on(recorder: Recorder, handler: &'static str) -> Self {
        Self {
            recorder,
            fail_handler: Some(handler),
        }
    }
}

impl HandlerEvaluator for RecordingEvaluator {
    fn run_handler(&mut self, invocation: &HandlerInvocation) -> Result<(), ScriptError> {
        self.recorder.calls.lock().unwrap().push((
            invocation.model_name.clone(),
            invocation.handler.clone(),
            invocation.payload.clone(),
        ));
        if Some(invocation.handler.as_str()) == self.fail_handler {
            return Err(ScriptError::at_line("boom", 2));
        }
        Ok(())
    }

    fn animation_finished(&mut self, model: ModelId, token: u64) {
        self.recorder.finished.lock().unwrap().push((model, token));
    }
}

fn runtime_with_recorder() -> (Runtime, Recorder) {
    init_tracing();
    let recorder = Recorder::default();
    let runtime = Runtime::new(Box::new(RecordingEvaluator::new(recorder.clone())));
    (runtime, recorder)
}

fn add_shape(runtime: &Runtime, pos: Vec2, size: Size) -> ModelId {
    let scene = runtime.scene();
    let mut scene = scene.lock().unwrap();
    let card = scene.cards()[0];
    let id = scene.new_child(card, ModelKind::Shape).unwrap();
    scene.set_property(id, "position", Value::Point(pos));
    scene.set_property(id, "size", Value::Size(size));
    id
}

#[test]
fn speed_integrates_over_half_a_second() {
    let (mut runtime, _rec) = runtime_with_recorder();
    let shape = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    runtime
        .handle()
        .set_speed(shape, Vec2::new(100.0, 0.0));

    for _ in 0..30 {
        runtime.tick(DT);
    }
    let pos = runtime.handle().position(shape).unwrap();
    assert!((pos.x - 50.0).abs() < 1e-6, "{pos:?}");
    assert_eq!(pos.y, 0.0);
}

#[test]
fn one_sided_bounce_flips_self_only_and_reports_mirrored_edge() {
    let (mut runtime, rec) = runtime_with_recorder();
    // A approaches B from the left; only A registers the partnership
    let a = add_shape(&runtime, Vec2::new(20.0, 15.0), Size::new(10.0, 10.0));
    let b = add_shape(&runtime, Vec2::new(50.0, 0.0), Size::new(40.0, 40.0));
    let handle = runtime.handle();
    handle.set_speed(a, Vec2::new(50.0, 0.0));
    handle.set_bounce_partners(a, &[b]);
    handle
        .set_handler(a, handlers::ON_BOUNCE, "print('bounced')")
        .unwrap();
    handle
        .set_handler(b, handlers::ON_BOUNCE, "print('other side')")
        .unwrap();

    // ~0.5 s of travel covers the 20 px gap and the contact
    for _ in 0..40 {
        runtime.tick(DT);
    }

    let a_speed = handle.speed(a).unwrap();
    let b_speed = handle.speed(b).unwrap();
    assert_eq!(a_speed, Vec2::new(-50.0, 0.0));
    assert_eq!(b_speed, Vec2::ZERO);

    let bounces = rec.calls_for(handlers::ON_BOUNCE);
    assert_eq!(bounces.len(), 1, "{bounces:?}");
    let (name, payload) = &bounces[0];
    assert_eq!(name, &handle.name(a).unwrap());
    match payload {
        EventPayload::Bounce {
            other, other_name, edge,
        } => {
            assert_eq!(*other, b);
            assert_eq!(other_name, &handle.name(b).unwrap());
            assert_eq!(*edge, Edge::Right);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn chained_rotation_animations_run_sequentially() {
    use decker_model::{AnimationDescriptor, AnimationKind};

    let (mut runtime, rec) = runtime_with_recorder();
    let shape = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    let handle = runtime.handle();
    runtime.add_animation(
        shape,
        AnimationDescriptor::new(AnimationKind::rotation(90.0, 0), 2.0).with_completion(1),
    );
    runtime.add_animation(
        shape,
        AnimationDescriptor::new(AnimationKind::rotation(180.0, 0), 1.0).with_completion(2),
    );

    // t = 1.0: first mid-flight, second not started
    runtime.tick(1.0);
    assert_eq!(handle.rotation(shape), Some(45.0));
    assert!(rec.finished().is_empty());

    // t = 2.0: first finishes, second starts in the same tick's finish pass
    runtime.tick(1.0);
    assert_eq!(rec.finished(), vec![(shape, 1)]);
    assert_eq!(handle.rotation(shape), Some(90.0));

    // t = 3.0: second finished at 180
    runtime.tick(1.0);
    assert_eq!(rec.finished(), vec![(shape, 1), (shape, 2)]);
    assert_eq!(handle.rotation(shape), Some(180.0));
}

#[test]
fn rejected_rename_keeps_name_but_notifies() {
    let (mut runtime, _rec) = runtime_with_recorder();
    let shape = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    runtime.take_changes();
    let handle = runtime.handle();
    handle.set_property(shape, "name", Value::from("1bad!name"));
    runtime.tick(DT);

    assert_eq!(handle.name(shape).unwrap(), "shape_1");
    let changes = runtime.take_changes();
    assert!(changes.iter().any(|c| c.key == "name"), "{changes:?}");
}

#[test]
fn deleted_partner_is_pruned_and_queries_stay_safe() {
    let (mut runtime, _rec) = runtime_with_recorder();
    let a = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    let b = add_shape(&runtime, Vec2::new(100.0, 0.0), Size::new(10.0, 10.0));
    let handle = runtime.handle();
    handle.set_speed(a, Vec2::new(10.0, 0.0));
    handle.set_bounce_partners(a, &[b]);
    runtime.tick(DT); // baseline observation

    handle.delete(b).unwrap();
    runtime.tick(DT); // delete applies, detection prunes the dead partner

    {
        let scene = runtime.scene();
        let scene = scene.lock().unwrap();
        assert!(!scene.model(a).unwrap().bounce.contains_key(&b));
        // Torn down but still queryable until the purge tick
        if let Some(m) = scene.model(b) {
            assert!(m.is_torn_down());
            assert!(m.property("name").is_some());
        }
    }

    runtime.tick(DT); // graveyard purge
    assert!(runtime.handle().name(b).is_none());
}

#[test]
fn periodic_runs_every_second_tick_and_carries_elapsed_time() {
    let (mut runtime, rec) = runtime_with_recorder();
    let shape = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    runtime
        .handle()
        .set_handler(shape, handlers::ON_PERIODIC, "self.rotate()")
        .unwrap();

    for _ in 0..8 {
        runtime.tick(DT);
    }
    let periodics = rec.calls_for(handlers::ON_PERIODIC);
    assert_eq!(periodics.len(), 4);
    match &periodics[1].1 {
        EventPayload::Periodic { elapsed } => {
            assert!((elapsed - 2.0 * DT).abs() < 1e-9);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn key_hold_dispatches_to_card_until_release() {
    let (mut runtime, rec) = runtime_with_recorder();
    let card = runtime.current_card();
    {
        let scene = runtime.scene();
        let mut scene = scene.lock().unwrap();
        scene
            .model_mut(card)
            .unwrap()
            .set_handler(handlers::ON_KEY_HOLD, "self.scroll()");
    }
    runtime.key_down("ArrowUp");
    for _ in 0..4 {
        runtime.tick(DT);
    }
    runtime.key_up("ArrowUp");
    for _ in 0..4 {
        runtime.tick(DT);
    }
    let holds = rec.calls_for(handlers::ON_KEY_HOLD);
    assert_eq!(holds.len(), 2);
    match &holds[0].1 {
        EventPayload::KeyHold { key, .. } => assert_eq!(key, "ArrowUp"),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn mouse_moves_coalesce_to_one_dispatch_per_periodic_round() {
    let (mut runtime, rec) = runtime_with_recorder();
    let shape = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    runtime
        .handle()
        .set_handler(shape, handlers::ON_MOUSE_MOVE, "self.track()")
        .unwrap();

    for i in 0..10 {
        runtime.note_mouse_move(shape, Vec2::new(i as f64, 0.0));
    }
    runtime.tick(DT);
    runtime.tick(DT);
    let moves = rec.calls_for(handlers::ON_MOUSE_MOVE);
    assert_eq!(moves.len(), 1);
    match &moves[0].1 {
        EventPayload::Mouse { pos } => assert_eq!(*pos, Vec2::new(9.0, 0.0)),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn handler_errors_are_reported_not_propagated() {
    init_tracing();
    let recorder = Recorder::default();
    let mut runtime = Runtime::new(Box::new(RecordingEvaluator::failing_on(
        recorder.clone(),
        handlers::ON_PERIODIC,
    )));
    let shape = {
        let scene = runtime.scene();
        let mut scene = scene.lock().unwrap();
        let card = scene.cards()[0];
        scene.new_child(card, ModelKind::Shape).unwrap()
    };
    runtime
        .handle()
        .set_handler(shape, handlers::ON_PERIODIC, "oops(")
        .unwrap();

    runtime.tick(DT);
    runtime.tick(DT);
    let errors = runtime.take_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].object, "shape_1");
    assert_eq!(errors[0].handler, handlers::ON_PERIODIC);
    assert_eq!(errors[0].line, Some(2));
    // The stack keeps ticking afterwards
    runtime.tick(DT);
    runtime.tick(DT);
    assert_eq!(runtime.take_errors().len(), 1);
}

#[test]
fn redraw_requests_coalesce_per_tick() {
    let (mut runtime, _rec) = runtime_with_recorder();
    let shape = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    // Flush the setup mutations, then confirm an idle tick stays quiet
    runtime.tick(DT);
    runtime.take_needs_redraw();
    runtime.tick(DT);
    assert!(!runtime.take_needs_redraw());

    runtime.handle().set_speed(shape, Vec2::new(30.0, 0.0));
    runtime.tick(DT);
    assert!(runtime.take_needs_redraw());
    assert!(!runtime.take_needs_redraw());
}

#[test]
fn clone_from_another_thread_blocks_until_applied() {
    let (mut runtime, rec) = runtime_with_recorder();
    let a = add_shape(&runtime, Vec2::new(5.0, 5.0), Size::new(10.0, 10.0));
    runtime
        .handle()
        .set_handler(a, handlers::ON_SETUP, "self.init()")
        .unwrap();
    let handle = runtime.handle();

    let worker = std::thread::spawn(move || handle.clone_model(a).unwrap());
    // Tick until the worker's blocking request is serviced
    let copy = loop {
        runtime.tick(DT);
        if worker.is_finished() {
            break worker.join().unwrap();
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    };

    let handle = runtime.handle();
    assert_eq!(handle.name(copy).unwrap(), "shape_2");
    assert_eq!(handle.position(copy).unwrap(), Vec2::new(5.0, 5.0));
    // The copy ran its on_setup
    assert!(rec
        .calls_for(handlers::ON_SETUP)
        .iter()
        .any(|(name, _)| name == "shape_2"));
}

#[test]
fn blocking_request_from_scheduler_context_is_refused() {
    let (mut runtime, _rec) = runtime_with_recorder();
    let a = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    runtime.tick(DT); // records this thread as the scheduler context
    let err = runtime.handle().clone_model(a).unwrap_err();
    assert_eq!(err, EngineError::WouldDeadlock);
}

#[test]
fn goto_card_dispatches_hide_then_show() {
    let (mut runtime, rec) = runtime_with_recorder();
    let (card1, card2) = {
        let scene = runtime.scene();
        let mut scene = scene.lock().unwrap();
        let root = scene.root();
        let card1 = scene.cards()[0];
        let card2 = scene.new_child(root, ModelKind::Card).unwrap();
        scene
            .model_mut(card1)
            .unwrap()
            .set_handler(handlers::ON_HIDE_CARD, "lights.off()");
        scene
            .model_mut(card2)
            .unwrap()
            .set_handler(handlers::ON_SHOW_CARD, "lights.on()");
        (card1, card2)
    };
    assert_eq!(runtime.current_card(), card1);

    runtime.goto_card(1);
    assert_eq!(runtime.current_card(), card2);
    let calls = rec.calls();
    assert_eq!(
        calls
            .iter()
            .map(|(_, h, _)| h.as_str())
            .collect::<Vec<_>>(),
        vec![handlers::ON_HIDE_CARD, handlers::ON_SHOW_CARD]
    );
}

#[test]
fn broadcast_reaches_every_object_on_the_card() {
    let (mut runtime, rec) = runtime_with_recorder();
    let a = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    let b = add_shape(&runtime, Vec2::new(30.0, 0.0), Size::new(10.0, 10.0));
    let handle = runtime.handle();
    handle
        .set_handler(a, handlers::ON_MESSAGE, "self.react()")
        .unwrap();
    handle
        .set_handler(b, handlers::ON_MESSAGE, "self.react()")
        .unwrap();
    handle.broadcast_message("ping").unwrap();
    runtime.tick(DT);

    let messages = rec.calls_for(handlers::ON_MESSAGE);
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|(_, payload)| matches!(
        payload,
        EventPayload::Message { text } if text == "ping"
    )));
}

#[test]
fn saved_stack_loads_and_runs() {
    init_tracing();
    let json = r#"{
        "type": "stack",
        "properties": { "name": "pong" },
        "children": [{
            "type": "card",
            "properties": { "name": "table" },
            "children": [{
                "type": "shape",
                "handlers": { "on_setup": "self.speed = [120, 80]" },
                "properties": {
                    "name": "ball",
                    "position": [30.0, 40.0],
                    "size": [12.0, 12.0]
                }
            }]
        }]
    }"#;
    let data: decker_model::ModelData = serde_json::from_str(json).unwrap();
    let scene = decker_model::Scene::from_data(&data).unwrap();

    let recorder = Recorder::default();
    let mut runtime = decker_engine::Runtime::with_scene(
        scene,
        Box::new(RecordingEvaluator::new(recorder.clone())),
    );
    runtime.start();

    let handle = runtime.handle();
    let card = runtime.current_card();
    assert_eq!(handle.name(card).unwrap(), "table");
    let ball = handle.child_by_name(card, "ball").unwrap();
    assert_eq!(handle.position(ball), Some(Vec2::new(30.0, 40.0)));
    assert_eq!(
        recorder.calls_for(handlers::ON_SETUP),
        vec![("ball".to_string(), EventPayload::None)]
    );

    // Save → reload → save is a fixed point
    let saved = {
        let scene = runtime.scene();
        let scene = scene.lock().unwrap();
        let root = scene.root();
        scene.get_data(root).unwrap()
    };
    let reloaded = decker_model::Scene::from_data(&saved).unwrap();
    let saved_again = reloaded.get_data(reloaded.root()).unwrap();
    assert_eq!(saved_again, saved);
}

#[test]
fn background_scheduler_ticks_and_signals_redraws() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    init_tracing();
    let recorder = Recorder::default();
    let runtime = Runtime::new(Box::new(RecordingEvaluator::new(recorder)));
    let shape = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    runtime.handle().set_speed(shape, Vec2::new(60.0, 0.0));

    let mut scheduler = decker_engine::Scheduler::new(runtime);
    let wakes = Arc::new(AtomicUsize::new(0));
    let wakes_seen = Arc::clone(&wakes);
    scheduler.set_wake_callback(move || {
        wakes_seen.fetch_add(1, Ordering::Relaxed);
    });
    let handle = scheduler.handle();

    scheduler.start_background();
    assert!(scheduler.is_background_running());
    std::thread::sleep(Duration::from_millis(100));
    scheduler.stop_background();
    assert!(!scheduler.is_background_running());

    // The shape moved (~6 px in 100 ms at 60 px/s) and the tick thread
    // asked the host to redraw
    let pos = handle.position(shape).unwrap();
    assert!(pos.x > 1.0, "{pos:?}");
    assert!(wakes.load(Ordering::Relaxed) > 0);
    assert!(scheduler.take_needs_redraw());
}

#[test]
fn start_runs_setup_for_the_whole_stack() {
    let (mut runtime, rec) = runtime_with_recorder();
    let a = add_shape(&runtime, Vec2::ZERO, Size::new(10.0, 10.0));
    runtime
        .handle()
        .set_handler(a, handlers::ON_SETUP, "self.init()")
        .unwrap();
    runtime.start();
    assert_eq!(rec.calls_for(handlers::ON_SETUP).len(), 1);
}
