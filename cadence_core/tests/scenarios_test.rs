// End-to-end behavior of periodic tasks, connections and queued calls
use cadence_core::command::{ExecutionResult, FunctionWrite};
use cadence_core::core::{Component, TaskContext, TaskState};
use cadence_core::error::CadenceError;
use cadence_core::interface::{ProvidedInterfaceBuilder, RequiredInterfaceBuilder};
use cadence_core::manager::ComponentManager;
use cadence_core::scheduling::{Task, TaskConfig};
use cadence_core::state::{StateDataId, StateTable};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Publishes an incrementing value every cycle
struct Sensor {
    x: StateDataId<f64>,
    value: f64,
}

impl Component for Sensor {
    fn run(&mut self, ctx: &mut TaskContext<'_>) {
        self.value += 1.0;
        ctx.state().write(self.x, self.value).unwrap();
    }
}

/// Stores the last written value where the test can see it
struct Sink {
    value: Arc<AtomicI64>,
    cleaned_up: Arc<AtomicBool>,
}

impl Component for Sink {
    fn run(&mut self, _ctx: &mut TaskContext<'_>) {}

    fn cleanup(&mut self, _ctx: &mut TaskContext<'_>) {
        self.cleaned_up.store(true, Ordering::SeqCst);
    }
}

fn sink_task(period: Duration) -> (Task<Sink>, Arc<AtomicI64>, Arc<AtomicBool>) {
    let value = Arc::new(AtomicI64::new(0));
    let cleaned_up = Arc::new(AtomicBool::new(false));
    let mut prov = ProvidedInterfaceBuilder::<Sink>::new("Prov");
    prov.add_command_write("Set", |sink: &mut Sink, v: &i64| {
        sink.value.store(*v, Ordering::SeqCst)
    })
    .unwrap();
    let task = Task::builder(
        "sink",
        Sink {
            value: value.clone(),
            cleaned_up: cleaned_up.clone(),
        },
    )
    .config(TaskConfig::periodic(period))
    .provided(prov)
    .build()
    .unwrap();
    (task, value, cleaned_up)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn periodic_task_ticks_at_its_period() {
    let mut table = StateTable::new("sensor", 256).unwrap();
    let x = table.add_data("x", 0.0f64).unwrap();
    let reader = table.accessor(x).unwrap();
    let view = table.view();

    let task = Task::builder("sensor", Sensor { x, value: 0.0 })
        .config(TaskConfig::periodic(Duration::from_millis(10)))
        .state_table(table)
        .build()
        .unwrap();
    task.create().unwrap();
    assert_eq!(*reader.latest_or_initial(), 0.0);

    task.start().unwrap();
    let start = Instant::now();
    let mut last = 0;
    while start.elapsed() < Duration::from_secs(1) {
        let now = view.latest_tick();
        assert!(now >= last, "tick went backwards: {} after {}", now, last);
        last = now;
        std::thread::sleep(Duration::from_millis(5));
    }
    task.kill();
    assert!(task.wait_to_terminate(Some(Duration::from_secs(2))));

    let ticks = task.state_table().get_index_reader(0).unwrap().ticks();
    assert!((70..=120).contains(&ticks), "ticks = {}", ticks);

    // Each committed row holds the value written during its cycle.
    let index = view.get_index_reader(0).unwrap();
    assert_eq!(reader.get_value(&index).unwrap(), index.ticks() as f64);
    let earlier = view.get_index_reader(10).unwrap();
    assert_eq!(reader.get_value(&earlier).unwrap(), earlier.ticks() as f64);

    let stats = view.period_statistics();
    assert!(stats.samples > 0);
    assert!(stats.period_avg > 0.005 && stats.period_avg < 0.05);
}

#[test]
fn connect_requires_matching_names() {
    let manager = ComponentManager::new();
    let (server, _, _) = sink_task(Duration::from_millis(10));
    manager.add(server).unwrap();

    let mut req = RequiredInterfaceBuilder::<Sink>::new("Req");
    let set = req.add_function_write::<i64>("Set").unwrap();
    let client = Task::builder(
        "client",
        Sink {
            value: Arc::default(),
            cleaned_up: Arc::default(),
        },
    )
    .required(req)
    .build()
    .unwrap();
    manager.add(client).unwrap();

    manager.connect("client", "Req", "sink", "Prov").unwrap();
    assert!(set.is_bound());
}

#[test]
fn mismatched_connect_binds_nothing() {
    let manager = ComponentManager::new();
    let (server, _, _) = sink_task(Duration::from_millis(10));
    manager.add(server).unwrap();

    let mut req = RequiredInterfaceBuilder::<Sink>::new("Req");
    let set = req.add_function_write::<i64>("Set").unwrap();
    let other = req.add_function_write::<i64>("SetOther").unwrap();
    let client = Task::builder(
        "client",
        Sink {
            value: Arc::default(),
            cleaned_up: Arc::default(),
        },
    )
    .required(req)
    .build()
    .unwrap();
    let client = manager.add(client).unwrap();

    match manager.connect("client", "Req", "sink", "Prov") {
        Err(CadenceError::ConnectFailed { unresolved, .. }) => {
            assert_eq!(unresolved.len(), 1);
            assert!(unresolved[0].contains("SetOther"));
        }
        other => panic!("unexpected connect result: {:?}", other),
    }
    assert!(!set.is_bound());
    assert!(!other.is_bound());
    assert!(!client.required_interface("Req").unwrap().is_connected());
    assert!(manager.connections().is_empty());
}

#[test]
fn queued_write_is_visible_only_after_drain() {
    let period = Duration::from_millis(200);
    let (task, value, _) = sink_task(period);
    let set = FunctionWrite::<i64>::new("Set");
    assert!(set
        .slot()
        .bind(task.provided_interface("Prov").unwrap().command("Set")));

    task.create().unwrap();
    task.start().unwrap();
    // After the first advance the loop sleeps for the rest of its period.
    let view = task.state_table();
    assert!(wait_until(Duration::from_secs(2), || view.latest_tick() >= 1));

    let before = Instant::now();
    assert_eq!(set.execute(&42), ExecutionResult::CommandSucceeded);
    assert!(before.elapsed() < Duration::from_millis(50));
    assert_eq!(value.load(Ordering::SeqCst), 0);
    assert_eq!(task.pending_commands(), 1);

    assert!(wait_until(Duration::from_secs(2), || value.load(Ordering::SeqCst) == 42));
    assert_eq!(task.pending_commands(), 0);

    task.kill();
    assert!(task.wait_to_terminate(Some(Duration::from_secs(2))));
    assert_eq!(task.stats().commands_executed, 1);
}

#[test]
fn kill_finishes_within_one_period() {
    let period = Duration::from_millis(200);
    let (task, _, cleaned_up) = sink_task(period);
    task.create().unwrap();
    task.start().unwrap();
    let view = task.state_table();
    assert!(wait_until(Duration::from_secs(2), || view.latest_tick() >= 1));

    let killed = Instant::now();
    task.kill();
    assert_ne!(task.state(), TaskState::Finished);
    assert!(task.wait_for_state(TaskState::Finished, Some(period * 2)));
    let elapsed = killed.elapsed();
    assert!(elapsed < period + Duration::from_millis(150), "{:?}", elapsed);
    assert!(cleaned_up.load(Ordering::SeqCst));
    assert!(task.wait_to_terminate(Some(Duration::from_secs(1))));
}
