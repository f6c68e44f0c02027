//! # Component manager
//!
//! An explicitly constructed registry of tasks. It resolves connections by
//! component and interface name and fans lifecycle operations out over every
//! registered component.

use crate::core::{Component, TaskState};
use crate::error::{CadenceError, CadenceResult};
use crate::interface::{InterfaceDescription, InterfaceProvided, InterfaceRequired};
use crate::scheduling::{ManagerConfig, Task, TaskConfig, TaskStats};
use crate::state::StateTableView;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Object-safe lifecycle surface of a task, as seen by the manager
pub trait ManagedComponent: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> TaskState;
    fn config(&self) -> &TaskConfig;
    fn create(&self) -> CadenceResult<()>;
    fn start(&self) -> CadenceResult<()>;
    fn suspend(&self) -> CadenceResult<()>;
    fn kill(&self);
    fn signal(&self);
    fn wait_for_state(&self, state: TaskState, timeout: Option<Duration>) -> bool;
    fn wait_to_terminate(&self, timeout: Option<Duration>) -> bool;
    fn provided_interface(&self, name: &str) -> Option<Arc<InterfaceProvided>>;
    fn required_interface(&self, name: &str) -> Option<Arc<InterfaceRequired>>;
    fn provided_interfaces(&self) -> &[Arc<InterfaceProvided>];
    fn required_interfaces(&self) -> &[Arc<InterfaceRequired>];
    fn state_table(&self) -> StateTableView;
    fn stats(&self) -> TaskStats;
    fn is_running(&self) -> bool;

    fn is_capturing(&self) -> bool {
        self.config().capture_thread
    }
}

impl<C: Component> ManagedComponent for Task<C> {
    fn name(&self) -> &str {
        Task::name(self)
    }

    fn state(&self) -> TaskState {
        Task::state(self)
    }

    fn config(&self) -> &TaskConfig {
        Task::config(self)
    }

    fn create(&self) -> CadenceResult<()> {
        Task::create(self)
    }

    fn start(&self) -> CadenceResult<()> {
        Task::start(self)
    }

    fn suspend(&self) -> CadenceResult<()> {
        Task::suspend(self)
    }

    fn kill(&self) {
        Task::kill(self)
    }

    fn signal(&self) {
        Task::signal(self)
    }

    fn wait_for_state(&self, state: TaskState, timeout: Option<Duration>) -> bool {
        Task::wait_for_state(self, state, timeout)
    }

    fn wait_to_terminate(&self, timeout: Option<Duration>) -> bool {
        Task::wait_to_terminate(self, timeout)
    }

    fn provided_interface(&self, name: &str) -> Option<Arc<InterfaceProvided>> {
        Task::provided_interface(self, name)
    }

    fn required_interface(&self, name: &str) -> Option<Arc<InterfaceRequired>> {
        Task::required_interface(self, name)
    }

    fn provided_interfaces(&self) -> &[Arc<InterfaceProvided>] {
        Task::provided_interfaces(self)
    }

    fn required_interfaces(&self) -> &[Arc<InterfaceRequired>] {
        Task::required_interfaces(self)
    }

    fn state_table(&self) -> StateTableView {
        Task::state_table(self)
    }

    fn stats(&self) -> TaskStats {
        Task::stats(self)
    }

    fn is_running(&self) -> bool {
        Task::is_running(self)
    }
}

/// One live binding between a required and a provided interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub required_component: String,
    pub required_interface: String,
    pub provided_component: String,
    pub provided_interface: String,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.required_component,
            self.required_interface,
            self.provided_component,
            self.provided_interface
        )
    }
}

/// Introspection record of a registered component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentDescription {
    pub name: String,
    pub state: TaskState,
    pub discipline: &'static str,
    pub provided: Vec<InterfaceDescription>,
    pub required: Vec<InterfaceDescription>,
    pub stats: TaskStats,
}

#[derive(Default)]
struct Registry {
    components: RwLock<Vec<Arc<dyn ManagedComponent>>>,
    connections: Mutex<Vec<Connection>>,
}

impl Registry {
    fn snapshot(&self) -> Vec<Arc<dyn ManagedComponent>> {
        self.components.read().clone()
    }

    fn kill_all(&self) {
        for component in self.snapshot() {
            component.kill();
        }
    }
}

/// Cloneable handle that kills every component of a manager from any thread
#[derive(Clone)]
pub struct KillHandle {
    registry: Weak<Registry>,
}

impl KillHandle {
    /// Returns false if the manager is gone
    pub fn kill_all(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => {
                registry.kill_all();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for KillHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillHandle")
            .field("alive", &(self.registry.strong_count() > 0))
            .finish()
    }
}

/// Registry of components owned by the application
#[derive(Default)]
pub struct ComponentManager {
    registry: Arc<Registry>,
    config: ManagerConfig,
}

impl ComponentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager whose [`task_config`](Self::task_config) lookups use `config`
    pub fn with_config(config: ManagerConfig) -> Self {
        Self {
            registry: Arc::default(),
            config,
        }
    }

    pub fn manager_config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Effective configuration for a task named `name`
    pub fn task_config(&self, name: &str) -> CadenceResult<TaskConfig> {
        self.config.task(name)
    }

    /// Register a task; names are unique within the manager
    pub fn add<C: Component>(&self, task: Task<C>) -> CadenceResult<Arc<Task<C>>> {
        let task = Arc::new(task);
        self.add_shared(task.clone())?;
        Ok(task)
    }

    pub fn add_shared(&self, component: Arc<dyn ManagedComponent>) -> CadenceResult<()> {
        let mut components = self.registry.components.write();
        if components.iter().any(|c| c.name() == component.name()) {
            return Err(CadenceError::DuplicateName {
                kind: "component",
                name: component.name().to_string(),
                owner: "manager".to_string(),
            });
        }
        if component.is_capturing() && components.iter().any(|c| c.is_capturing()) {
            return Err(CadenceError::config(format!(
                "component '{}' captures the starting thread, but another component already does",
                component.name()
            )));
        }
        log::debug!("Component '{}' added", component.name());
        components.push(component);
        Ok(())
    }

    /// Unregister a component that is not running
    pub fn remove(&self, name: &str) -> CadenceResult<Arc<dyn ManagedComponent>> {
        let mut components = self.registry.components.write();
        let position = components
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| CadenceError::ComponentNotFound(name.to_string()))?;
        let state = components[position].state();
        if matches!(state, TaskState::Active | TaskState::Finishing) {
            return Err(CadenceError::invalid_state(name, "remove", state));
        }
        self.registry
            .connections
            .lock()
            .retain(|c| c.required_component != name && c.provided_component != name);
        log::debug!("Component '{}' removed", name);
        Ok(components.remove(position))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedComponent>> {
        self.registry
            .components
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    fn require_component(&self, name: &str) -> CadenceResult<Arc<dyn ManagedComponent>> {
        self.get(name)
            .ok_or_else(|| CadenceError::ComponentNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.registry.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn component_names(&self) -> Vec<String> {
        self.registry
            .components
            .read()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn states(&self) -> Vec<(String, TaskState)> {
        self.registry
            .components
            .read()
            .iter()
            .map(|c| (c.name().to_string(), c.state()))
            .collect()
    }

    /// Bind `required_component.required_interface` to
    /// `provided_component.provided_interface`.
    ///
    /// Either every function and event handler resolves or nothing is bound.
    pub fn connect(
        &self,
        required_component: &str,
        required_interface: &str,
        provided_component: &str,
        provided_interface: &str,
    ) -> CadenceResult<()> {
        let client = self.require_component(required_component)?;
        let server = self.require_component(provided_component)?;
        for component in [&client, &server] {
            if component.is_running() {
                log::error!(
                    "Connect {}.{} -> {}.{} refused: '{}' is running",
                    required_component,
                    required_interface,
                    provided_component,
                    provided_interface,
                    component.name()
                );
                return Err(CadenceError::ConnectWhileActive(component.name().to_string()));
            }
        }
        let required = client.required_interface(required_interface).ok_or_else(|| {
            CadenceError::InterfaceNotFound {
                component: required_component.to_string(),
                interface: required_interface.to_string(),
            }
        })?;
        let provided = server.provided_interface(provided_interface).ok_or_else(|| {
            CadenceError::InterfaceNotFound {
                component: provided_component.to_string(),
                interface: provided_interface.to_string(),
            }
        })?;

        required.connect(&provided)?;
        let connection = Connection {
            required_component: required_component.to_string(),
            required_interface: required_interface.to_string(),
            provided_component: provided_component.to_string(),
            provided_interface: provided_interface.to_string(),
        };
        log::info!("Connected {}", connection);
        self.registry.connections.lock().push(connection);
        Ok(())
    }

    /// Undo a connection of `required_component.required_interface`
    pub fn disconnect(&self, required_component: &str, required_interface: &str) -> CadenceResult<()> {
        let client = self.require_component(required_component)?;
        if client.is_running() {
            return Err(CadenceError::ConnectWhileActive(required_component.to_string()));
        }
        let required = client.required_interface(required_interface).ok_or_else(|| {
            CadenceError::InterfaceNotFound {
                component: required_component.to_string(),
                interface: required_interface.to_string(),
            }
        })?;
        if let Some((provider, _)) = required.connected_to() {
            let provider_active = self
                .get(&provider)
                .is_some_and(|p| p.is_running());
            if provider_active {
                return Err(CadenceError::ConnectWhileActive(provider));
            }
        }
        required.disconnect()?;
        self.registry.connections.lock().retain(|c| {
            c.required_component != required_component || c.required_interface != required_interface
        });
        log::info!("Disconnected {}.{}", required_component, required_interface);
        Ok(())
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.registry.connections.lock().clone()
    }

    /// Create every component still CONSTRUCTED, stopping at the first failure
    pub fn create_all(&self) -> CadenceResult<()> {
        for component in self.registry.snapshot() {
            if component.state() == TaskState::Constructed {
                component.create()?;
            }
        }
        log::info!("All components created");
        Ok(())
    }

    /// Start every READY component.
    ///
    /// Own-thread components start first. A component that captures the
    /// starting thread starts last, so this call returns only after it is
    /// killed.
    pub fn start_all(&self) -> CadenceResult<()> {
        let components = self.registry.snapshot();
        let (capturing, threaded): (Vec<_>, Vec<_>) =
            components.into_iter().partition(|c| c.is_capturing());
        for component in threaded.iter().chain(capturing.iter()) {
            if component.state() == TaskState::Ready {
                if component.is_capturing() {
                    log::info!("Starting '{}' on the calling thread", component.name());
                }
                component.start()?;
            }
        }
        Ok(())
    }

    pub fn suspend_all(&self) -> CadenceResult<()> {
        for component in self.registry.snapshot() {
            if component.state() == TaskState::Active {
                component.suspend()?;
            }
        }
        Ok(())
    }

    /// Request termination of every component
    pub fn kill_all(&self) {
        log::info!("Killing all components");
        self.registry.kill_all();
    }

    /// True once every component reached `state` within `timeout`
    pub fn wait_for_state_all(&self, state: TaskState, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.registry.snapshot().iter().all(|component| {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            component.wait_for_state(state, remaining)
        })
    }

    /// Kill, join and unregister every component
    pub fn cleanup(&self, timeout: Option<Duration>) -> CadenceResult<()> {
        self.kill_all();
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut stuck = Vec::new();
        for component in self.registry.snapshot() {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if !component.wait_to_terminate(remaining) {
                stuck.push(component.name().to_string());
            }
        }
        if !stuck.is_empty() {
            log::error!("Components did not finish: {}", stuck.join(", "));
            return Err(CadenceError::Internal(format!(
                "components did not finish: {}",
                stuck.join(", ")
            )));
        }
        self.registry.connections.lock().clear();
        self.registry.components.write().clear();
        log::info!("Component manager cleaned up");
        Ok(())
    }

    pub fn kill_handle(&self) -> KillHandle {
        KillHandle {
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Kill every component on Ctrl+C
    pub fn install_signal_handler(&self) -> CadenceResult<()> {
        let handle = self.kill_handle();
        ctrlc::set_handler(move || {
            log::warn!("Ctrl+C received, killing all components");
            handle.kill_all();
        })
        .map_err(|e| CadenceError::Internal(format!("failed to set signal handler: {}", e)))
    }

    pub fn describe(&self) -> Vec<ComponentDescription> {
        self.registry
            .components
            .read()
            .iter()
            .map(|c| ComponentDescription {
                name: c.name().to_string(),
                state: c.state(),
                discipline: c.config().discipline.as_str(),
                provided: c.provided_interfaces().iter().map(|p| p.describe()).collect(),
                required: c.required_interfaces().iter().map(|r| r.describe()).collect(),
                stats: c.stats(),
            })
            .collect()
    }
}

impl fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.component_names())
            .field("connections", &self.connections().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ExecutionResult, FunctionVoid};
    use crate::core::TaskContext;
    use crate::interface::{ProvidedInterfaceBuilder, RequiredInterfaceBuilder};

    struct Idle;

    impl Component for Idle {
        fn run(&mut self, _ctx: &mut TaskContext<'_>) {}
    }

    fn server() -> Task<Idle> {
        let mut prov = ProvidedInterfaceBuilder::<Idle>::new("Prov");
        prov.add_command_void("Ping", |_| {}).unwrap();
        Task::builder("server", Idle)
            .config(TaskConfig::periodic(Duration::from_millis(1)))
            .provided(prov)
            .build()
            .unwrap()
    }

    fn client(function: &str) -> (Task<Idle>, FunctionVoid) {
        let mut req = RequiredInterfaceBuilder::<Idle>::new("Req");
        let ping = req.add_function_void(function).unwrap();
        let task = Task::builder("client", Idle)
            .config(TaskConfig::periodic(Duration::from_millis(1)))
            .required(req)
            .build()
            .unwrap();
        (task, ping)
    }

    #[test]
    fn duplicate_component_names_are_rejected() {
        let manager = ComponentManager::new();
        manager.add(server()).unwrap();
        assert!(matches!(
            manager.add(server()),
            Err(CadenceError::DuplicateName { .. })
        ));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn connect_reports_unknown_names() {
        let manager = ComponentManager::new();
        manager.add(server()).unwrap();
        let (client, _) = client("Ping");
        manager.add(client).unwrap();
        assert!(matches!(
            manager.connect("nobody", "Req", "server", "Prov"),
            Err(CadenceError::ComponentNotFound(_))
        ));
        assert!(matches!(
            manager.connect("client", "Req", "server", "Other"),
            Err(CadenceError::InterfaceNotFound { .. })
        ));
        assert!(manager.connections().is_empty());
    }

    #[test]
    fn full_lifecycle() {
        let manager = ComponentManager::new();
        manager.add(server()).unwrap();
        let (client, ping) = client("Ping");
        manager.add(client).unwrap();
        manager.connect("client", "Req", "server", "Prov").unwrap();
        assert_eq!(manager.connections().len(), 1);
        assert_eq!(
            manager.connections()[0].to_string(),
            "client.Req -> server.Prov"
        );

        manager.create_all().unwrap();
        manager.start_all().unwrap();
        assert!(manager.wait_for_state_all(TaskState::Active, Some(Duration::from_secs(5))));
        assert!(matches!(
            manager.disconnect("client", "Req"),
            Err(CadenceError::ConnectWhileActive(_))
        ));
        assert_eq!(ping.execute_blocking(), ExecutionResult::CommandSucceeded);

        let description = manager.describe();
        assert_eq!(description.len(), 2);
        assert_eq!(description[0].provided[0].commands[0].name, "Ping");

        manager.cleanup(Some(Duration::from_secs(5))).unwrap();
        assert!(manager.is_empty());
        assert_eq!(ping.execute(), ExecutionResult::CommandDisabled);
    }

    #[test]
    fn suspended_components_cannot_be_rewired() {
        let manager = ComponentManager::new();
        let server = manager.add(server()).unwrap();
        let (client, ping) = client("Ping");
        manager.add(client).unwrap();

        server.create().unwrap();
        server.start().unwrap();
        assert!(server.wait_to_start(Some(Duration::from_secs(5))));
        server.suspend().unwrap();
        assert!(server.wait_for_state(TaskState::Ready, Some(Duration::from_secs(5))));
        assert!(matches!(
            manager.connect("client", "Req", "server", "Prov"),
            Err(CadenceError::ConnectWhileActive(name)) if name == "server"
        ));
        assert!(!ping.is_bound());

        server.kill();
        assert!(server.wait_to_terminate(Some(Duration::from_secs(5))));
        assert!(!server.is_running());
    }

    #[test]
    fn kill_handle_does_not_keep_manager_alive() {
        let manager = ComponentManager::new();
        manager.add(server()).unwrap();
        let handle = manager.kill_handle();
        assert!(handle.kill_all());
        assert_eq!(manager.states()[0].1, TaskState::Finished);
        drop(manager);
        assert!(!handle.kill_all());
    }

    #[test]
    fn task_config_falls_back_to_defaults() {
        let config = ManagerConfig::from_toml_str(
            r#"
            [defaults]
            mailbox_size = 16

            [tasks.fast]
            discipline = "periodic"
            period_ms = 1.0
            "#,
        )
        .unwrap();
        let manager = ComponentManager::with_config(config);
        assert_eq!(manager.task_config("other").unwrap().mailbox_size, 16);
        assert_eq!(
            manager.task_config("fast").unwrap().period(),
            Some(Duration::from_millis(1))
        );
    }
}
