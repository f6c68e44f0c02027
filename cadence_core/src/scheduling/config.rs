//! Task and manager configuration
//!
//! [`TaskConfig`] is what a task is built with. [`ManagerConfig`] is the TOML
//! file layout: a `[defaults]` section plus `[tasks.<name>]` overrides.
//!
//! ```toml
//! [defaults]
//! mailbox_size = 128
//!
//! [tasks.servo]
//! discipline = "periodic"
//! period_ms = 1.0
//! realtime_priority = 90
//! cpu_affinity = 3
//!
//! [tasks.servo.params]
//! gain = 0.8
//! ```

use crate::error::{CadenceError, CadenceResult};
use crate::params::ComponentParams;
use crate::state::MIN_STATE_TABLE_LENGTH;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAILBOX_SIZE: usize = 64;
pub const DEFAULT_STATE_TABLE_SIZE: usize = 256;

/// How the execution loop paces its cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingDiscipline {
    /// Cycle back-to-back
    Continuous,
    /// Wake at a fixed wall-clock period
    Periodic(Duration),
    /// Sleep until a command arrives, `signal()` is called or the timeout elapses
    FromSignal { timeout: Option<Duration> },
}

impl SchedulingDiscipline {
    pub fn period(&self) -> Option<Duration> {
        match self {
            Self::Periodic(period) => Some(*period),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Periodic(_) => "periodic",
            Self::FromSignal { .. } => "from_signal",
        }
    }
}

/// Settings of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub discipline: SchedulingDiscipline,
    /// Capacity of the command mailbox and of each event mailbox
    pub mailbox_size: usize,
    /// Rows of the state table (at least 3)
    pub state_table_size: usize,
    /// SCHED_FIFO priority (1-99) requested for the execution thread
    pub realtime_priority: Option<i32>,
    /// CPU core the execution thread is pinned to
    pub cpu_affinity: Option<usize>,
    /// Run the loop on the thread that calls `start()`
    pub capture_thread: bool,
    pub params: ComponentParams,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::continuous()
    }
}

impl TaskConfig {
    /// No enforced timing
    pub fn continuous() -> Self {
        Self {
            discipline: SchedulingDiscipline::Continuous,
            mailbox_size: DEFAULT_MAILBOX_SIZE,
            state_table_size: DEFAULT_STATE_TABLE_SIZE,
            realtime_priority: None,
            cpu_affinity: None,
            capture_thread: false,
            params: ComponentParams::new(),
        }
    }

    /// Fixed-period loop
    pub fn periodic(period: Duration) -> Self {
        Self {
            discipline: SchedulingDiscipline::Periodic(period),
            ..Self::continuous()
        }
    }

    /// Event-driven loop without timeout
    pub fn from_signal() -> Self {
        Self {
            discipline: SchedulingDiscipline::FromSignal { timeout: None },
            ..Self::continuous()
        }
    }

    /// Hard real-time preset: periodic with SCHED_FIFO priority 90
    pub fn hard_realtime(period: Duration) -> Self {
        Self::periodic(period).with_realtime_priority(90)
    }

    pub fn with_wake_timeout(mut self, timeout: Duration) -> Self {
        if let SchedulingDiscipline::FromSignal { timeout: t } = &mut self.discipline {
            *t = Some(timeout);
        }
        self
    }

    pub fn with_mailbox_size(mut self, size: usize) -> Self {
        self.mailbox_size = size;
        self
    }

    pub fn with_state_table_size(mut self, size: usize) -> Self {
        self.state_table_size = size;
        self
    }

    pub fn with_realtime_priority(mut self, priority: i32) -> Self {
        self.realtime_priority = Some(priority);
        self
    }

    pub fn with_cpu_affinity(mut self, core: usize) -> Self {
        self.cpu_affinity = Some(core);
        self
    }

    pub fn capturing_thread(mut self) -> Self {
        self.capture_thread = true;
        self
    }

    pub fn with_params(mut self, params: ComponentParams) -> Self {
        self.params = params;
        self
    }

    pub fn period(&self) -> Option<Duration> {
        self.discipline.period()
    }

    pub fn validate(&self) -> CadenceResult<()> {
        if self.mailbox_size == 0 {
            return Err(CadenceError::config("mailbox_size must be at least 1"));
        }
        if self.state_table_size < MIN_STATE_TABLE_LENGTH {
            return Err(CadenceError::config(format!(
                "state_table_size must be at least {}",
                MIN_STATE_TABLE_LENGTH
            )));
        }
        if let Some(priority) = self.realtime_priority {
            if !(1..=99).contains(&priority) {
                return Err(CadenceError::config("Priority must be between 1 and 99"));
            }
        }
        if let SchedulingDiscipline::Periodic(period) = self.discipline {
            if period.is_zero() {
                return Err(CadenceError::config("period must be greater than zero"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisciplineKind {
    Continuous,
    Periodic,
    FromSignal,
}

/// One task section of the config file; every field is optional so
/// sections can be layered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskSection {
    pub discipline: Option<DisciplineKind>,
    pub period_ms: Option<f64>,
    pub period_us: Option<u64>,
    pub wake_timeout_ms: Option<u64>,
    pub mailbox_size: Option<usize>,
    pub state_table_size: Option<usize>,
    pub realtime_priority: Option<i32>,
    pub cpu_affinity: Option<usize>,
    pub capture_thread: Option<bool>,
    pub params: Option<toml::Table>,
}

impl TaskSection {
    /// Fields set in `over` replace those of `self`; params tables are merged
    pub fn overlay(&self, over: &TaskSection) -> TaskSection {
        let params = match (&self.params, &over.params) {
            (Some(base), Some(extra)) => {
                let mut merged = base.clone();
                merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                Some(merged)
            }
            (base, extra) => extra.clone().or_else(|| base.clone()),
        };
        // A period set on the override wins over whatever unit the base used.
        let (period_ms, period_us) = if over.period_ms.is_some() || over.period_us.is_some() {
            (over.period_ms, over.period_us)
        } else {
            (self.period_ms, self.period_us)
        };
        TaskSection {
            discipline: over.discipline.or(self.discipline),
            period_ms,
            period_us,
            wake_timeout_ms: over.wake_timeout_ms.or(self.wake_timeout_ms),
            mailbox_size: over.mailbox_size.or(self.mailbox_size),
            state_table_size: over.state_table_size.or(self.state_table_size),
            realtime_priority: over.realtime_priority.or(self.realtime_priority),
            cpu_affinity: over.cpu_affinity.or(self.cpu_affinity),
            capture_thread: over.capture_thread.or(self.capture_thread),
            params,
        }
    }

    fn period(&self) -> CadenceResult<Option<Duration>> {
        match (self.period_ms, self.period_us) {
            (Some(_), Some(_)) => Err(CadenceError::config(
                "set either period_ms or period_us, not both",
            )),
            (Some(ms), None) if ms.is_finite() && ms > 0.0 => {
                Duration::try_from_secs_f64(ms / 1000.0)
                    .map(Some)
                    .map_err(|e| CadenceError::config(format!("period_ms {}: {}", ms, e)))
            }
            (Some(ms), None) => Err(CadenceError::config(format!(
                "invalid period_ms {}",
                ms
            ))),
            (None, Some(us)) => Ok(Some(Duration::from_micros(us))),
            (None, None) => Ok(None),
        }
    }

    /// Resolve into a validated [`TaskConfig`]
    pub fn to_config(&self) -> CadenceResult<TaskConfig> {
        let period = self.period()?;
        let kind = match (self.discipline, period) {
            (Some(kind), _) => kind,
            (None, Some(_)) => DisciplineKind::Periodic,
            (None, None) => DisciplineKind::Continuous,
        };
        let discipline = match kind {
            DisciplineKind::Continuous => SchedulingDiscipline::Continuous,
            DisciplineKind::Periodic => SchedulingDiscipline::Periodic(period.ok_or_else(|| {
                CadenceError::config("periodic discipline needs period_ms or period_us")
            })?),
            DisciplineKind::FromSignal => SchedulingDiscipline::FromSignal {
                timeout: self.wake_timeout_ms.map(Duration::from_millis),
            },
        };
        let params = match &self.params {
            Some(table) => ComponentParams::from_toml(table.clone())?,
            None => ComponentParams::new(),
        };
        let config = TaskConfig {
            discipline,
            mailbox_size: self.mailbox_size.unwrap_or(DEFAULT_MAILBOX_SIZE),
            state_table_size: self.state_table_size.unwrap_or(DEFAULT_STATE_TABLE_SIZE),
            realtime_priority: self.realtime_priority,
            cpu_affinity: self.cpu_affinity,
            capture_thread: self.capture_thread.unwrap_or(false),
            params,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration file of a [`ComponentManager`](crate::manager::ComponentManager)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    pub defaults: TaskSection,
    pub tasks: BTreeMap<String, TaskSection>,
}

impl ManagerConfig {
    pub fn from_toml_str(text: &str) -> CadenceResult<Self> {
        let config: ManagerConfig = toml::from_str(text)?;
        // Surface bad sections at load time rather than at task creation.
        config.defaults.to_config()?;
        for name in config.tasks.keys() {
            config.task(name)?;
        }
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> CadenceResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading manager config from {}", path.as_ref().display());
        Self::from_toml_str(&text)
    }

    /// Effective config of `name`: its section layered over `[defaults]`
    pub fn task(&self, name: &str) -> CadenceResult<TaskConfig> {
        let merged = match self.tasks.get(name) {
            Some(section) => self.defaults.overlay(section),
            None => self.defaults.clone(),
        };
        merged
            .to_config()
            .map_err(|e| CadenceError::config(format!("task '{}': {}", name, e)))
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }
}
