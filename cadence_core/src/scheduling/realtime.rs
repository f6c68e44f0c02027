//! OS scheduling controls for execution threads
//!
//! Every call applies to the calling thread. Failures are returned; the task
//! loop logs them as warnings and keeps running with best-effort scheduling.

use crate::error::{CadenceError, CadenceResult};

/// Set real-time priority using SCHED_FIFO (Linux RT-PREEMPT required)
///
/// # Arguments
/// * `priority` - Priority level (1-99, higher = more important)
///
/// # Requirements
/// - CAP_SYS_NICE capability or root
pub fn set_realtime_priority(priority: i32) -> CadenceResult<()> {
    if !(1..=99).contains(&priority) {
        return Err(CadenceError::config("Priority must be between 1 and 99"));
    }

    #[cfg(target_os = "linux")]
    unsafe {
        use libc::{sched_param, sched_setscheduler, SCHED_FIFO};

        let param = sched_param {
            sched_priority: priority,
        };

        // pid 0 is the calling thread.
        if sched_setscheduler(0, SCHED_FIFO, &param) != 0 {
            let err = std::io::Error::last_os_error();
            return Err(CadenceError::Internal(format!(
                "Failed to set real-time priority: {}. \
                 Ensure you have CAP_SYS_NICE capability.",
                err
            )));
        }

        log::debug!("Real-time priority set to {} (SCHED_FIFO)", priority);
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(CadenceError::Unsupported(
            "Real-time priority scheduling is only supported on Linux".to_string(),
        ))
    }
}

/// Pin the calling thread to one CPU core
pub fn pin_to_cpu(cpu_id: usize) -> CadenceResult<()> {
    let cores = core_affinity::get_core_ids().ok_or_else(|| {
        CadenceError::Unsupported("CPU affinity is not available on this platform".to_string())
    })?;
    let core = cores
        .into_iter()
        .find(|core| core.id == cpu_id)
        .ok_or_else(|| CadenceError::config(format!("CPU core {} does not exist", cpu_id)))?;
    if !core_affinity::set_for_current(core) {
        return Err(CadenceError::Internal(format!(
            "Failed to set CPU affinity to core {}",
            cpu_id
        )));
    }
    log::debug!("Thread pinned to CPU core {}", cpu_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_out_of_range_is_rejected() {
        assert!(matches!(
            set_realtime_priority(0),
            Err(CadenceError::Config(_))
        ));
        assert!(matches!(
            set_realtime_priority(100),
            Err(CadenceError::Config(_))
        ));
    }

    #[test]
    fn pinning_to_missing_core_fails() {
        assert!(pin_to_cpu(usize::MAX).is_err());
    }
}
