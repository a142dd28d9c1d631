//! Optional process statistics logged between phases of a classification run.

#[cfg(feature = "cli")]
mod imp {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use sysinfo::{Pid, System};

    #[derive(Debug, Clone)]
    pub struct ProcessStats {
        pub cpu_usage: f32,
        pub memory_mb: u64,
        pub memory_percent: f32,
        pub peak_memory_mb: u64,
        pub elapsed: Duration,
    }

    pub struct SystemMonitor {
        system: Mutex<System>,
        pid: Option<Pid>,
        started: Instant,
        peak_memory_mb: Mutex<u64>,
        enabled: bool,
    }

    impl SystemMonitor {
        pub fn new(enabled: bool) -> Self {
            let mut system = System::new();
            let pid = sysinfo::get_current_pid().ok();
            if enabled {
                system.refresh_all();
            }

            Self {
                system: Mutex::new(system),
                pid,
                started: Instant::now(),
                peak_memory_mb: Mutex::new(0),
                enabled,
            }
        }

        pub fn snapshot(&self) -> Option<ProcessStats> {
            if !self.enabled {
                return None;
            }
            let pid = self.pid?;
            let mut system = self.system.lock().ok()?;
            system.refresh_all();

            let process = system.process(pid)?;
            let memory_mb = process.memory() / 1024 / 1024;
            let total_mb = system.total_memory() / 1024 / 1024;
            let memory_percent = if total_mb > 0 {
                memory_mb as f32 / total_mb as f32 * 100.0
            } else {
                0.0
            };

            let mut peak = self.peak_memory_mb.lock().ok()?;
            *peak = (*peak).max(memory_mb);

            Some(ProcessStats {
                cpu_usage: process.cpu_usage(),
                memory_mb,
                memory_percent,
                peak_memory_mb: *peak,
                elapsed: self.started.elapsed(),
            })
        }

        pub fn log_phase(&self, phase: &str) {
            if let Some(stats) = self.snapshot() {
                tracing::info!(
                    "📊 {} - CPU: {:.1}%, Memory: {}MB ({:.1}%), Peak: {}MB, Elapsed: {:?}",
                    phase,
                    stats.cpu_usage,
                    stats.memory_mb,
                    stats.memory_percent,
                    stats.peak_memory_mb,
                    stats.elapsed
                );
            }
        }

        pub fn log_summary(&self) {
            if let Some(stats) = self.snapshot() {
                tracing::info!(
                    "📊 Run finished in {:?}, peak memory {}MB",
                    stats.elapsed,
                    stats.peak_memory_mb
                );
            }
        }

        pub fn is_enabled(&self) -> bool {
            self.enabled
        }
    }
}

#[cfg(not(feature = "cli"))]
mod imp {
    pub struct SystemMonitor;

    impl SystemMonitor {
        pub fn new(_enabled: bool) -> Self {
            Self
        }

        pub fn log_phase(&self, _phase: &str) {}

        pub fn log_summary(&self) {}

        pub fn is_enabled(&self) -> bool {
            false
        }
    }
}

pub use imp::*;

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_monitor_is_silent() {
        let monitor = SystemMonitor::default();
        assert!(!monitor.is_enabled());
        monitor.log_phase("classify");
        monitor.log_summary();
    }
}
