// ============================================================================
// File: src/platform/testing.rs
// ----------------------------------------------------------------------------
// Recording provider and scripted remote shell for lifecycle tests
// ============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_fs::TempDir;

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::error::{HarnessError, HarnessResult};
use crate::provider::{Instance, InstanceSpec, ProviderCapability, ProviderError, ProviderResult};
use crate::ssh::{CommandOutput, RemoteShell, SshClient};

use super::config::{FlightConfig, RuntimeConfig};
use super::flight::Flight;

/// Provider call, in the order the harness issued it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProviderCall {
    Create(String),
    Terminate(String),
    Console(String),
}

#[derive(Debug, Default)]
struct Behavior {
    create_error: Option<ProviderError>,
    terminate_error: Option<ProviderError>,
    console_error: Option<ProviderError>,
}

/// Provider that records every call and fails on request
#[derive(Debug)]
pub(crate) struct FakeProvider {
    namespace: Option<String>,
    console_text: String,
    calls: Mutex<Vec<ProviderCall>>,
    behavior: Mutex<Behavior>,
    created: AtomicU32,
    /// Blocks the caller of `namespace`, widening cluster creation
    namespace_delay: Option<Duration>,
    /// Held inside the create task before the instance is returned
    create_delay: Option<Duration>,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self {
            namespace: Some("kola".to_string()),
            console_text: "[    0.000000] Linux version 6.9.0\nlogin: ".to_string(),
            calls: Mutex::new(Vec::new()),
            behavior: Mutex::new(Behavior::default()),
            created: AtomicU32::new(0),
            namespace_delay: None,
            create_delay: None,
        }
    }

    pub(crate) fn with_namespace_delay(mut self, delay: Duration) -> Self {
        self.namespace_delay = Some(delay);
        self
    }

    pub(crate) fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub(crate) fn without_namespace() -> Self {
        Self {
            namespace: None,
            ..Self::new()
        }
    }

    pub(crate) fn console_text(&self) -> &str {
        &self.console_text
    }

    pub(crate) fn fail_create(&self, details: &str) {
        self.behavior.lock().expect("behavior lock").create_error = Some(ProviderError::Request {
            details: details.to_string(),
        });
    }

    pub(crate) fn fail_terminate(&self, details: &str) {
        self.behavior.lock().expect("behavior lock").terminate_error =
            Some(ProviderError::Request {
                details: details.to_string(),
            });
    }

    pub(crate) fn fail_console(&self, details: &str) {
        self.behavior.lock().expect("behavior lock").console_error = Some(ProviderError::Request {
            details: details.to_string(),
        });
    }

    pub(crate) fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn created_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Create(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, wanted: fn(&ProviderCall) -> bool) -> usize {
        self.calls().iter().filter(|call| wanted(call)).count()
    }

    fn push(&self, call: ProviderCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

impl ProviderCapability for FakeProvider {
    fn create_instance(&self, spec: InstanceSpec) -> AsyncTask<ProviderResult<Instance>> {
        self.push(ProviderCall::Create(spec.name.clone()));
        let error = self.behavior.lock().expect("behavior lock").create_error.clone();
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.create_delay;

        AsyncTaskBuilder::new(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match error {
                Some(e) => Err(ProviderError::CreateFailed {
                    name: spec.name,
                    details: e.to_string(),
                }),
                None => Ok(Instance::new(
                    format!("10.0.{}.{}", n / 250, n % 250 + 1),
                    format!("192.0.{}.{}", n / 250, n % 250 + 1),
                )),
            }
        })
        .spawn()
    }

    fn terminate_instance(&self, name: &str) -> AsyncTask<ProviderResult<()>> {
        self.push(ProviderCall::Terminate(name.to_string()));
        let error = self.behavior.lock().expect("behavior lock").terminate_error.clone();

        AsyncTaskBuilder::new(async move { error.map_or(Ok(()), Err) }).spawn()
    }

    fn get_console_output(&self, name: &str) -> AsyncTask<ProviderResult<String>> {
        self.push(ProviderCall::Console(name.to_string()));
        let error = self.behavior.lock().expect("behavior lock").console_error.clone();
        let text = self.console_text.clone();

        AsyncTaskBuilder::new(async move { error.map_or(Ok(text), Err) }).spawn()
    }

    fn namespace(&self) -> Option<&str> {
        if let Some(delay) = self.namespace_delay {
            std::thread::sleep(delay);
        }
        self.namespace.as_deref()
    }

    fn provider_type(&self) -> &'static str {
        "fake"
    }
}

#[derive(Debug, Default)]
struct ShellState {
    /// Boot ids handed out by successive boot id reads; the last one repeats
    boot_ids: VecDeque<String>,
    current_boot_id: String,
    /// Exec calls that fail with a connectivity error before any succeeds
    failures_remaining: u32,
    unreachable: bool,
    commands: Vec<(String, String)>,
}

/// Remote shell that answers from a script
#[derive(Debug)]
pub(crate) struct FakeShell {
    state: Mutex<ShellState>,
}

impl FakeShell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ShellState {
                current_boot_id: "9d3c4e5f-0000-4000-8000-000000000001".to_string(),
                ..ShellState::default()
            }),
        }
    }

    /// Serve these boot ids in order, repeating the last
    pub(crate) fn with_boot_ids(self, ids: &[&str]) -> Self {
        {
            let mut state = self.state.lock().expect("shell lock");
            state.boot_ids = ids.iter().map(|id| id.to_string()).collect();
        }
        self
    }

    pub(crate) fn failing_first(self, count: u32) -> Self {
        self.state.lock().expect("shell lock").failures_remaining = count;
        self
    }

    pub(crate) fn unreachable(self) -> Self {
        self.state.lock().expect("shell lock").unreachable = true;
        self
    }

    /// (address, command) pairs in execution order
    pub(crate) fn commands(&self) -> Vec<(String, String)> {
        self.state.lock().expect("shell lock").commands.clone()
    }
}

impl RemoteShell for FakeShell {
    fn connect(&self, address: &str) -> AsyncTask<HarnessResult<SshClient>> {
        let address = address.to_string();
        AsyncTaskBuilder::new(async move {
            Err(HarnessError::connectivity(address, "fake shell opens no sessions"))
        })
        .spawn()
    }

    fn connect_with_password(
        &self,
        address: &str,
        _user: &str,
        _password: &str,
    ) -> AsyncTask<HarnessResult<SshClient>> {
        self.connect(address)
    }

    fn exec(&self, address: &str, command: &str) -> AsyncTask<HarnessResult<CommandOutput>> {
        let result = {
            let mut state = self.state.lock().expect("shell lock");
            state.commands.push((address.to_string(), command.to_string()));

            if state.unreachable {
                Err(HarnessError::connectivity(address, "connection refused"))
            } else if state.failures_remaining > 0 {
                state.failures_remaining -= 1;
                Err(HarnessError::connectivity(address, "connection refused"))
            } else if command.contains("boot_id") {
                if let Some(next) = state.boot_ids.pop_front() {
                    state.current_boot_id = next;
                }
                Ok(CommandOutput::new(format!("{}\n", state.current_boot_id), "", 0))
            } else {
                Ok(CommandOutput::new(format!("ran: {command}\n"), "", 0))
            }
        };

        AsyncTaskBuilder::new(async move { result }).spawn()
    }
}

/// Runtime with short waits so reachability failures resolve quickly
pub(crate) fn fast_runtime(dir: &TempDir) -> RuntimeConfig {
    RuntimeConfig::new(dir.path())
        .with_boot_timeout(Duration::from_millis(300))
        .with_ssh_retry_interval(Duration::from_millis(5))
}

pub(crate) fn test_flight(dir: &TempDir, provider: &Arc<FakeProvider>, shell: &Arc<FakeShell>) -> Flight {
    let _ = env_logger::builder().is_test(true).try_init();

    let provider: Arc<dyn ProviderCapability> = Arc::clone(provider) as Arc<dyn ProviderCapability>;
    let shell: Arc<dyn RemoteShell> = Arc::clone(shell) as Arc<dyn RemoteShell>;
    Flight::new(
        FlightConfig::new("kola").with_runtime(fast_runtime(dir)),
        provider,
        shell,
    )
}
