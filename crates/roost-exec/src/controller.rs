//! Worker side of the spawn protocol.
//!
//! Turns dispatch commands into OS processes and keeps the master informed:
//! `ProcessStarted` once a process runs, `ProcessKilled` whenever it exits (crash,
//! clean exit or kill), and the running process count on every change and on a timer.

use std::{
    path::PathBuf,
    process::Stdio,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use roost_core::{LinkError, MasterLink, SpawnerLink};
use roost_model::{
    OPT_EXECUTABLE, Properties, SpawnTaskId, SpawnerId,
    message::{
        Ack, KillProcessRequest, ProcessKilled, ProcessStarted, SpawnProcessRequest,
        UpdateSpawnerProcessesCount,
    },
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    time::{self, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    args::{LaunchArgs, LaunchIdentity},
    config::SpawnerConfig,
    error::ExecError,
    limits::attach_rlimits,
    port::PortAllocator,
    process::ProcessTable,
    util::{describe_exit, kill_graceful},
};

/// State shared with the per-process exit watchers.
struct Shared {
    master: Arc<dyn MasterLink>,
    ports: PortAllocator,
    processes: ProcessTable,
    spawner_id: RwLock<Option<SpawnerId>>,
    watchers: TaskTracker,
}

impl Shared {
    fn spawner_id(&self) -> Option<SpawnerId> {
        *self.spawner_id.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn report_count(&self) {
        let Some(spawner_id) = self.spawner_id() else {
            return;
        };
        let count = u32::try_from(self.processes.len()).unwrap_or(u32::MAX);
        match self
            .master
            .update_process_count(UpdateSpawnerProcessesCount { spawner_id, count })
            .await
        {
            Ok(()) => {}
            Err(LinkError::Rejected(msg)) => {
                warn!(
                    target: "roost.exec",
                    spawner_id = %spawner_id,
                    error = %msg,
                    "master refused process count; registration dropped"
                );
                self.forget(spawner_id);
            }
            Err(e) => {
                warn!(target: "roost.exec", spawner_id = %spawner_id, error = %e, "process count report failed");
            }
        }
    }

    /// Clear the spawner id unless a newer registration already replaced it.
    fn forget(&self, spawner_id: SpawnerId) {
        let mut id = self.spawner_id.write().unwrap_or_else(PoisonError::into_inner);
        if *id == Some(spawner_id) {
            *id = None;
        }
    }
}

pub struct SpawnerController {
    config: RwLock<SpawnerConfig>,
    shared: Arc<Shared>,
}

impl SpawnerController {
    /// The port range is fixed here; every other setting is re-read on each dispatch.
    pub fn new(config: SpawnerConfig, master: Arc<dyn MasterLink>) -> Result<Arc<Self>, ExecError> {
        config.validate()?;
        let ports = PortAllocator::new(config.port_range_start, config.port_range_end)?;
        Ok(Arc::new(Self {
            config: RwLock::new(config),
            shared: Arc::new(Shared {
                master,
                ports,
                processes: ProcessTable::new(),
                spawner_id: RwLock::new(None),
                watchers: TaskTracker::new(),
            }),
        }))
    }

    pub fn config(&self) -> SpawnerConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the configuration in place; rejected if the result does not validate.
    pub fn update_config(&self, f: impl FnOnce(&mut SpawnerConfig)) -> Result<(), ExecError> {
        let mut next = self.config();
        f(&mut next);
        next.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }

    pub fn spawner_id(&self) -> Option<SpawnerId> {
        self.shared.spawner_id()
    }

    /// Processes currently running (or being launched).
    pub fn running(&self) -> usize {
        self.shared.processes.len()
    }

    /// Port assigned to the process of `id`, while it runs.
    pub fn port_of(&self, id: SpawnTaskId) -> Option<u16> {
        self.shared.processes.get(id).and_then(|e| e.port)
    }

    /// Register with the master. Registering again replaces the previous id.
    pub async fn register(&self) -> Result<SpawnerId, ExecError> {
        let options = self.config().spawner_options();
        let id = self.shared.master.register_spawner(options).await?;
        *self
            .shared
            .spawner_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);
        info!(target: "roost.exec", spawner_id = %id, "registered with master");
        self.shared.report_count().await;
        Ok(id)
    }

    /// Launch the process of a task. Dispatching a task that already runs is acknowledged
    /// without launching it again.
    pub async fn handle_spawn(&self, req: SpawnProcessRequest) -> Ack {
        if self.spawner_id() != Some(req.spawner_id) {
            warn!(target: "roost.exec", spawner_id = %req.spawner_id, "dispatch for unknown spawner");
            return Ack::fail(format!("unknown spawner {}", req.spawner_id));
        }

        let id = req.spawn_id;
        let Some(stop) = self.shared.processes.claim(id) else {
            debug!(target: "roost.exec", task_id = %id, "duplicate dispatch ignored");
            return Ack::ok();
        };

        match self.launch(&req, stop).await {
            Ok(()) => Ack::ok(),
            Err(e) => {
                self.shared.processes.remove(id);
                error!(target: "roost.exec", task_id = %id, error = %e, "failed to launch process");
                Ack::fail(e.to_string())
            }
        }
    }

    async fn launch(&self, req: &SpawnProcessRequest, stop: CancellationToken) -> Result<(), ExecError> {
        let id = req.spawn_id;
        let cfg = self.config();
        let exe = resolve_executable(&req.options, &cfg)?;
        let port = self.shared.ports.allocate()?;

        let (master_ip, master_port) = self.master_address(&cfg);
        let args = LaunchArgs::new(&LaunchIdentity {
            master_ip: &master_ip,
            master_port,
            assigned_port: port,
            machine_ip: &cfg.machine_ip,
            spawn_id: id,
            unique_code: &req.unique_code,
        })
        .with_options(&req.options.merged(&req.custom_options))
        .with_extra(&cfg.extra_args);

        let mut cmd = Command::new(&exe);
        cmd.args(args.as_slice())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if cfg.log_process_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        attach_rlimits(&mut cmd, &cfg.rlimits);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.shared.ports.release(port);
                return Err(ExecError::Spawn(format!("{}: {e}", exe.display())));
            }
        };
        let pid = child.id().unwrap_or_default();
        self.shared.processes.set_started(id, pid, port);
        info!(
            target: "roost.exec",
            task_id = %id,
            pid,
            port,
            executable = %exe.display(),
            "process started"
        );

        if cfg.log_process_output {
            forward_output(&mut child, id);
        }

        // started must reach the master before the watcher can report the exit
        let started = ProcessStarted {
            spawn_id: id,
            process_id: pid,
            args: args.display(),
        };
        if let Err(e) = self.shared.master.process_started(started).await {
            warn!(target: "roost.exec", task_id = %id, error = %e, "process started notification failed");
        }

        let shared = Arc::clone(&self.shared);
        self.shared
            .watchers
            .spawn(watch_exit(shared, id, child, stop, port, cfg.kill_grace()));
        self.shared.report_count().await;
        Ok(())
    }

    fn master_address(&self, cfg: &SpawnerConfig) -> (String, u16) {
        let known = self.shared.master.master_address();
        let ip = cfg
            .master_ip
            .clone()
            .or_else(|| known.as_ref().map(|(ip, _)| ip.clone()))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = cfg
            .master_port
            .or_else(|| known.as_ref().map(|(_, port)| *port))
            .unwrap_or_default();
        (ip, port)
    }

    /// Kill the process of a task. Unknown tasks are acknowledged as well.
    pub fn handle_kill(&self, req: KillProcessRequest) -> Ack {
        if self.spawner_id() != Some(req.spawner_id) {
            return Ack::fail(format!("unknown spawner {}", req.spawner_id));
        }
        if self.shared.processes.stop(req.spawn_id) {
            info!(target: "roost.exec", task_id = %req.spawn_id, "kill requested");
        } else {
            debug!(target: "roost.exec", task_id = %req.spawn_id, "kill for unknown process");
        }
        Ack::ok()
    }

    /// Report the process count every `report_interval_ms` until `cancel` fires.
    ///
    /// Registers again whenever the master has dropped this spawner.
    pub async fn run_reporter(&self, cancel: CancellationToken) {
        let mut interval = time::interval(self.config().report_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.report_or_register().await,
            }
        }
    }

    async fn report_or_register(&self) {
        if self.spawner_id().is_some() {
            self.shared.report_count().await;
        }
        if self.spawner_id().is_some() {
            return;
        }
        if let Err(e) = self.register().await {
            warn!(target: "roost.exec", error = %e, "registration failed; retrying");
        }
    }

    /// Kill every process and wait until all of them have been cleaned up.
    pub async fn kill_all(&self) {
        let count = self.shared.processes.stop_all();
        if count > 0 {
            info!(target: "roost.exec", count, "stopping all processes");
        }
        self.shared.watchers.close();
        self.shared.watchers.wait().await;
    }
}

#[async_trait]
impl SpawnerLink for SpawnerController {
    async fn spawn_process(&self, req: SpawnProcessRequest) -> Result<Ack, LinkError> {
        Ok(self.handle_spawn(req).await)
    }

    async fn kill_process(&self, req: KillProcessRequest) -> Result<Ack, LinkError> {
        Ok(self.handle_kill(req))
    }
}

fn resolve_executable(options: &Properties, cfg: &SpawnerConfig) -> Result<PathBuf, ExecError> {
    let path = options
        .get(OPT_EXECUTABLE)
        .map(PathBuf::from)
        .or_else(|| cfg.executable_path.clone())
        .ok_or_else(|| ExecError::MissingExecutable("no executable configured".into()))?;
    if !path.is_file() {
        return Err(ExecError::MissingExecutable(path.display().to_string()));
    }
    Ok(path)
}

/// Wait for the process to exit (or kill it when asked), then clean up and report.
async fn watch_exit(
    shared: Arc<Shared>,
    id: SpawnTaskId,
    mut child: Child,
    stop: CancellationToken,
    port: u16,
    grace: Duration,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = stop.cancelled() => None,
    };
    let status = match exited {
        Some(status) => status,
        None => kill_graceful(&mut child, grace).await,
    };
    match &status {
        Ok(status) => info!(
            target: "roost.exec",
            task_id = %id,
            reason = %describe_exit(status),
            "process exited"
        ),
        Err(e) => warn!(target: "roost.exec", task_id = %id, error = %e, "lost track of process"),
    }

    shared.processes.remove(id);
    shared.ports.release(port);
    if let Err(e) = shared
        .master
        .process_killed(ProcessKilled { spawn_id: id })
        .await
    {
        warn!(target: "roost.exec", task_id = %id, error = %e, "process killed notification failed");
    }
    shared.report_count().await;
}

fn forward_output(child: &mut Child, id: SpawnTaskId) {
    if let Some(out) = child.stdout.take() {
        tokio::spawn(forward_lines(out, id, "stdout"));
    }
    if let Some(err) = child.stderr.take() {
        tokio::spawn(forward_lines(err, id, "stderr"));
    }
}

async fn forward_lines<R>(reader: R, id: SpawnTaskId, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "roost.exec.output", task_id = %id, stream, "{line}");
    }
}
