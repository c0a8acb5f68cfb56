use crate::process::{run_command, run_command_combined};
use anyhow::{Context as _, anyhow};
use flotilla_domain::{
    ContainerConfig, ContainerRuntime, ContainerState, ExecConnection, ExecRequest,
    MANAGED_LABEL, ManagedContainer, Mount, WORKSTREAM_LABEL,
};
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::PathBuf;

const STOP_GRACE_SECS: &str = "10";

/// [`ContainerRuntime`] backed by the `docker` executable.
#[derive(Clone, Debug)]
pub struct DockerCli {
    binary: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(PathBuf::from("docker"))
    }
}

#[derive(serde::Deserialize)]
struct PsRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

fn label_value<'a>(labels: &'a str, key: &str) -> Option<&'a str> {
    labels
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim())
}

fn parse_ps_output(out: &str) -> anyhow::Result<Vec<ManagedContainer>> {
    let mut containers = Vec::new();
    for line in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let row: PsRow = serde_json::from_str(line)
            .with_context(|| format!("unexpected docker ps row: {line}"))?;
        let workstream_id = label_value(&row.labels, WORKSTREAM_LABEL)
            .filter(|v| !v.is_empty())
            .map(str::to_owned);
        containers.push(ManagedContainer {
            id: row.id,
            name: row.names,
            state: ContainerState::parse(&row.state),
            workstream_id,
        });
    }
    Ok(containers)
}

fn mount_arg(mount: &Mount) -> anyhow::Result<String> {
    let source = mount
        .source
        .to_str()
        .ok_or_else(|| anyhow!("invalid mount source: {}", mount.source.display()))?;
    let mut arg = format!("{source}:{}", mount.target);
    if mount.read_only {
        arg.push_str(":ro");
    }
    Ok(arg)
}

fn create_args(config: &ContainerConfig) -> anyhow::Result<Vec<String>> {
    let mut args = vec!["create".to_owned(), "--name".to_owned(), config.name.clone()];
    for (key, value) in &config.labels {
        args.push("--label".to_owned());
        args.push(format!("{key}={value}"));
    }
    for mount in [&config.workspace, &config.git_dir, &config.config_dir] {
        args.push("-v".to_owned());
        args.push(mount_arg(mount)?);
    }
    args.push("-w".to_owned());
    args.push(config.working_dir.clone());
    for (key, value) in &config.env {
        args.push("-e".to_owned());
        args.push(format!("{key}={value}"));
    }
    args.push(config.image.clone());
    args.extend(config.command.iter().cloned());
    Ok(args)
}

/// Env values are handed to the docker client process and forwarded by name,
/// so they never appear on a command line.
fn exec_args(request: &ExecRequest) -> Vec<String> {
    let mut args = vec!["exec".to_owned(), "-it".to_owned()];
    for (key, _) in &request.env {
        args.push("-e".to_owned());
        args.push(key.clone());
    }
    if let Some(dir) = &request.working_dir {
        args.push("-w".to_owned());
        args.push(dir.clone());
    }
    args.push(request.container_id.clone());
    args.extend(request.command.iter().cloned());
    args
}

fn is_missing_container(err: &anyhow::Error) -> bool {
    format!("{err:#}").contains("No such container")
        || format!("{err:#}").contains("No such object")
}

impl DockerCli {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn run_docker<I, S>(&self, args: I) -> anyhow::Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_command(self.binary.as_os_str(), None, args)
    }

    fn list_managed_internal(&self) -> anyhow::Result<Vec<ManagedContainer>> {
        let filter = format!("label={MANAGED_LABEL}=true");
        let out = self
            .run_docker(["ps", "-a", "--filter", &filter, "--format", "{{json .}}"])
            .context("failed to list managed containers")?;
        parse_ps_output(&out)
    }

    fn exec_attach_internal(&self, request: &ExecRequest) -> anyhow::Result<DockerExecConnection> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: request.height,
                cols: request.width,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("openpty failed")?;

        let mut cmd = CommandBuilder::new(&self.binary);
        cmd.args(exec_args(request));
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .context("spawn docker exec")?;
        drop(pair.slave);
        let reader = pair.master.try_clone_reader().context("clone pty reader")?;
        let writer = pair.master.take_writer().context("take pty writer")?;

        let short_id = request.container_id.chars().take(12).collect::<String>();
        let exec_id = match child.process_id() {
            Some(pid) => format!("{short_id}-{pid}"),
            None => short_id,
        };

        Ok(DockerExecConnection {
            exec_id,
            master: pair.master,
            child,
            reader: Some(reader),
            writer: Some(writer),
        })
    }
}

impl ContainerRuntime for DockerCli {
    fn create_container(&self, config: &ContainerConfig) -> Result<String, String> {
        let result: anyhow::Result<String> = (|| {
            let args = create_args(config)?;
            let id = self
                .run_docker(&args)
                .with_context(|| format!("failed to create container {}", config.name))?;
            if id.is_empty() {
                return Err(anyhow!("docker create returned no container id"));
            }
            Ok(id)
        })();
        result.map_err(|e| format!("{e:#}"))
    }

    fn start_container(&self, id: &str) -> Result<(), String> {
        self.run_docker(["start", id])
            .map(|_| ())
            .with_context(|| format!("failed to start container {id}"))
            .map_err(|e| format!("{e:#}"))
    }

    fn stop_container(&self, id: &str) -> Result<(), String> {
        match self.run_docker(["stop", "-t", STOP_GRACE_SECS, id]) {
            Ok(_) => Ok(()),
            Err(err) if is_missing_container(&err) => Ok(()),
            Err(err) => Err(format!(
                "{:#}",
                err.context(format!("failed to stop container {id}"))
            )),
        }
    }

    fn remove_container(&self, id: &str) -> Result<(), String> {
        match self.run_docker(["rm", "-f", id]) {
            Ok(_) => Ok(()),
            Err(err) if is_missing_container(&err) => Ok(()),
            Err(err) => Err(format!(
                "{:#}",
                err.context(format!("failed to remove container {id}"))
            )),
        }
    }

    fn pause_container(&self, id: &str) -> Result<(), String> {
        self.run_docker(["pause", id])
            .map(|_| ())
            .with_context(|| format!("failed to pause container {id}"))
            .map_err(|e| format!("{e:#}"))
    }

    fn unpause_container(&self, id: &str) -> Result<(), String> {
        self.run_docker(["unpause", id])
            .map(|_| ())
            .with_context(|| format!("failed to unpause container {id}"))
            .map_err(|e| format!("{e:#}"))
    }

    fn container_state(&self, id: &str) -> Result<ContainerState, String> {
        match self.run_docker(["inspect", "--format", "{{.State.Status}}", id]) {
            Ok(out) => Ok(ContainerState::parse(&out)),
            Err(err) if is_missing_container(&err) => Ok(ContainerState::Missing),
            Err(err) => Err(format!(
                "{:#}",
                err.context(format!("failed to inspect container {id}"))
            )),
        }
    }

    fn container_logs(&self, id: &str, tail: usize) -> Result<String, String> {
        let tail = tail.to_string();
        run_command_combined(self.binary.as_os_str(), ["logs", "--tail", tail.as_str(), id])
            .with_context(|| format!("failed to read logs of container {id}"))
            .map_err(|e| format!("{e:#}"))
    }

    fn exec_attach(&self, request: &ExecRequest) -> Result<Box<dyn ExecConnection>, String> {
        self.exec_attach_internal(request)
            .map(|conn| Box::new(conn) as Box<dyn ExecConnection>)
            .map_err(|e| format!("{e:#}"))
    }

    fn prune_managed_containers(&self) -> Result<usize, String> {
        let result: anyhow::Result<usize> = (|| {
            let mut removed = 0usize;
            for container in self.list_managed_internal()? {
                if !matches!(
                    container.state,
                    ContainerState::Exited | ContainerState::Dead | ContainerState::Created
                ) {
                    continue;
                }
                match self.run_docker(["rm", "-f", container.id.as_str()]) {
                    Ok(_) => removed += 1,
                    Err(err) => {
                        tracing::warn!(
                            container_id = %container.id,
                            error = %format!("{err:#}"),
                            "failed to remove managed container"
                        );
                    }
                }
            }
            Ok(removed)
        })();
        result.map_err(|e| format!("{e:#}"))
    }

    fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>, String> {
        self.list_managed_internal().map_err(|e| format!("{e:#}"))
    }
}

struct DockerExecConnection {
    exec_id: String,
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
}

impl ExecConnection for DockerExecConnection {
    fn exec_id(&self) -> &str {
        &self.exec_id
    }

    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    fn resize(&self, width: u16, height: u16) -> Result<(), String> {
        self.master
            .resize(PtySize {
                rows: height,
                cols: width,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("pty resize")
            .map_err(|e| format!("{e:#}"))
    }

    fn close(&mut self) -> Result<(), String> {
        self.writer = None;
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        self.child
            .kill()
            .context("failed to stop docker exec")
            .map_err(|e| format!("{e:#}"))?;
        let _ = self.child.wait();
        Ok(())
    }
}
