use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::{
    constants::SCRIPT_FILE_NAME,
    core::{
        domain::SourceProgram,
        limits::ResourceLimits,
        traits::backend::{Backend, BackendError, Captured, CappedOutput},
    },
};

const READ_CHUNK_BYTES: usize = 8 * 1024;
const SELF_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// How execution units are fenced off from the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Isolation {
    /// Interpreter runs under bubblewrap: read-only view of the host, private
    /// `/tmp`, `/proc` and `/dev`, fresh pid/net/ipc/uts namespaces. The
    /// scratch directory is the only writable host path.
    Bubblewrap { program: PathBuf },
    /// Plain child process with rlimits only.
    Unconfined,
}

impl Isolation {
    /// Resolves `program` against `PATH` unless it already names a path.
    pub fn bubblewrap(program: &str) -> Result<Self, BackendError> {
        resolve_program(program)
            .map(|program| Isolation::Bubblewrap { program })
            .ok_or_else(|| BackendError::Isolation(format!("{} not found", program)))
    }
}

fn resolve_program(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    })
}

/// Runs each program in a fresh interpreter process inside its own scratch
/// directory.
#[derive(Clone, Debug)]
pub struct ProcessBackend {
    interpreter: String,
    interpreter_args: Vec<String>,
    scratch_root: PathBuf,
    isolation: Isolation,
    cpu_time_limit_secs: u64,
    memory_limit_bytes: u64,
}

impl ProcessBackend {
    /// Starts unconfined with `-u` so the interpreter is unbuffered and
    /// output written before a crash or kill is still captured.
    pub fn new<T>(interpreter: &str, scratch_root: T, limits: &ResourceLimits) -> Self
    where
        T: AsRef<Path>,
    {
        let wall_secs = limits.max_wall_time().as_millis().div_ceil(1000) as u64;

        ProcessBackend {
            interpreter: interpreter.to_string(),
            interpreter_args: vec!["-u".to_string()],
            scratch_root: scratch_root.as_ref().into(),
            isolation: Isolation::Unconfined,
            cpu_time_limit_secs: wall_secs + 1,
            memory_limit_bytes: limits.max_memory_bytes(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.interpreter_args = args;
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Pushes an empty program through the whole launch path. Startup calls
    /// this so a host that cannot build the sandbox is refused up front
    /// instead of failing every request.
    pub async fn self_check(&self) -> Result<(), BackendError> {
        let mut handle = self.launch(&SourceProgram::admitted(String::new())).await?;

        let waited = tokio::time::timeout(SELF_CHECK_TIMEOUT, self.wait(&mut handle, 4096)).await;
        if waited.is_err() {
            self.kill(&mut handle).await;
        }
        self.cleanup(handle).await;

        let captured = waited.map_err(|_| {
            BackendError::Isolation(format!("no exit within {:?}", SELF_CHECK_TIMEOUT))
        })??;

        match captured.status {
            Some(0) => Ok(()),
            status => Err(BackendError::Isolation(format!(
                "empty program exited with {:?}: {}",
                status,
                String::from_utf8_lossy(&captured.stderr.data).trim()
            ))),
        }
    }

    fn command(&self, scratch: &Path, script: &Path) -> Command {
        let mut cmd = match &self.isolation {
            Isolation::Bubblewrap { program } => {
                let mut cmd = Command::new(program);
                cmd.args(["--unshare-all", "--die-with-parent"])
                    .args(["--ro-bind", "/", "/"])
                    .args(["--dev", "/dev", "--proc", "/proc", "--tmpfs", "/tmp"])
                    .arg("--bind")
                    .arg(scratch)
                    .arg(scratch)
                    .arg("--chdir")
                    .arg(scratch)
                    .arg("--")
                    .arg(&self.interpreter);
                cmd
            }
            Isolation::Unconfined => Command::new(&self.interpreter),
        };

        cmd.args(&self.interpreter_args)
            .arg(script)
            .current_dir(scratch)
            .env_clear()
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("HOME", scratch)
            .env("TMPDIR", scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }

        #[cfg(unix)]
        confine(&mut cmd, self.cpu_time_limit_secs, self.memory_limit_bytes);

        cmd
    }
}

/// Own process group plus CPU, address space and file size rlimits, set
/// between fork and exec.
#[cfg(unix)]
fn confine(cmd: &mut Command, cpu_time_limit_secs: u64, memory_limit_bytes: u64) {
    use crate::constants::SCRATCH_FILE_SIZE_LIMIT_BYTES;
    use nix::sys::resource::{Resource, setrlimit};
    use nix::unistd::{Pid, setpgid};

    // SAFETY: the closure only issues setpgid/setrlimit syscalls, both
    // async-signal-safe, and allocates nothing.
    unsafe {
        cmd.pre_exec(move || {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
            setrlimit(Resource::RLIMIT_CPU, cpu_time_limit_secs, cpu_time_limit_secs)?;
            setrlimit(Resource::RLIMIT_AS, memory_limit_bytes, memory_limit_bytes)?;
            setrlimit(
                Resource::RLIMIT_FSIZE,
                SCRATCH_FILE_SIZE_LIMIT_BYTES,
                SCRATCH_FILE_SIZE_LIMIT_BYTES,
            )?;
            Ok(())
        });
    }
}

/// One live execution unit. Field order is teardown order on drop: the
/// process group is killed, the child is reaped, then the scratch directory
/// is removed.
///
/// The group stays armed exactly while the leader is unreaped. A zombie
/// leader keeps its pid, so `killpg` can never reach a recycled group.
#[derive(Debug)]
pub struct ProcessHandle {
    group: ProcessGroup,
    child: Child,
    scratch: TempDir,
}

impl ProcessHandle {
    #[cfg(test)]
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }
}

#[derive(Debug)]
struct ProcessGroup(Option<i32>);

impl ProcessGroup {
    fn kill(&self) {
        if let Some(pgid) = self.0 {
            kill_group(pgid);
        }
    }

    /// Final kill, issued before the leader is reaped. The group is not
    /// signalled again afterwards.
    fn release(&mut self) {
        self.kill();
        self.0 = None;
    }
}

#[cfg(unix)]
fn kill_group(pgid: i32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => tracing::warn!("Failed to kill process group {}: {}", pgid, err),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: i32) {}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[async_trait::async_trait]
impl Backend for ProcessBackend {
    type Handle = ProcessHandle;

    #[tracing::instrument(skip_all, fields(interpreter = %self.interpreter))]
    async fn launch(&self, program: &SourceProgram) -> Result<ProcessHandle, BackendError> {
        tokio::fs::create_dir_all(&self.scratch_root)
            .await
            .map_err(BackendError::Scratch)?;
        let scratch = tempfile::Builder::new()
            .prefix("unit-")
            .tempdir_in(&self.scratch_root)
            .map_err(BackendError::Scratch)?;

        let script = scratch.path().join(SCRIPT_FILE_NAME);
        tokio::fs::write(&script, program.as_str())
            .await
            .map_err(BackendError::Scratch)?;

        let mut cmd = self.command(scratch.path(), &script);
        let child = cmd.spawn().map_err(|source| BackendError::Spawn {
            interpreter: cmd.as_std().get_program().to_string_lossy().into_owned(),
            source,
        })?;

        let pgid = child.id().map(|pid| pid as i32);
        tracing::debug!("Launched unit pid={:?} in {}", pgid, scratch.path().display());

        Ok(ProcessHandle {
            group: ProcessGroup(pgid),
            child,
            scratch,
        })
    }

    async fn wait(
        &self,
        handle: &mut ProcessHandle,
        max_output_bytes: usize,
    ) -> Result<Captured, BackendError> {
        let stdout = handle.child.stdout.take();
        let stderr = handle.child.stderr.take();

        let (stdout, stderr, exited) = tokio::join!(
            read_capped(stdout, max_output_bytes),
            read_capped(stderr, max_output_bytes),
            leader_exited(handle.child.id()),
        );
        exited.map_err(BackendError::Wait)?;

        // stragglers that let go of the pipes
        handle.group.release();
        let status = handle.child.wait().await.map_err(BackendError::Wait)?;

        Ok(Captured {
            status: status.code(),
            stdout: stdout.map_err(BackendError::Wait)?,
            stderr: stderr.map_err(BackendError::Wait)?,
        })
    }

    async fn kill(&self, handle: &mut ProcessHandle) {
        handle.group.release();
        if let Err(err) = handle.child.kill().await {
            tracing::debug!("Kill after group signal: {}", err);
        }
    }

    async fn cleanup(&self, handle: ProcessHandle) {
        let ProcessHandle {
            mut group,
            mut child,
            scratch,
        } = handle;

        // no-op once wait or kill already reaped the leader
        group.release();
        if let Err(err) = child.wait().await {
            tracing::warn!("Failed to reap execution unit: {}", err);
        }

        let path = scratch.path().to_path_buf();
        if let Err(err) = scratch.close() {
            tracing::error!("Failed to remove scratch area {}: {}", path.display(), err);
        }
    }
}

/// Resolves once the group leader has exited, leaving it unreaped.
#[cfg(target_os = "linux")]
async fn leader_exited(pid: Option<u32>) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::wait::{Id, WaitPidFlag, waitid};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return Ok(());
    };
    let pid = Pid::from_raw(pid as i32);

    tokio::task::spawn_blocking(move || {
        loop {
            match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
                Ok(_) | Err(Errno::ECHILD) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(err) => return Err(std::io::Error::from(err)),
            }
        }
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Without `WNOWAIT`, closed pipes stand in for the leader exiting.
#[cfg(not(target_os = "linux"))]
async fn leader_exited(_pid: Option<u32>) -> std::io::Result<()> {
    Ok(())
}

/// Keeps the first `limit` bytes and drains the rest so the writer never
/// blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> std::io::Result<CappedOutput>
where
    R: AsyncRead + Unpin,
{
    let mut output = CappedOutput::default();
    let Some(mut reader) = reader else {
        return Ok(output);
    };

    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        let room = limit.saturating_sub(output.data.len());
        if n > room {
            output.truncated = true;
        }
        output.data.extend_from_slice(&buf[..n.min(room)]);
    }

    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh_backend(scratch_root: &Path) -> ProcessBackend {
        ProcessBackend::new("/bin/sh", scratch_root, &ResourceLimits::default()).with_args(vec![])
    }

    fn program(code: &str) -> SourceProgram {
        ResourceLimits::default().admit(code.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_read_capped_truncates_and_drains() {
        let data = vec![b'x'; 20_000];
        let output = read_capped(Some(&data[..]), 100).await.unwrap();

        assert_eq!(output.data.len(), 100);
        assert!(output.truncated);
    }

    #[tokio::test]
    async fn test_read_capped_exact_fit_is_not_truncated() {
        let data = b"hello";
        let output = read_capped(Some(&data[..]), 5).await.unwrap();

        assert_eq!(output.data, b"hello");
        assert!(!output.truncated);
    }

    #[tokio::test]
    async fn test_launch_runs_in_scratch_dir() {
        let root = tempfile::tempdir().unwrap();
        let backend = sh_backend(root.path());

        let mut handle = backend.launch(&program("pwd\necho $HOME")).await.unwrap();
        let scratch = handle.scratch_path().to_path_buf();
        assert!(scratch.join(SCRIPT_FILE_NAME).exists());
        assert!(scratch.starts_with(root.path()));

        let captured = backend.wait(&mut handle, 1024).await.unwrap();
        let stdout = String::from_utf8_lossy(&captured.stdout.data).to_string();
        let expected = scratch.canonicalize().unwrap();
        for line in stdout.lines() {
            assert_eq!(Path::new(line).canonicalize().unwrap(), expected);
        }
        assert_eq!(captured.status, Some(0));

        backend.cleanup(handle).await;
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_environment_is_cleared() {
        let root = tempfile::tempdir().unwrap();
        let backend = sh_backend(root.path());

        let mut handle = backend
            .launch(&program("echo \"[$CARGO_PKG_NAME]\""))
            .await
            .unwrap();
        let captured = backend.wait(&mut handle, 1024).await.unwrap();
        backend.cleanup(handle).await;

        assert_eq!(captured.stdout.data, b"[]\n");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let root = tempfile::tempdir().unwrap();
        let backend = ProcessBackend::new(
            "/nonexistent/interpreter",
            root.path(),
            &ResourceLimits::default(),
        );

        let result = backend.launch(&program("print(1)")).await;

        assert!(matches!(result, Err(BackendError::Spawn { .. })));
        // failed launch leaves no scratch behind
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    fn arg_strings(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_bubblewrap_command_confines_filesystem_and_network() {
        let backend = ProcessBackend::new("python3", "/srv/runs", &ResourceLimits::default())
            .with_isolation(Isolation::Bubblewrap {
                program: PathBuf::from("/usr/bin/bwrap"),
            });
        let scratch = Path::new("/srv/runs/unit-1");

        let cmd = backend.command(scratch, &scratch.join(SCRIPT_FILE_NAME));
        let args = arg_strings(&cmd);

        assert_eq!(cmd.as_std().get_program(), "/usr/bin/bwrap");
        assert!(args.iter().any(|arg| arg == "--unshare-all"));
        assert!(!args.iter().any(|arg| arg == "--share-net"));
        assert!(args.windows(3).any(|w| w == ["--ro-bind", "/", "/"]));
        assert!(args.windows(2).any(|w| w == ["--tmpfs", "/tmp"]));
        assert!(
            args.windows(3)
                .any(|w| w == ["--bind", "/srv/runs/unit-1", "/srv/runs/unit-1"])
        );

        let separator = args.iter().position(|arg| arg == "--").unwrap();
        assert_eq!(
            args[separator + 1..],
            ["python3", "-u", "/srv/runs/unit-1/main.py"]
        );
    }

    #[test]
    fn test_unconfined_command_runs_interpreter_directly() {
        let backend = ProcessBackend::new("python3", "/srv/runs", &ResourceLimits::default());
        let scratch = Path::new("/srv/runs/unit-1");

        let cmd = backend.command(scratch, &scratch.join(SCRIPT_FILE_NAME));

        assert_eq!(cmd.as_std().get_program(), "python3");
        assert_eq!(arg_strings(&cmd), ["-u", "/srv/runs/unit-1/main.py"]);
    }

    #[test]
    fn test_missing_bubblewrap_is_an_error() {
        assert!(matches!(
            Isolation::bubblewrap("/nonexistent/bwrap"),
            Err(BackendError::Isolation(_))
        ));
        assert!(matches!(
            Isolation::bubblewrap("definitely-not-a-sandbox-tool"),
            Err(BackendError::Isolation(_))
        ));
    }

    #[tokio::test]
    async fn test_self_check_passes_for_working_interpreter() {
        let root = tempfile::tempdir().unwrap();
        sh_backend(root.path()).self_check().await.unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_self_check_rejects_broken_sandbox() {
        let root = tempfile::tempdir().unwrap();
        let backend = sh_backend(root.path()).with_isolation(Isolation::Bubblewrap {
            program: PathBuf::from("/bin/false"),
        });

        let result = backend.self_check().await;

        assert!(matches!(result, Err(BackendError::Isolation(_))), "{:?}", result);
    }

    #[tokio::test]
    async fn test_memory_ceiling_stops_runaway_allocation() {
        let root = tempfile::tempdir().unwrap();
        // generous wall and CPU budget so only the memory ceiling can end it
        let limits = ResourceLimits::new(20_000, 4096, 1024)
            .unwrap()
            .with_max_memory_bytes(64 * 1024 * 1024)
            .unwrap();
        let backend = ProcessBackend::new("/bin/sh", root.path(), &limits).with_args(vec![]);

        let mut handle = backend
            .launch(&program("x=a\nwhile :; do x=\"$x$x\"; done"))
            .await
            .unwrap();
        let waited = tokio::time::timeout(Duration::from_secs(10), backend.wait(&mut handle, 4096)).await;
        if waited.is_err() {
            backend.kill(&mut handle).await;
        }
        backend.cleanup(handle).await;

        let captured = waited.expect("allocation loop outlived the memory ceiling").unwrap();
        assert_ne!(captured.status, Some(0));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_stragglers_are_killed_when_leader_exits() {
        let root = tempfile::tempdir().unwrap();
        let backend = sh_backend(root.path());

        let mut handle = backend
            .launch(&program("sleep 30 >/dev/null 2>&1 &\necho $!"))
            .await
            .unwrap();
        let captured = backend.wait(&mut handle, 1024).await.unwrap();
        backend.cleanup(handle).await;

        let pid: u32 = String::from_utf8_lossy(&captured.stdout.data)
            .trim()
            .parse()
            .unwrap();

        // gone, or a zombie waiting for its new parent to reap it
        let dead = || match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !dead() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(dead(), "background sleep {} survived", pid);
    }

    /// `None` when bubblewrap is missing or cannot create namespaces here.
    async fn confined_backend(root: &Path) -> Option<ProcessBackend> {
        let isolation = Isolation::bubblewrap("bwrap").ok()?;
        let backend = sh_backend(root).with_isolation(isolation);

        match backend.self_check().await {
            Ok(()) => Some(backend),
            Err(err) => {
                eprintln!("bubblewrap cannot confine on this host, skipping: {}", err);
                None
            }
        }
    }

    #[tokio::test]
    async fn test_bubblewrap_keeps_writes_inside_scratch() {
        let root = tempfile::tempdir().unwrap();
        let Some(backend) = confined_backend(root.path()).await else {
            return;
        };
        let host_tmp = tempfile::tempdir().unwrap();
        let host_dir = tempfile::tempdir_in(env!("CARGO_MANIFEST_DIR")).unwrap();
        let targets = [host_tmp.path().join("escaped"), host_dir.path().join("escaped")];

        let mut code = String::new();
        for target in &targets {
            code.push_str(&format!("echo pwned > '{}' && echo wrote\n", target.display()));
        }
        code.push_str("echo kept > inside.txt && cat inside.txt\n");

        let mut handle = backend.launch(&program(&code)).await.unwrap();
        let captured = backend.wait(&mut handle, 4096).await.unwrap();
        backend.cleanup(handle).await;

        assert_eq!(String::from_utf8_lossy(&captured.stdout.data).trim(), "kept");
        for target in &targets {
            assert!(!target.exists(), "{} was written", target.display());
        }
    }

    #[tokio::test]
    async fn test_bubblewrap_leaves_only_loopback() {
        let root = tempfile::tempdir().unwrap();
        let Some(backend) = confined_backend(root.path()).await else {
            return;
        };

        let mut handle = backend.launch(&program("cat /proc/net/dev")).await.unwrap();
        let captured = backend.wait(&mut handle, 4096).await.unwrap();
        backend.cleanup(handle).await;

        let table = String::from_utf8_lossy(&captured.stdout.data).to_string();
        let interfaces: Vec<&str> = table
            .lines()
            .skip(2)
            .filter_map(|line| line.split_once(':').map(|(name, _)| name.trim()))
            .collect();
        assert_eq!(interfaces, ["lo"]);
    }

    #[tokio::test]
    async fn test_dropped_handle_releases_everything() {
        let root = tempfile::tempdir().unwrap();
        let backend = sh_backend(root.path());

        let handle = backend.launch(&program("sleep 30")).await.unwrap();
        let scratch = handle.scratch_path().to_path_buf();
        drop(handle);

        assert!(!scratch.exists());
    }
}
