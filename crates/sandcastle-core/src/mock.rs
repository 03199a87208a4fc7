//! In-memory backend for tests.
//!
//! [`MockRemote`] implements [`RemoteApi`] (and, optionally,
//! [`RemoteFilesystem`]) over a simulated filesystem. It interprets the
//! handful of programs providers run (`mkdir`, `cat`, `find`, `npm`,
//! `pkill`, `curl`, ...) and records every command so tests can assert on
//! side effects.

use crate::providers::compute;
use crate::shell::{self, APPEND_BASE64_SCRIPT, WRITE_BASE64_SCRIPT};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sandcastle_remote::{
    CommandSpec, ExecOutput, RemoteApi, RemoteError, RemoteFilesystem, RemoteSession, Result,
    SessionRequest,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Largest command line a session accepts, like Linux's `MAX_ARG_STRLEN`
/// for the single `sh -c` argument.
const MAX_ARG_BYTES: usize = 128 * 1024;

/// How the simulated `compute status` command behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolingBehavior {
    /// Ready on the first check.
    Ready,
    /// Ready once this many checks have failed.
    ReadyAfter(u32),
    /// Never ready until the installer runs.
    NeedsInstall,
    /// The installer fails too.
    Broken,
}

#[derive(Debug)]
struct MockSession {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    home_dir: String,
    dev_server_running: bool,
    probes_since_start: u32,
    status_checks: u32,
    tooling_installed: bool,
}

impl MockSession {
    fn new(home_dir: &str) -> Self {
        let mut session = Self {
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
            home_dir: home_dir.to_string(),
            dev_server_running: false,
            probes_since_start: 0,
            status_checks: 0,
            tooling_installed: false,
        };
        session.add_dir(home_dir);
        session.add_dir("/tmp");
        session
    }

    fn add_dir(&mut self, dir: &str) {
        let mut current = Some(dir.trim_end_matches('/'));
        while let Some(path) = current.filter(|p| !p.is_empty()) {
            self.dirs.insert(path.to_string());
            current = shell::parent_dir(path);
        }
    }

    fn parent_exists(&self, path: &str) -> bool {
        shell::parent_dir(path).map_or(true, |p| self.dirs.contains(p))
    }

    fn write(&mut self, path: &str, content: Vec<u8>) {
        self.files.insert(path.to_string(), content);
    }
}

#[derive(Debug)]
struct MockState {
    sessions: HashMap<String, MockSession>,
    history: Vec<(String, CommandSpec)>,
    connectable: HashSet<String>,
    destroyed: Vec<String>,
    fail_create: bool,
    fail_destroy: bool,
    exec_delay: Option<Duration>,
    tooling: ToolingBehavior,
    dev_server_boot_probes: u32,
    dev_server_broken: bool,
}

/// Simulated remote backend.
pub struct MockRemote {
    backend: String,
    native_fs: bool,
    home_dir: String,
    state: Mutex<MockState>,
}

impl MockRemote {
    /// Create a shell-only mock for `backend`.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            native_fs: false,
            home_dir: "/home/user".to_string(),
            state: Mutex::new(MockState {
                sessions: HashMap::new(),
                history: Vec::new(),
                connectable: HashSet::new(),
                destroyed: Vec::new(),
                fail_create: false,
                fail_destroy: false,
                exec_delay: None,
                tooling: ToolingBehavior::Ready,
                dev_server_boot_probes: 0,
                dev_server_broken: false,
            }),
        }
    }

    /// Offer the native file API.
    pub fn with_native_fs(mut self, enabled: bool) -> Self {
        self.native_fs = enabled;
        self
    }

    /// Home directory reported for new sessions.
    pub fn with_home_dir(mut self, dir: impl Into<String>) -> Self {
        self.home_dir = dir.into();
        self
    }

    /// Behavior of the `compute status` command.
    pub fn with_tooling(self, behavior: ToolingBehavior) -> Self {
        self.lock().tooling = behavior;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `create_session` fail.
    pub fn fail_create(&self, fail: bool) {
        self.lock().fail_create = fail;
    }

    /// Make `destroy_session` fail (the session stays alive).
    pub fn fail_destroy(&self, fail: bool) {
        self.lock().fail_destroy = fail;
    }

    /// Delay every `exec` by `delay`.
    pub fn set_exec_delay(&self, delay: Option<Duration>) {
        self.lock().exec_delay = delay;
    }

    /// Allow `connect_session` to attach to `id` as an existing session.
    pub fn allow_connect(&self, id: impl Into<String>) {
        self.lock().connectable.insert(id.into());
    }

    /// Number of failed probes before the dev server answers.
    pub fn set_dev_server_boot_probes(&self, probes: u32) {
        self.lock().dev_server_boot_probes = probes;
    }

    /// Make the dev server never answer.
    pub fn set_dev_server_broken(&self, broken: bool) {
        self.lock().dev_server_broken = broken;
    }

    /// Every command executed, in order.
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.lock().history.iter().map(|(_, c)| c.clone()).collect()
    }

    /// Number of executed commands matching `pred`.
    pub fn count_commands<F>(&self, pred: F) -> usize
    where
        F: Fn(&CommandSpec) -> bool,
    {
        self.lock().history.iter().filter(|(_, c)| pred(c)).count()
    }

    /// Number of detached `npm run dev` starts.
    pub fn dev_server_starts(&self) -> usize {
        self.count_commands(|c| c.program == "npm" && c.args.first().map(String::as_str) == Some("run"))
    }

    /// Number of `pkill` invocations.
    pub fn kill_count(&self) -> usize {
        self.count_commands(|c| c.program == "pkill")
    }

    /// Ids of sessions that still exist.
    pub fn live_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of destroyed sessions, in order.
    pub fn destroyed_sessions(&self) -> Vec<String> {
        self.lock().destroyed.clone()
    }

    /// Content of `path` in session `id`.
    pub fn file(&self, id: &str, path: &str) -> Option<String> {
        self.lock()
            .sessions
            .get(id)
            .and_then(|s| s.files.get(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Seed `path` in session `id`, creating its parents.
    pub fn put_file(&self, id: &str, path: &str, content: &str) {
        if let Some(session) = self.lock().sessions.get_mut(id) {
            if let Some(parent) = shell::parent_dir(path) {
                session.add_dir(parent);
            }
            session.write(path, content.as_bytes().to_vec());
        }
    }

    /// Whether the dev server of session `id` is running.
    pub fn dev_server_running(&self, id: &str) -> bool {
        self.lock()
            .sessions
            .get(id)
            .is_some_and(|s| s.dev_server_running)
    }

    /// Number of tooling status checks in session `id`.
    pub fn status_checks(&self, id: &str) -> u32 {
        self.lock().sessions.get(id).map_or(0, |s| s.status_checks)
    }

    fn run(state: &mut MockState, session_id: &str, cmd: &CommandSpec) -> Result<ExecOutput> {
        let tooling = state.tooling;
        let boot_probes = state.dev_server_boot_probes;
        let broken = state.dev_server_broken;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RemoteError::SessionNotFound(session_id.to_string()))?;
        let cwd = cmd.cwd.clone().unwrap_or_else(|| session.home_dir.clone());
        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();

        let out = match (cmd.program.as_str(), args.as_slice()) {
            ("mkdir", ["-p", dir]) => {
                let dir = shell::resolve_path(&cwd, dir);
                if session.files.contains_key(&dir) {
                    ExecOutput::failed(1, format!("mkdir: cannot create directory '{dir}': File exists"))
                } else {
                    session.add_dir(&dir);
                    ExecOutput::ok("")
                }
            }
            ("cat", [path]) => {
                let path = shell::resolve_path(&cwd, path);
                match session.files.get(&path) {
                    Some(bytes) => ExecOutput::ok(String::from_utf8_lossy(bytes)),
                    None => ExecOutput::failed(1, format!("cat: {path}: No such file or directory")),
                }
            }
            ("tail", ["-n", lines, path]) => {
                let lines: usize = lines.parse().unwrap_or(10);
                match session.files.get(*path) {
                    Some(bytes) => {
                        let text = String::from_utf8_lossy(bytes);
                        let all: Vec<&str> = text.lines().collect();
                        let tail = all[all.len().saturating_sub(lines)..].join("\n");
                        ExecOutput::ok(format!("{tail}\n"))
                    }
                    None => ExecOutput::failed(
                        1,
                        format!("tail: cannot open '{path}' for reading: No such file or directory"),
                    ),
                }
            }
            ("sh", ["-c", script, path, payload])
                if *script == WRITE_BASE64_SCRIPT || *script == APPEND_BASE64_SCRIPT =>
            {
                match BASE64.decode(payload) {
                    Ok(_) if !session.parent_exists(path) => ExecOutput::failed(
                        2,
                        format!("sh: 1: cannot create {path}: Directory nonexistent"),
                    ),
                    Ok(bytes) if *script == APPEND_BASE64_SCRIPT => {
                        session.files.entry(path.to_string()).or_default().extend(bytes);
                        ExecOutput::ok("")
                    }
                    Ok(bytes) => {
                        session.write(path, bytes);
                        ExecOutput::ok("")
                    }
                    Err(_) => ExecOutput::failed(1, "base64: invalid input"),
                }
            }
            ("sh", ["-c", script]) if *script == compute::INSTALL_SCRIPT => {
                if tooling == ToolingBehavior::Broken {
                    ExecOutput::failed(1, "install.sh: download failed")
                } else {
                    session.tooling_installed = true;
                    ExecOutput::ok("compute installed\n")
                }
            }
            ("find", [".", rest @ ..]) => {
                if !session.dirs.contains(cwd.trim_end_matches('/')) {
                    ExecOutput::failed(1, format!("find: '{cwd}': No such file or directory"))
                } else {
                    let pruned: Vec<String> = rest
                        .windows(3)
                        .filter(|w| w[0] == "-not" && w[1] == "-path")
                        .map(|w| w[2].trim_start_matches('*').trim_end_matches('*').to_string())
                        .collect();
                    let root = format!("{}/", cwd.trim_end_matches('/'));
                    let listing: String = session
                        .files
                        .keys()
                        .filter_map(|path| path.strip_prefix(&root))
                        .map(|rel| format!("./{rel}"))
                        .filter(|rel| !pruned.iter().any(|p| rel.contains(p.as_str())))
                        .map(|rel| format!("{rel}\n"))
                        .collect();
                    ExecOutput::ok(listing)
                }
            }
            ("npm", ["install", rest @ ..]) => {
                let manifest_path = shell::resolve_path(&cwd, "package.json");
                let packages: Vec<&str> = rest.iter().copied().filter(|a| !a.starts_with('-')).collect();
                match session.files.get(&manifest_path) {
                    None => ExecOutput::failed(254, "npm ERR! enoent Could not read package.json"),
                    Some(bytes) => {
                        let mut manifest: serde_json::Value =
                            serde_json::from_slice(bytes).unwrap_or_else(|_| serde_json::json!({}));
                        for package in &packages {
                            let name = match package.rfind('@') {
                                Some(idx) if idx > 0 => &package[..idx],
                                _ => package,
                            };
                            manifest["dependencies"][name] = serde_json::json!("^1.0.0");
                            let module = shell::resolve_path(&cwd, &format!("node_modules/{name}/index.js"));
                            session.add_dir(shell::parent_dir(&module).unwrap_or("/"));
                            session.write(&module, b"module.exports = {};\n".to_vec());
                        }
                        let rendered = serde_json::to_vec_pretty(&manifest).unwrap_or_default();
                        session.write(&manifest_path, rendered);
                        let lock = shell::resolve_path(&cwd, "node_modules/.package-lock.json");
                        session.add_dir(shell::parent_dir(&lock).unwrap_or("/"));
                        session.write(&lock, b"{}\n".to_vec());
                        ExecOutput::ok(format!("added {} packages\n", packages.len().max(1)))
                    }
                }
            }
            ("npm", ["run", "dev"]) => {
                session.dev_server_running = true;
                session.probes_since_start = 0;
                if let Some(log) = &cmd.detach_log {
                    let banner = "VITE ready\n  Local:   http://localhost:5173/\n";
                    session.write(log, banner.as_bytes().to_vec());
                }
                ExecOutput::ok("")
            }
            ("pkill", ["-f", _]) => {
                if session.dev_server_running {
                    session.dev_server_running = false;
                    ExecOutput::ok("")
                } else {
                    ExecOutput::failed(1, "")
                }
            }
            ("curl", [.., _url]) => {
                let ready = session.dev_server_running
                    && !broken
                    && session.probes_since_start >= boot_probes;
                if ready {
                    ExecOutput::ok("200")
                } else {
                    session.probes_since_start += 1;
                    ExecOutput {
                        stdout: "000".into(),
                        stderr: String::new(),
                        exit_code: 7,
                    }
                }
            }
            ("pwd", []) => ExecOutput::ok(format!("{cwd}\n")),
            ("echo", words) => ExecOutput::ok(format!("{}\n", words.join(" "))),
            ("compute", ["status"]) => {
                session.status_checks += 1;
                let ready = session.tooling_installed
                    || match tooling {
                        ToolingBehavior::Ready => true,
                        ToolingBehavior::ReadyAfter(n) => session.status_checks > n,
                        ToolingBehavior::NeedsInstall | ToolingBehavior::Broken => false,
                    };
                if ready {
                    ExecOutput::ok("compute ready\n")
                } else {
                    ExecOutput::failed(127, "sh: compute: not found")
                }
            }
            ("false", []) => ExecOutput::failed(1, ""),
            (program, _) => ExecOutput::failed(127, format!("sh: {program}: not found")),
        };
        Ok(out)
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn create_session(&self, _request: &SessionRequest) -> Result<RemoteSession> {
        let mut state = self.lock();
        if state.fail_create {
            return Err(RemoteError::Api {
                status: 503,
                body: "no capacity".into(),
            });
        }
        let id = format!("{}-{}", self.backend, Uuid::new_v4().simple());
        state.sessions.insert(id.clone(), MockSession::new(&self.home_dir));
        Ok(RemoteSession {
            id,
            home_dir: Some(self.home_dir.clone()),
        })
    }

    async fn connect_session(&self, session_id: &str) -> Result<RemoteSession> {
        let mut state = self.lock();
        if !state.sessions.contains_key(session_id) {
            if !state.connectable.contains(session_id) {
                return Err(RemoteError::SessionNotFound(session_id.to_string()));
            }
            state
                .sessions
                .insert(session_id.to_string(), MockSession::new(&self.home_dir));
        }
        Ok(RemoteSession {
            id: session_id.to_string(),
            home_dir: Some(self.home_dir.clone()),
        })
    }

    async fn destroy_session(&self, session_id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_destroy {
            return Err(RemoteError::Api {
                status: 500,
                body: "destroy failed".into(),
            });
        }
        if state.sessions.remove(session_id).is_some() {
            state.destroyed.push(session_id.to_string());
        }
        Ok(())
    }

    async fn exec(&self, session_id: &str, command: &CommandSpec) -> Result<ExecOutput> {
        let delay = self.lock().exec_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let line = command.to_shell_line()?;
        let mut state = self.lock();
        state
            .history
            .push((session_id.to_string(), command.clone()));
        if line.len() > MAX_ARG_BYTES {
            return Ok(ExecOutput::failed(126, "sh: Argument list too long"));
        }
        Self::run(&mut state, session_id, command)
    }

    async fn preview_host(&self, session_id: &str, port: u16) -> Result<String> {
        if !self.lock().sessions.contains_key(session_id) {
            return Err(RemoteError::SessionNotFound(session_id.to_string()));
        }
        Ok(format!("{port}-{session_id}.{}.mock", self.backend))
    }

    fn filesystem(&self) -> Option<&dyn RemoteFilesystem> {
        self.native_fs.then_some(self as &dyn RemoteFilesystem)
    }
}

#[async_trait]
impl RemoteFilesystem for MockRemote {
    async fn make_dir(&self, session_id: &str, path: &str) -> Result<()> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RemoteError::SessionNotFound(session_id.to_string()))?;
        if session.dirs.contains(path) {
            return Err(RemoteError::Api {
                status: 409,
                body: format!("{path} already exists"),
            });
        }
        if session.files.contains_key(path) {
            return Err(RemoteError::Api {
                status: 400,
                body: format!("{path} is a file"),
            });
        }
        session.add_dir(path);
        Ok(())
    }

    async fn write_file(&self, session_id: &str, path: &str, content: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RemoteError::SessionNotFound(session_id.to_string()))?;
        if !session.parent_exists(path) {
            return Err(RemoteError::Api {
                status: 404,
                body: format!("parent directory of {path} not found"),
            });
        }
        session.write(path, content.to_vec());
        Ok(())
    }

    async fn read_file(&self, session_id: &str, path: &str) -> Result<Vec<u8>> {
        let state = self.lock();
        let session = state
            .sessions
            .get(session_id)
            .ok_or_else(|| RemoteError::SessionNotFound(session_id.to_string()))?;
        session.files.get(path).cloned().ok_or_else(|| RemoteError::Api {
            status: 404,
            body: format!("file not found: {path}"),
        })
    }
}
