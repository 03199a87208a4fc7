//! Path resolution and shell fallbacks for backends without a file API.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sandcastle_remote::CommandSpec;

/// Directories never reported by `list_files`.
pub const EXCLUDED_DIRS: [&str; 5] = ["node_modules", ".git", ".next", "dist", "build"];

/// Script for the first chunk of [`write_base64`]: `$0` is the target
/// path, `$1` the base64 payload.
pub(crate) const WRITE_BASE64_SCRIPT: &str = "printf '%s' \"$1\" | base64 -d > \"$0\"";

/// Script for every further chunk; appends instead of truncating.
pub(crate) const APPEND_BASE64_SCRIPT: &str = "printf '%s' \"$1\" | base64 -d >> \"$0\"";

/// Raw bytes per write chunk. Encoded, a chunk is 64 KiB, half the
/// kernel's 128 KiB limit on a single argument.
pub(crate) const WRITE_CHUNK_BYTES: usize = 48 * 1024;

/// Resolve `path` against `workdir`. Absolute paths pass through.
pub fn resolve_path(workdir: &str, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }
    let relative = path.trim_start_matches("./");
    if relative.is_empty() || relative == "." {
        return workdir.to_string();
    }
    format!("{}/{}", workdir.trim_end_matches('/'), relative)
}

/// Parent directory of an absolute path, if it has one.
pub fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}

/// Path of `path` relative to `workdir`, when it lies inside it.
pub fn relative_to<'a>(workdir: &str, path: &'a str) -> Option<&'a str> {
    let root = workdir.trim_end_matches('/');
    path.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}

/// True when a directory component of `path` is an excluded directory.
/// The file name itself is never matched.
pub fn is_excluded(path: &str) -> bool {
    path.rsplit_once('/')
        .is_some_and(|(dirs, _)| dirs.split('/').any(|part| EXCLUDED_DIRS.contains(&part)))
}

/// `mkdir -p <dir>`
pub fn mkdir_p(dir: &str) -> CommandSpec {
    CommandSpec::new("mkdir").arg("-p").arg(dir)
}

/// `cat <path>`
pub fn cat(path: &str) -> CommandSpec {
    CommandSpec::new("cat").arg(path)
}

/// Commands writing `content` to `path` by decoding base64 remotely.
///
/// The payload and the path are positional arguments of a fixed script, so
/// no byte of the content is ever interpreted by the shell. Content is sent
/// in chunks of [`WRITE_CHUNK_BYTES`]: the first command truncates, the rest
/// append. Empty content still yields one command.
pub fn write_base64(path: &str, content: &[u8]) -> Vec<CommandSpec> {
    let mut chunks = content.chunks(WRITE_CHUNK_BYTES);
    let first = chunks.next().unwrap_or_default();
    std::iter::once(base64_chunk(WRITE_BASE64_SCRIPT, path, first))
        .chain(chunks.map(|chunk| base64_chunk(APPEND_BASE64_SCRIPT, path, chunk)))
        .collect()
}

fn base64_chunk(script: &str, path: &str, chunk: &[u8]) -> CommandSpec {
    CommandSpec::new("sh")
        .arg("-c")
        .arg(script)
        .arg(path)
        .arg(BASE64.encode(chunk))
}

/// Recursive listing of regular files under `dir`, pruning excluded dirs.
pub fn find_files(dir: &str) -> CommandSpec {
    let mut cmd = CommandSpec::new("find").arg(".");
    for excluded in EXCLUDED_DIRS {
        cmd = cmd.args(["-not", "-path"]).arg(format!("*/{excluded}/*"));
    }
    cmd.args(["-type", "f"]).cwd(dir)
}

/// Parse `find` output into sorted relative paths, dropping excluded ones.
pub fn parse_file_listing(stdout: &str) -> Vec<String> {
    let mut files: Vec<String> = stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("./").to_string())
        .filter(|line| !line.is_empty() && line != "." && !is_excluded(line))
        .collect();
    files.sort();
    files.dedup();
    files
}
