use crate::backend::{Diff, HEAD, VcsBackend, VcsError, VcsResult};
use crate::detection::discover_root;
use crate::parse::parse_unified_diff;
use crate::paths::resolve_within;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

const REMOTE: &str = "origin";
const DIFF_ARGS: [&str; 6] = [
    "diff",
    "--no-color",
    "--no-ext-diff",
    "--src-prefix=a/",
    "--dst-prefix=b/",
    "-M",
];

/// Diff service backed by the `git` binary.
pub struct GitBackend {
    root: PathBuf,
}

impl GitBackend {
    /// Opens the repository containing `path`. Fails if there is none.
    pub fn open(path: &Path) -> VcsResult<Self> {
        Ok(Self {
            root: discover_root(path)?,
        })
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(&self.root)
            .args(["-c", "core.quotepath=false"])
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null());
        command
    }

    fn output(&self, args: &[&str]) -> VcsResult<Output> {
        let output = self
            .command(args)
            .output()
            .map_err(|err| VcsError::Spawn {
                command: describe(args),
                message: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: describe(args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> VcsResult<String> {
        let output = self.output(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_ok(&self, args: &[&str]) -> Option<String> {
        match self.run(args) {
            Ok(value) if !value.is_empty() => Some(value),
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "git query returned nothing");
                None
            }
        }
    }

    fn run_diff(&self, extra: &[&str]) -> VcsResult<String> {
        let mut args: Vec<&str> = DIFF_ARGS.to_vec();
        args.extend_from_slice(extra);
        let output = self.output(&args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Runs a command that may hang (network), killing it at the deadline.
    fn run_with_timeout(&self, args: &[&str], timeout: Duration) -> VcsResult<()> {
        let mut child = self
            .command(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| VcsError::Spawn {
                command: describe(args),
                message: err.to_string(),
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            let status = child.try_wait().map_err(|err| VcsError::Spawn {
                command: describe(args),
                message: err.to_string(),
            })?;
            if let Some(status) = status {
                if status.success() {
                    return Ok(());
                }
                return Err(VcsError::CommandFailed {
                    command: describe(args),
                    stderr: format!("exit status {status}"),
                });
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VcsError::Timeout {
                    command: describe(args),
                });
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl VcsBackend for GitBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn default_branch(&self) -> Option<String> {
        let symbolic = format!("refs/remotes/{REMOTE}/HEAD");
        if let Some(target) = self.run_ok(&["symbolic-ref", "--quiet", "--short", &symbolic]) {
            let prefix = format!("{REMOTE}/");
            if let Some(name) = target.strip_prefix(&prefix) {
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }

        ["main", "master"].into_iter().find_map(|candidate| {
            let full = format!("refs/remotes/{REMOTE}/{candidate}");
            self.run_ok(&["rev-parse", "--verify", "--quiet", &full])
                .map(|_| candidate.to_string())
        })
    }

    fn merge_base(&self, fetch_timeout: Duration) -> Option<String> {
        if let Err(err) = self.run_with_timeout(&["fetch", "--quiet", REMOTE], fetch_timeout) {
            debug!(error = %err, "fetch before merge-base skipped");
        }
        let branch = self.default_branch()?;
        let upstream = format!("{REMOTE}/{branch}");
        let base = self.run_ok(&["merge-base", &upstream, HEAD])?;
        let head = self.run_ok(&["rev-parse", HEAD])?;
        if base == head {
            return None;
        }
        Some(base)
    }

    fn current_branch(&self) -> VcsResult<String> {
        match self.run(&["rev-parse", "--abbrev-ref", HEAD]) {
            Ok(branch) => Ok(branch),
            // Unborn branch: no commit for rev-parse to name yet.
            Err(err) => self
                .run(&["symbolic-ref", "--quiet", "--short", HEAD])
                .map_err(|_| err),
        }
    }

    fn diff(&self, base_ref: &str) -> VcsResult<Diff> {
        if base_ref.is_empty() || base_ref.starts_with('-') {
            return Err(VcsError::CommandFailed {
                command: "git diff".to_string(),
                stderr: format!("invalid ref: {base_ref}"),
            });
        }

        let unified = if base_ref == HEAD {
            // `git diff HEAD` fails outright when there are no commits yet.
            let tracked = self.run_diff(&[HEAD, "--"]).unwrap_or_default();
            if tracked.trim().is_empty() {
                let mut combined = self.run_diff(&["--cached", "--"])?;
                combined.push_str(&self.run_diff(&["--"])?);
                combined
            } else {
                tracked
            }
        } else {
            self.run_diff(&[base_ref, "--"])?
        };

        Ok(parse_unified_diff(base_ref, &unified))
    }

    fn file_content(&self, path: &str) -> VcsResult<String> {
        let contained = resolve_within(&self.root, path)?;
        match std::fs::read(&contained.absolute) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let spec = format!("{HEAD}:{}", contained.relative);
                let output = self
                    .output(&["show", &spec])
                    .map_err(|_| VcsError::FileNotFound {
                        path: path.to_string(),
                    })?;
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Err(err) => Err(VcsError::Io {
                path: path.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

fn describe(args: &[&str]) -> String {
    let mut parts = vec!["git"];
    parts.extend(args.iter().take(2));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DiffChangeKind;
    use crate::testutil::GitTestRepo;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn backend(repo: &GitTestRepo) -> GitBackend {
        GitBackend::open(repo.path()).unwrap()
    }

    #[test]
    fn test_open_outside_repo_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            GitBackend::open(dir.path()),
            Err(VcsError::RepoNotFound)
        ));
    }

    #[test]
    fn test_current_branch_unborn() {
        let repo = GitTestRepo::new().unwrap();
        assert_eq!(backend(&repo).current_branch().unwrap(), "main");
    }

    #[test]
    fn test_current_branch_after_checkout() {
        let repo = GitTestRepo::new().unwrap();
        repo.commit("initial").unwrap();
        repo.git(&["checkout", "--quiet", "-b", "feature/login"]).unwrap();
        assert_eq!(backend(&repo).current_branch().unwrap(), "feature/login");
    }

    #[test]
    fn test_current_branch_detached() {
        let repo = GitTestRepo::new().unwrap();
        let sha = repo.commit("initial").unwrap();
        repo.git(&["checkout", "--quiet", "--detach", &sha]).unwrap();
        assert_eq!(backend(&repo).current_branch().unwrap(), HEAD);
    }

    #[test]
    fn test_no_remote_has_no_default_branch_or_merge_base() {
        let repo = GitTestRepo::new().unwrap();
        repo.commit("initial").unwrap();
        let backend = backend(&repo);
        assert_eq!(backend.default_branch(), None);
        assert_eq!(backend.merge_base(TIMEOUT), None);
    }

    #[test]
    fn test_default_branch_and_merge_base_with_remote() {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("README.md", "hello\n").unwrap();
        let fork_point = repo.commit("initial").unwrap();
        let bare = repo.bare_clone().unwrap();
        repo.git(&["remote", "add", "origin", &bare.path().to_string_lossy()])
            .unwrap();
        repo.git(&["fetch", "--quiet", "origin"]).unwrap();

        let backend = backend(&repo);
        assert_eq!(backend.default_branch().as_deref(), Some("main"));
        // On the default branch itself there is nothing to diff against.
        assert_eq!(backend.merge_base(TIMEOUT), None);

        repo.git(&["checkout", "--quiet", "-b", "feature"]).unwrap();
        repo.write_file("feature.txt", "work\n").unwrap();
        repo.commit("feature work").unwrap();
        assert_eq!(backend.merge_base(TIMEOUT), Some(fork_point));
    }

    #[test]
    fn test_default_branch_falls_back_to_origin_master() {
        let repo = GitTestRepo::new().unwrap();
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/master"]).unwrap();
        repo.write_file("README.md", "hello\n").unwrap();
        repo.commit("initial").unwrap();
        let bare = repo.bare_clone().unwrap();
        repo.git(&["remote", "add", "origin", &bare.path().to_string_lossy()])
            .unwrap();
        repo.git(&["fetch", "--quiet", "origin"]).unwrap();
        // Fetching never creates origin/HEAD; make sure nothing else did either.
        let _ = repo.git(&["remote", "set-head", "origin", "--delete"]);

        assert_eq!(backend(&repo).default_branch().as_deref(), Some("master"));
    }

    #[test]
    fn test_fetch_timeout_kills_slow_command() {
        let repo = GitTestRepo::new().unwrap();
        let backend = backend(&repo);
        let err = backend
            .run_with_timeout(&["fetch", "--quiet", "origin"], Duration::ZERO)
            .unwrap_err();
        assert!(matches!(
            err,
            VcsError::Timeout { .. } | VcsError::CommandFailed { .. }
        ));
    }

    #[test]
    fn test_diff_head_with_working_tree_changes() {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("src/lib.rs", "fn a() {}\nfn b() {}\n").unwrap();
        repo.commit("initial").unwrap();
        repo.write_file("src/lib.rs", "fn a() {}\nfn c() {}\n").unwrap();

        let diff = backend(&repo).diff(HEAD).unwrap();
        assert_eq!(diff.base_ref, HEAD);
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.files[0].path, "src/lib.rs");
        assert_eq!(diff.total_additions, 1);
        assert_eq!(diff.total_deletions, 1);
        let add = diff.files[0].hunks[0]
            .changes
            .iter()
            .find(|change| change.kind == DiffChangeKind::Add)
            .unwrap();
        assert_eq!(add.new_line, Some(2));
    }

    #[test]
    fn test_diff_head_clean_tree_is_empty() {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("a.txt", "a\n").unwrap();
        repo.commit("initial").unwrap();
        let diff = backend(&repo).diff(HEAD).unwrap();
        assert!(diff.files.is_empty());
    }

    #[test]
    fn test_diff_head_without_commits_uses_staged_changes() {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("first.txt", "one\n").unwrap();
        repo.git(&["add", "first.txt"]).unwrap();

        let diff = backend(&repo).diff(HEAD).unwrap();
        assert_eq!(diff.files.len(), 1);
        assert!(diff.files[0].is_new);
        assert_eq!(diff.files[0].path, "first.txt");
    }

    #[test]
    fn test_diff_against_commit_includes_committed_and_deleted_files() {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("keep.txt", "keep\n").unwrap();
        repo.write_file("drop.txt", "drop\n").unwrap();
        let base = repo.commit("initial").unwrap();
        repo.remove_file("drop.txt").unwrap();
        repo.write_file("new.txt", "new\n").unwrap();
        repo.commit("second").unwrap();

        let diff = backend(&repo).diff(&base).unwrap();
        let deleted = diff.files.iter().find(|f| f.path == "drop.txt").unwrap();
        assert!(deleted.is_deleted);
        let added = diff.files.iter().find(|f| f.path == "new.txt").unwrap();
        assert!(added.is_new);
    }

    #[test]
    fn test_diff_detects_rename() {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("old.txt", "same content\nacross lines\n").unwrap();
        let base = repo.commit("initial").unwrap();
        repo.git(&["mv", "old.txt", "new.txt"]).unwrap();
        repo.commit("rename").unwrap();

        let diff = backend(&repo).diff(&base).unwrap();
        assert_eq!(diff.files.len(), 1);
        assert!(diff.files[0].is_renamed);
        assert_eq!(diff.files[0].from, "old.txt");
        assert_eq!(diff.files[0].to, "new.txt");
    }

    #[test]
    fn test_diff_rejects_option_like_ref() {
        let repo = GitTestRepo::new().unwrap();
        repo.commit("initial").unwrap();
        assert!(backend(&repo).diff("--output=/tmp/x").is_err());
    }

    #[test]
    fn test_diff_paths_needing_quotes() {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("say\"hi\".txt", "one\n").unwrap();
        repo.write_file("tab\tname.txt", "one\n").unwrap();
        repo.commit("initial").unwrap();
        repo.write_file("say\"hi\".txt", "two\n").unwrap();
        repo.write_file("tab\tname.txt", "two\n").unwrap();

        let backend = backend(&repo);
        let diff = backend.diff(HEAD).unwrap();
        let mut paths: Vec<_> = diff.files.iter().map(|file| file.path.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["say\"hi\".txt", "tab\tname.txt"]);
        for path in &paths {
            assert_eq!(backend.file_content(path).unwrap(), "two\n");
        }
    }

    #[test]
    fn test_file_content_from_working_tree() {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("src/main.rs", "fn main() {}\n").unwrap();
        let content = backend(&repo).file_content("src/main.rs").unwrap();
        assert_eq!(content, "fn main() {}\n");
    }

    #[test]
    fn test_file_content_falls_back_to_head() {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("gone.txt", "committed\n").unwrap();
        repo.commit("initial").unwrap();
        repo.remove_file("gone.txt").unwrap();

        let content = backend(&repo).file_content("gone.txt").unwrap();
        assert_eq!(content, "committed\n");
    }

    #[test]
    fn test_file_content_missing_everywhere() {
        let repo = GitTestRepo::new().unwrap();
        repo.commit("initial").unwrap();
        let err = backend(&repo).file_content("nope.txt").unwrap_err();
        assert!(matches!(err, VcsError::FileNotFound { .. }));
    }

    #[test]
    fn test_file_content_rejects_traversal() {
        let repo = GitTestRepo::new().unwrap();
        repo.commit("initial").unwrap();
        let backend = backend(&repo);
        for path in ["../../../etc/passwd", "/etc/passwd"] {
            let err = backend.file_content(path).unwrap_err();
            assert!(
                matches!(err, VcsError::PathTraversal { .. }),
                "{path} should be rejected, got {err:?}"
            );
        }
    }
}
