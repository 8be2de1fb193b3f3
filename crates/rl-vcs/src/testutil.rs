//! Scratch git repositories for tests, driven through the real `git` binary.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub struct GitTestRepo {
    dir: TempDir,
}

impl GitTestRepo {
    /// Initializes an empty repository whose unborn branch is `main`.
    pub fn new() -> io::Result<Self> {
        let dir = TempDir::new()?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        Ok(repo)
    }

    /// Makes a bare clone of this repository, suitable as an `origin` remote.
    pub fn bare_clone(&self) -> io::Result<TempDir> {
        let bare = TempDir::new()?;
        self.git(&["clone", "--quiet", "--bare", ".", &bare.path().to_string_lossy()])?;
        Ok(bare)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn remove_file(&self, rel: &str) -> io::Result<()> {
        std::fs::remove_file(self.dir.path().join(rel))
    }

    /// Stages everything and commits, returning the new HEAD sha.
    pub fn commit(&self, message: &str) -> io::Result<String> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "--allow-empty", "--no-gpg-sign", "-m", message])?;
        self.head()
    }

    pub fn head(&self) -> io::Result<String> {
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn git(&self, args: &[&str]) -> io::Result<String> {
        run(self.dir.path(), args)
    }
}

fn run(dir: &Path, args: &[&str]) -> io::Result<String> {
    let output = Command::new("git")
        .args(["-c", "user.name=Redline Test", "-c", "user.email=test@redline.invalid"])
        .args(["-c", "init.defaultBranch=main", "-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()?;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
