/*
 *   Copyright (c) 2026 The Fray Authors
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! Node control (spec §1: "opaque to the core; invoked at boundaries"). The
//! core only needs the shape of this capability to let the partition/kill
//! nemeses and the DB lifecycle glue compile against something concrete; the
//! one shipped implementation, [`LocalShellRemote`], runs commands on the
//! local machine and exists for demos and the harness's own tests, grounded
//! in `script/src/command_runner.rs`'s `Command` + `Stdio::piped()` pattern.

use std::path::Path;

use async_trait::async_trait;
use tokio::io;
use tokio::process::Command;

/// The captured result of [`Remote::exec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Shell/SSH capability a `Db` or nemesis uses to act on a node. Opaque to
/// the core (spec §1); this trait only fixes the boundary signature.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn exec(&self, node: &str, cmd: &str) -> io::Result<RemoteOutput>;
    async fn upload(&self, node: &str, local: &Path, remote_path: &str) -> io::Result<()>;
    async fn download(&self, node: &str, remote_path: &str, local: &Path) -> io::Result<()>;
}

/// Runs every command on the local machine regardless of `node`, via
/// `tokio::process::Command`. Useful for single-box demos and for the
/// harness's own integration tests; not a real SSH client.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalShellRemote;

#[async_trait]
impl Remote for LocalShellRemote {
    async fn exec(&self, _node: &str, cmd: &str) -> io::Result<RemoteOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output()
            .await?;
        Ok(RemoteOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn upload(&self, _node: &str, local: &Path, remote_path: &str) -> io::Result<()> {
        tokio::fs::copy(local, remote_path).await?;
        Ok(())
    }

    async fn download(&self, _node: &str, remote_path: &str, local: &Path) -> io::Result<()> {
        tokio::fs::copy(remote_path, local).await?;
        Ok(())
    }
}
