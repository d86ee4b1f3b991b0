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

//! Persists a finished run to disk (SPEC_FULL.md, "Supplemented features",
//! #3): one timestamped directory per run, holding `history.txt` (the
//! teacher-style human-readable line format), `history.json` (machine
//! readable), and a `latest` symlink kept pointed at the newest run — the
//! layout Jepsen-family harnesses use so a human can `tail -f` the newest
//! run without knowing its name in advance.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::history::History;

/// Writes run directories under `root`, named `<workload>/<timestamp>`.
pub struct HistoryWriter {
    root: PathBuf,
}

impl HistoryWriter {
    pub fn new(root: impl Into<PathBuf>) -> HistoryWriter {
        HistoryWriter { root: root.into() }
    }

    /// Writes `history.txt` and `history.json` into a fresh `<workload>/<ts>`
    /// directory under the writer's root, then repoints `<workload>/latest`
    /// at it. Returns the run directory's path.
    pub fn write(&self, workload: &str, history: &History) -> io::Result<PathBuf> {
        let workload_dir = self.root.join(workload);
        std::fs::create_dir_all(&workload_dir)?;

        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let run_dir = workload_dir.join(&timestamp);
        std::fs::create_dir_all(&run_dir)?;

        std::fs::write(run_dir.join("history.txt"), history.to_text())?;
        let json = serde_json::to_string_pretty(history.as_slice())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(run_dir.join("history.json"), json)?;

        self.relink_latest(&workload_dir, &timestamp)?;
        Ok(run_dir)
    }

    #[cfg(unix)]
    fn relink_latest(&self, workload_dir: &Path, timestamp: &str) -> io::Result<()> {
        let latest = workload_dir.join("latest");
        let _ = std::fs::remove_file(&latest);
        std::os::unix::fs::symlink(timestamp, latest)
    }

    #[cfg(not(unix))]
    fn relink_latest(&self, workload_dir: &Path, timestamp: &str) -> io::Result<()> {
        std::fs::write(workload_dir.join("latest"), timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{f, Op, OpType, Process};
    use std::time::Duration;

    #[test]
    fn writes_history_files_and_points_latest_at_the_newest_run() {
        let dir = std::env::temp_dir().join(format!("fray-history-writer-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let writer = HistoryWriter::new(&dir);

        let mut history = History::new();
        let inv = history.record(
            Op::invoke(Process::Client(0), f("read"), serde_json::Value::Null),
            Duration::from_nanos(1),
        );
        history.record(inv.complete(OpType::Ok, serde_json::json!(1)), Duration::from_nanos(2));

        let run_dir = writer.write("register", &history).unwrap();
        assert!(run_dir.join("history.txt").exists());
        assert!(run_dir.join("history.json").exists());

        let latest = dir.join("register").join("latest");
        assert!(latest.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
