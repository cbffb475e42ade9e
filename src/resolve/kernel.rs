//! Persistent python interpreter for `<exec lang="python">` blocks.
//!
//! A small driver script runs inside `python3 -u -c`. It reads one JSON
//! request per line from stdin, executes the code in a shared namespace and
//! answers one JSON line `{"output": ..., "error": ...}`. Every request
//! carries the directory to run in, so one interpreter serves all documents
//! of a run and variables and imports carry over between them.

use super::{CodeExecutor, Execution};
use crate::{debug, exec_piped, utils::exec::RunningProcess};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::{
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::Duration,
};

const DRIVER: &str = r#"
import ast, contextlib, io, json, os, sys, traceback

namespace = {"__name__": "__main__"}
for line in sys.stdin:
    request = json.loads(line)
    buffer = io.StringIO()
    error = None
    try:
        if request.get("cwd"):
            os.chdir(request["cwd"])
        with contextlib.redirect_stdout(buffer), contextlib.redirect_stderr(buffer):
            tree = ast.parse(request["code"], "<exec>", "exec")
            last = None
            if tree.body and isinstance(tree.body[-1], ast.Expr):
                last = ast.Expression(tree.body.pop().value)
            exec(compile(tree, "<exec>", "exec"), namespace)
            if last is not None:
                value = eval(compile(last, "<exec>", "eval"), namespace)
                if value is not None:
                    print(repr(value))
    except BaseException:
        error = traceback.format_exc(limit=-1).rstrip()
    sys.__stdout__.write(json.dumps({"output": buffer.getvalue(), "error": error}) + "\n")
    sys.__stdout__.flush()
"#;

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    output: String,
    #[serde(default)]
    error: Option<String>,
}

/// A live interpreter and the channel its stdout lines arrive on.
struct Session {
    process: RunningProcess,
    lines: Receiver<String>,
}

impl Session {
    fn start(command: &[String], cwd: &Path) -> Result<Self> {
        let mut process = exec_piped!(cwd; command; "-u", "-c", DRIVER)?;
        let stdout = process.take_stdout().context("kernel stdout unavailable")?;

        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Self { process, lines })
    }

    fn send(&mut self, code: &str, cwd: &Path) -> Result<()> {
        let request = json!({ "code": code, "cwd": cwd.to_string_lossy() }).to_string();
        let stdin = self.process.stdin().context("kernel stdin closed")?;
        writeln!(stdin, "{request}")?;
        stdin.flush()?;
        Ok(())
    }
}

pub struct PythonKernel {
    command: Vec<String>,
    timeout: Duration,
    cwd: PathBuf,
    session: Option<Session>,
}

impl PythonKernel {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            cwd: PathBuf::from("."),
            session: None,
        }
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!("exec"; "stopping {}", session.process.name());
            session.process.kill();
        }
    }

    fn session(&mut self) -> Result<&mut Session> {
        if self.session.is_none() {
            debug!("exec"; "starting kernel in {}", self.cwd.display());
            self.session = Some(Session::start(&self.command, &self.cwd)?);
        }
        self.session.as_mut().context("kernel not started")
    }

    fn run(&mut self, code: &str) -> Result<Execution, String> {
        let timeout = self.timeout;
        let cwd = self.cwd.clone();
        let session = self.session().map_err(|e| format!("{e:#}"))?;
        session
            .send(code, &cwd)
            .map_err(|e| format!("kernel unavailable: {e:#}"))?;

        match session.lines.recv_timeout(timeout) {
            Ok(line) => {
                let reply: Reply = serde_json::from_str(&line)
                    .map_err(|e| format!("malformed kernel reply: {e}"))?;
                Ok(Execution {
                    output: reply.output.trim_end().to_owned(),
                    error: reply.error,
                })
            }
            Err(RecvTimeoutError::Timeout) => Err(format!(
                "execution timed out after {}s",
                timeout.as_secs_f64()
            )),
            Err(RecvTimeoutError::Disconnected) => Err("kernel exited unexpectedly".into()),
        }
    }
}

impl CodeExecutor for PythonKernel {
    fn set_working_dir(&mut self, dir: &Path) {
        // Absolute, since the driver resolves it against its current directory
        self.cwd = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
    }

    fn execute(&mut self, code: &str) -> Execution {
        match self.run(code) {
            Ok(execution) => execution,
            Err(message) => {
                // The interpreter state is unknown now; start over next time
                self.shutdown();
                Execution::failed(message)
            }
        }
    }
}

impl Drop for PythonKernel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
