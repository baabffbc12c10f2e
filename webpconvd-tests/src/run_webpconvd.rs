// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::{
    process::{Child, Command, ExitStatus},
    thread,
    time::{Duration, Instant},
};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// A webpconvd process started via `cargo run`. Terminated with SIGTERM when dropped.
pub struct WebpconvdProcess {
    child: Option<Child>,
    port: u16,
}

impl WebpconvdProcess {
    pub fn start(port: u16, envs: &[(&str, &str)]) -> Self {
        println!("Executing webpconvd located via cargo run");
        let child = Command::new("cargo")
            .args(["run", "-p", "webpconvd", "--"])
            .env("PORT", port.to_string())
            .envs(envs.iter().copied())
            .spawn()
            .expect("failed to start webpconvd");

        Self {
            child: Some(child),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Polls `/health` until the server answers. Includes the time cargo needs to build.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let client = reqwest::blocking::Client::new();
        let url = format!("{}/health", self.base_url());
        let started = Instant::now();
        while started.elapsed() < timeout {
            if let Ok(response) = client.get(&url).send() {
                if response.status().is_success() {
                    return true;
                }
            }
            thread::sleep(Duration::from_millis(200));
        }
        false
    }

    /// Sends SIGTERM and waits up to `timeout` for the process to exit on its own.
    pub fn terminate(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        let pid = Pid::from_raw(child.id() as i32);
        let _ = signal::kill(pid, Signal::SIGTERM);

        let started = Instant::now();
        while started.elapsed() < timeout {
            if let Ok(Some(status)) = child.try_wait() {
                self.child = None;
                return Some(status);
            }
            thread::sleep(Duration::from_millis(100));
        }
        None
    }
}

impl Drop for WebpconvdProcess {
    fn drop(&mut self) {
        if self.terminate(Duration::from_secs(1)).is_some() {
            return;
        }
        // Still alive, so SIGKILL
        if let Some(mut child) = self.child.take() {
            let pid = Pid::from_raw(child.id() as i32);
            let _ = signal::kill(pid, Signal::SIGKILL);
            let _ = child.wait();
        }
    }
}
