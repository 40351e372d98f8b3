//! Probe backed by an external command, e.g. `ping` inside a namespace.

use log::trace;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::oracle::Reachability;
use super::probe::{Probe, ProbeError, ProbeRequest};

/// Runs a command template per pair; exit status 0 means reachable.
///
/// Placeholders: `{source}`, `{target}`, `{source_ip}`, `{target_ip}` and
/// `{timeout}` (whole seconds, rounded up). The template is split on
/// whitespace before substitution, no shell is involved.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    template: String,
    poll_interval: Duration,
}

impl CommandProbe {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            poll_interval: Duration::from_millis(20),
        }
    }

    fn render(&self, request: &ProbeRequest<'_>) -> Vec<String> {
        let timeout_secs = request.timeout.as_millis().div_ceil(1000).max(1).to_string();
        self.template
            .split_whitespace()
            .map(|arg| {
                arg.replace("{source}", request.source)
                    .replace("{target}", request.target)
                    .replace("{source_ip}", &request.source_ip.to_string())
                    .replace("{target_ip}", &request.target_ip.to_string())
                    .replace("{timeout}", &timeout_secs)
            })
            .collect()
    }
}

impl Probe for CommandProbe {
    fn probe(&self, request: &ProbeRequest<'_>) -> Result<Reachability, ProbeError> {
        let args = self.render(request);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| ProbeError::Failed("empty probe command".to_string()))?;
        trace!("Probe {} -> {}: {}", request.source, request.target, args.join(" "));

        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ProbeError::Failed(format!("failed to spawn '{}': {}", program, e)))?;

        let deadline = Instant::now() + request.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(Reachability::Reachable),
                Ok(Some(_)) => return Ok(Reachability::Unreachable),
                Ok(None) => {}
                Err(e) => return Err(ProbeError::Failed(format!("failed to wait on '{}': {}", program, e))),
            }

            let stop = if request.cancel.is_cancelled() {
                Some(ProbeError::Cancelled)
            } else if Instant::now() >= deadline {
                Some(ProbeError::TimedOut)
            } else {
                None
            };
            if let Some(error) = stop {
                let _ = child.kill();
                let _ = child.wait();
                return Err(error);
            }

            thread::sleep(self.poll_interval);
        }
    }
}
