//! Host network repair
//!
//! A fixed, OS-dependent list of shell commands that reset the engine and
//! local networking state. Every step runs regardless of earlier failures;
//! the outcome of each is reported rather than returned as an error.

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::manager::send_progress;

/// Host OS family, as far as network repair cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Unix,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }
}

/// One host command in the repair sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationStep {
    pub description: &'static str,
    pub program: &'static str,
    pub args: &'static [&'static str],
}

impl RemediationStep {
    /// `program args...` as a single line
    pub fn command_line(&self) -> String {
        std::iter::once(self.program)
            .chain(self.args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

const WINDOWS_STEPS: &[RemediationStep] = &[
    RemediationStep {
        description: "Restarting Docker Desktop...",
        program: "powershell",
        args: &["-Command", "Restart-Service docker"],
    },
    RemediationStep {
        description: "Flushing DNS cache...",
        program: "powershell",
        args: &["-Command", "Clear-DnsClientCache"],
    },
    RemediationStep {
        description: "Resetting Winsock...",
        program: "powershell",
        args: &["-Command", "netsh", "winsock", "reset"],
    },
];

const UNIX_STEPS: &[RemediationStep] = &[
    RemediationStep {
        description: "Restarting Docker service...",
        program: "sudo",
        args: &["systemctl", "restart", "docker"],
    },
    RemediationStep {
        description: "Flushing iptables...",
        program: "sudo",
        args: &["iptables", "-F"],
    },
];

/// Ordered repair commands for an OS family
pub fn remediation_steps(os: OsFamily) -> &'static [RemediationStep] {
    match os {
        OsFamily::Windows => WINDOWS_STEPS,
        OsFamily::Unix => UNIX_STEPS,
    }
}

/// Message printed after all steps have run
pub fn closing_note(os: OsFamily) -> &'static str {
    match os {
        OsFamily::Windows => {
            "Network fix completed. You may need to restart your computer for all changes to take effect."
        }
        OsFamily::Unix => "✓ Network fix completed!",
    }
}

/// Captured result of a finished host command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs programs on the host
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion. An `Err` means it could not
    /// be spawned at all.
    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<StepOutput>;
}

/// Runs commands with `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<StepOutput> {
        let output = Command::new(program).args(args).output().await?;
        Ok(StepOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub description: &'static str,
    pub success: bool,
    /// stderr on failure (stdout when stderr is empty), or the spawn error
    pub detail: Option<String>,
}

/// Run every step in order, reporting each. Never stops early.
pub async fn run_best_effort(
    runner: &dyn CommandRunner,
    steps: &[RemediationStep],
    progress: Option<&mpsc::UnboundedSender<String>>,
) -> Vec<StepReport> {
    let mut reports = Vec::with_capacity(steps.len());

    for step in steps {
        send_progress(progress, step.description);
        tracing::debug!("Running {}", step.command_line());

        let report = match runner.run(step.program, step.args).await {
            Ok(out) if out.success => {
                if !out.stdout.trim().is_empty() {
                    tracing::debug!("{}", out.stdout.trim_end());
                }
                StepReport {
                    description: step.description,
                    success: true,
                    detail: None,
                }
            }
            Ok(out) => {
                let detail = [out.stderr.trim(), out.stdout.trim()]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .map(str::to_string);
                StepReport {
                    description: step.description,
                    success: false,
                    detail,
                }
            }
            Err(e) => StepReport {
                description: step.description,
                success: false,
                detail: Some(format!("failed to run {}: {}", step.program, e)),
            },
        };

        if report.success {
            send_progress(progress, &format!("✓ Success: {}", step.description));
        } else {
            tracing::warn!("Step failed: {}", step.command_line());
            send_progress(progress, &format!("⚠ Failed: {}", step.description));
            if let Some(ref detail) = report.detail {
                send_progress(progress, detail);
            }
        }

        reports.push(report);
    }

    reports
}

/// Run the repair sequence for `os` and print the closing note
pub async fn fix_network(
    runner: &dyn CommandRunner,
    os: OsFamily,
    progress: Option<&mpsc::UnboundedSender<String>>,
) -> Vec<StepReport> {
    let label = match os {
        OsFamily::Windows => "Windows",
        OsFamily::Unix => "Linux",
    };
    send_progress(progress, &format!("Fixing Docker network on {}...", label));

    let reports = run_best_effort(runner, remediation_steps(os), progress).await;
    send_progress(progress, closing_note(os));
    reports
}
