//! Build command implementation

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use crossterm::tty::IsTty;
use pb_core::config::Overrides;
use pb_core::logfile::verify_writable;
use pb_core::{
    BuildOptions, BuildRequest, Configuration, HostTag, HostTarget, LogNaming, ProjectKind,
};
use pb_orchestrator::check::{marker_is_current, marker_path};
use pb_orchestrator::{
    BuildContext, LaunchPolicy, Orchestrator, OutputMode, RemoteExecutor, RunPolicy, SshTransport,
    StatusSink,
};
use tracing::info;

use crate::output::dashboard::{self, Dashboard};
use crate::output::plain::PlainRenderer;
use crate::output::{format_summary, format_totals, print_info, print_warning};

/// File receiving diagnostics while the dashboard owns the terminal
pub const TRACE_FILE: &str = "pbuild-trace.log";

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Hosts to build, by tag or address (default: every selected host)
    pub hosts: Vec<String>,

    /// Abort every running build after the first failure
    #[arg(long)]
    pub abort_on_error: bool,

    /// Branch to check out
    #[arg(long)]
    pub branch: Option<String>,

    /// Subproject branches, as dir:branch[,dir:branch]
    #[arg(long, value_name = "DIR:BRANCH")]
    pub subproject: Option<String>,

    /// Only use hosts configured under this selector
    #[arg(long)]
    pub select: Option<String>,

    /// Delete and re-clone the remote repository
    #[arg(long = "clone")]
    pub force_clone: bool,

    /// Run this shell command on every host instead of building
    #[arg(long)]
    pub command: Option<String>,

    /// Qualifiers passed to configure instead of the project defaults
    #[arg(long, allow_hyphen_values = true)]
    pub configure: Option<String>,

    /// Tarball shipped after the script instead of cloning from git
    #[arg(long, value_name = "TARBALL")]
    pub container: Option<PathBuf>,

    /// Debug build
    #[arg(long)]
    pub debug: bool,

    /// Release build
    #[arg(long)]
    pub nodebug: bool,

    /// Keep remote scripts for diagnosis
    #[arg(long)]
    pub diagnose: bool,

    /// Hosts to leave out (ignored when hosts are named explicitly)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Directory for host logs
    #[arg(long)]
    pub logdir: Option<String>,

    /// Directory receiving the previous run's logs
    #[arg(long)]
    pub logdir_prior: Option<String>,

    /// Keep build products on the host after a successful build
    #[arg(long)]
    pub nocleanup: bool,

    /// Plain line output instead of the progress display
    #[arg(long)]
    pub nocurses: bool,

    /// Settings, e.g. "LogfileRename,NoSummaryScreen"
    #[arg(long)]
    pub settings: Option<String>,

    /// Make targets ("" skips the make step)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Test attributes ("", "SLOW" or "-SLOW")
    #[arg(long, allow_hyphen_values = true)]
    pub attributes: Option<String>,

    /// Tests to run
    #[arg(long)]
    pub tests: Option<String>,
}

impl BuildArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            select: self.select.clone(),
            exclude: self.exclude.clone(),
            logdir: self.logdir.clone(),
            logdir_prior: self.logdir_prior.clone(),
            settings: self.settings.clone(),
            nocurses: self.nocurses,
            test_attributes: self.attributes.clone(),
            test_list: self.tests.clone(),
        }
    }

    fn request(&self) -> BuildRequest {
        BuildRequest {
            debug: self.debug,
            nodebug: self.nodebug,
            target: self.target.clone(),
            branch: self.branch.clone(),
            subprojects: self.subproject.clone(),
            abort_on_error: self.abort_on_error,
            no_cleanup: self.nocleanup,
            force_clone: self.force_clone,
            command: self.command.clone(),
            configure: self.configure.clone(),
            container: self.container.clone(),
            diagnose: self.diagnose,
        }
    }
}

/// A validated build, ready to run
pub struct BuildPlan {
    config: Configuration,
    hosts: Vec<HostTarget>,
    options: BuildOptions,
    logs: LogNaming,
    dashboard: bool,
    command_line: String,
}

impl BuildPlan {
    /// Load the configuration and validate every option.
    ///
    /// Nothing here touches a remote host.
    pub fn prepare(config_path: &Path, args: BuildArgs) -> Result<Self> {
        let config = Configuration::load(config_path, &args.overrides())
            .with_context(|| format!("Failed to load config from {:?}", config_path))?;
        let hosts = config.resolve_hosts(&args.hosts)?;
        let options = args.request().resolve(&config)?;

        let projects: BTreeSet<ProjectKind> = hosts.iter().map(|h| h.project).collect();
        for project in projects {
            options.check_subprojects(project.template())?;
        }

        let logs = LogNaming::from_config(&config);
        verify_writable(logs.dir())?;

        let dashboard = config.settings.progress && std::io::stdout().is_tty();
        if dashboard {
            dashboard::check_size(hosts.len())?;
        }

        let command_line = std::env::args().collect::<Vec<_>>().join(" ");
        Ok(Self {
            config,
            hosts,
            options,
            logs,
            dashboard,
            command_line,
        })
    }

    /// Where diagnostics go instead of stderr, if anywhere
    pub fn trace_file(&self) -> Option<PathBuf> {
        self.dashboard.then(|| self.logs.dir().join(TRACE_FILE))
    }

    pub fn hosts(&self) -> &[HostTarget] {
        &self.hosts
    }

    /// Run the build; returns the number of failed hosts
    pub async fn run(self) -> Result<i32> {
        let tags: Vec<HostTag> = self.hosts.iter().map(|h| h.tag.clone()).collect();
        let rotated = self
            .logs
            .rotate_to_prior(&tags)
            .context("Failed to move previous logs")?;
        if rotated > 0 {
            info!(rotated, "Moved previous logs to prior directory");
        }

        if let Some(marker) = marker_path() {
            if !marker_is_current(&marker, &self.config.path) {
                print_warning("Configuration changed since the last `pbuild check`; run it to verify host access");
            }
        }

        let transport = &self.config.transport;
        let executor = RemoteExecutor::new(
            Arc::new(SshTransport::from_config(transport)),
            LaunchPolicy::from(transport),
        );
        let policy = RunPolicy {
            abort_on_error: self.options.abort_on_error,
            ..RunPolicy::default()
        };
        let context = Arc::new(BuildContext {
            options: self.options,
            configure: self.config.configure.clone(),
            logs: self.logs,
            executor,
            output: if self.config.settings.progress {
                OutputMode::Streaming
            } else {
                OutputMode::Batch
            },
            script_dir: transport.script_dir.clone(),
            user: whoami::username(),
            command_line: self.command_line.clone(),
        });

        let mut sink: Box<dyn StatusSink> = if self.dashboard {
            Box::new(Dashboard::open(
                self.config.selector.as_deref(),
                &self.command_line,
            )?)
        } else {
            Box::new(PlainRenderer::new(std::io::stdout()))
        };

        let orchestrator = Orchestrator::new(self.hosts, context, policy);
        let report = tokio::select! {
            report = orchestrator.run(&mut *sink) => report,
            _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
        };
        drop(sink);

        if self.config.settings.summary_screen {
            println!("\nFinal status:");
            println!("{}", format_summary(&report));
        }
        if report.aborted {
            print_warning("Build aborted after the first failure");
        }
        print_info(&format_totals(&report.tally, report.elapsed));
        Ok(report.exit_code())
    }
}
