//! CLI entry point and command handlers.

use crate::batch::{history_server_url, BatchHandle};
use crate::client::{HttpJobClient, JobClient};
use crate::config::{load_properties_file, Config};
use crate::job::{split_list, BatchKind, JobDescriptor, JobRequest};
use crate::monitor::{MonitorCommand, MonitorSession};
use crate::report::{ExitStatus, TerminalReport};
use crate::sink::OutputSink;
use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};

const RULE: &str = "==========================================";
const THIN_RULE: &str = "------------------------------------------";

/// Submit Spark batch jobs to a Kyuubi server and follow them to completion.
#[derive(Parser, Debug)]
#[command(name = "kyuubi-submit")]
#[command(version)]
#[command(about = "Submit Spark batch jobs to a Kyuubi server and follow them to completion")]
#[command(after_help = "Configuration keys (kyuubi.server.url, kyuubi.server.username, \
kyuubi.server.password, spark.history.server.url, kyuubi.client.timeout.secs) are read from \
-D options, then KYUUBI_SERVER_URL / KYUUBI_SERVER_USERNAME / KYUUBI_SERVER_PASSWORD / \
SPARK_HISTORY_SERVER_URL / KYUUBI_CLIENT_TIMEOUT_SECS, then ~/.spark-submit.conf.")]
pub struct Cli {
    /// Application's main class (required for JAR resources)
    #[arg(long = "class", short = 'c', value_name = "CLASS")]
    pub class_name: Option<String>,

    /// Name of the application
    #[arg(long)]
    pub name: Option<String>,

    /// Memory for the driver (e.g. 1g, 512m)
    #[arg(long, value_name = "MEM")]
    pub driver_memory: Option<String>,

    /// Driver cores
    #[arg(long, value_name = "CORES")]
    pub driver_cores: Option<String>,

    /// Extra class path entries for the driver
    #[arg(long, value_name = "PATH")]
    pub driver_class_path: Option<String>,

    /// Extra JVM options for the driver
    #[arg(long, value_name = "OPTS", allow_hyphen_values = true)]
    pub driver_java_options: Option<String>,

    /// Extra library path entries for the driver
    #[arg(long, value_name = "PATH")]
    pub driver_library_path: Option<String>,

    /// Memory per executor (e.g. 1g, 512m)
    #[arg(long, value_name = "MEM")]
    pub executor_memory: Option<String>,

    /// Cores per executor
    #[arg(long, value_name = "CORES")]
    pub executor_cores: Option<String>,

    /// Number of executors
    #[arg(long, value_name = "NUM")]
    pub num_executors: Option<String>,

    /// Total cores across all executors
    #[arg(long, value_name = "NUM")]
    pub total_executor_cores: Option<String>,

    /// Queue to submit to
    #[arg(long)]
    pub queue: Option<String>,

    /// User to run the job as (sets hive.server2.proxy.user)
    #[arg(long, value_name = "USER")]
    pub proxy_user: Option<String>,

    /// Deploy mode; only 'cluster' is supported, anything else is changed to it
    #[arg(long, value_name = "MODE")]
    pub deploy_mode: Option<String>,

    /// Comma-separated files to distribute
    #[arg(long, value_name = "LIST")]
    pub files: Vec<String>,

    /// Comma-separated extra JARs
    #[arg(long, value_name = "LIST")]
    pub jars: Vec<String>,

    /// Comma-separated archives
    #[arg(long, value_name = "LIST")]
    pub archives: Vec<String>,

    /// Comma-separated Python files (PySpark only)
    #[arg(long, value_name = "LIST")]
    pub py_files: Vec<String>,

    /// Comma-separated Maven coordinates
    #[arg(long, value_name = "LIST")]
    pub packages: Vec<String>,

    /// Comma-separated remote repositories for --packages
    #[arg(long, value_name = "LIST")]
    pub repositories: Vec<String>,

    /// Spark configuration property (repeatable)
    #[arg(long = "conf", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub conf: Vec<(String, String)>,

    /// File with extra Spark properties, overridden by --conf
    #[arg(long, value_name = "FILE")]
    pub properties_file: Option<PathBuf>,

    /// Query the status of a batch instead of submitting
    #[arg(long, value_name = "BATCH_ID", conflicts_with = "kill")]
    pub status: Option<String>,

    /// Kill a batch instead of submitting
    #[arg(long, value_name = "BATCH_ID")]
    pub kill: Option<String>,

    /// Client setting, highest precedence (repeatable)
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub defines: Vec<(String, String)>,

    /// Config file [default: ~/.spark-submit.conf]
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Print debug diagnostics to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Application JAR or Python file
    pub resource: Option<String>,

    /// Arguments passed to the application
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub app_args: Vec<String>,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("invalid KEY=VALUE: `{}`", s)),
    }
}

impl Cli {
    /// Collect the submission flags into a job request.
    pub fn to_job_request(&self) -> Result<JobRequest> {
        let mut request = JobRequest {
            resource: self.resource.clone(),
            class_name: self.class_name.clone(),
            name: self.name.clone(),
            proxy_user: self.proxy_user.clone(),
            queue: self.queue.clone(),
            deploy_mode: self.deploy_mode.clone(),
            args: self.app_args.clone(),
            files: flatten_lists(&self.files),
            jars: flatten_lists(&self.jars),
            archives: flatten_lists(&self.archives),
            py_files: flatten_lists(&self.py_files),
            packages: flatten_lists(&self.packages),
            repositories: flatten_lists(&self.repositories),
            ..Default::default()
        };

        if let Some(path) = &self.properties_file {
            request.conf_defaults = load_properties_file(path)?
                .with_context(|| format!("Properties file not found: {}", path.display()))?;
        }

        for (key, value) in &self.conf {
            request.set_conf(key, value);
        }

        // Dedicated flags win over --conf for the same key.
        let sized = [
            ("spark.driver.memory", &self.driver_memory),
            ("spark.driver.cores", &self.driver_cores),
            ("spark.driver.extraClassPath", &self.driver_class_path),
            ("spark.driver.extraJavaOptions", &self.driver_java_options),
            ("spark.driver.extraLibraryPath", &self.driver_library_path),
            ("spark.executor.memory", &self.executor_memory),
            ("spark.executor.cores", &self.executor_cores),
            ("spark.executor.instances", &self.num_executors),
            ("spark.cores.max", &self.total_executor_cores),
            ("spark.yarn.queue", &self.queue),
        ];
        for (key, value) in sized {
            if let Some(value) = value {
                request.set_conf(key, value);
            }
        }

        Ok(request)
    }

    fn system_properties(&self) -> BTreeMap<String, String> {
        self.defines.iter().cloned().collect()
    }
}

fn flatten_lists(values: &[String]) -> Vec<String> {
    values.iter().flat_map(|v| split_list(v)).collect()
}

/// Run whichever operation the command line asks for.
pub fn run<S: OutputSink>(cli: Cli, sink: &mut S) -> Result<ExitStatus> {
    let config = Config::load(cli.config_file.clone(), &cli.system_properties())
        .context("Failed to load configuration")?;
    match config.defaults_notice() {
        Some(notice) => sink.warn(&notice),
        None => tracing::info!(
            config_file = %config.config_file.display(),
            server_url = %config.server_url,
            username = %config.username,
            "using configuration"
        ),
    }

    let client = HttpJobClient::new(&config);

    if let Some(batch_id) = &cli.status {
        return handle_status(&client, &config, batch_id, sink);
    }
    if let Some(batch_id) = &cli.kill {
        return handle_kill(&client, batch_id, sink);
    }
    handle_submit(&cli, &config, &client, sink, interrupt_channel)
}

/// Route SIGINT to the monitor instead of terminating the process.
///
/// Installed only once a batch exists; until then Ctrl-C keeps its default
/// behaviour and ends the process immediately.
fn interrupt_channel() -> Receiver<MonitorCommand> {
    let (command_tx, command_rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = command_tx.send(MonitorCommand::Stop);
    }) {
        tracing::warn!(error = %e, "failed to install interrupt handler");
    }
    command_rx
}

/// Handle `--status`.
pub fn handle_status<C: JobClient + ?Sized, S: OutputSink + ?Sized>(
    client: &C,
    config: &Config,
    batch_id: &str,
    sink: &mut S,
) -> Result<ExitStatus> {
    let handle = client.get_status(batch_id)?;
    sink.info(&format!("Batch ID: {}", handle.id));
    sink.info(&format!(
        "State: {}",
        handle.state.as_deref().unwrap_or("UNKNOWN")
    ));
    if let Some(app_id) = handle.app_id() {
        sink.info(&format!("Application ID: {}", app_id));
    }
    if let Some(url) = history_server_url(config.history_server_url.as_deref(), handle.app_id()) {
        sink.info(&format!("Application URL: {}", url));
    }
    if let Some(diagnostic) = handle.diagnostic() {
        sink.info(&format!("Diagnostic: {}", diagnostic));
    }
    Ok(ExitStatus::Success)
}

/// Handle `--kill`.
pub fn handle_kill<C: JobClient + ?Sized, S: OutputSink + ?Sized>(
    client: &C,
    batch_id: &str,
    sink: &mut S,
) -> Result<ExitStatus> {
    client.cancel(batch_id)?;
    sink.info(&format!("Kill request sent for Batch ID: {}", batch_id));
    Ok(ExitStatus::Success)
}

/// Handle a submission: submit, then follow the batch to completion.
///
/// `watch_interrupts` is called after the batch was created and supplies the
/// channel the monitor listens on for a stop request.
pub fn handle_submit<C, S, F>(
    cli: &Cli,
    config: &Config,
    client: &C,
    sink: &mut S,
    watch_interrupts: F,
) -> Result<ExitStatus>
where
    C: JobClient + ?Sized,
    S: OutputSink + ?Sized,
    F: FnOnce() -> Receiver<MonitorCommand>,
{
    let (descriptor, warnings) = cli.to_job_request()?.build()?;
    for warning in &warnings {
        sink.warn(warning);
    }

    print_summary(&descriptor, config, sink);

    let submitted = client.submit(&descriptor)?;
    print_submitted(&submitted, config, sink);

    let command_rx = watch_interrupts();
    let outcome = MonitorSession::new(client, &mut *sink, &submitted, command_rx).run();
    match outcome {
        Ok(final_handle) => {
            let report =
                TerminalReport::from_handle(&final_handle, config.history_server_url.as_deref());
            report.print(sink);
            Ok(report.exit_status())
        }
        Err(e) => {
            let status = ExitStatus::from_monitor_error(&e);
            if status == ExitStatus::Interrupted {
                sink.warn(&e.to_string());
            } else {
                sink.error(&e.to_string());
            }
            sink.info(&format!(
                "Batch {} keeps running on the server. Use --status {} or --kill {}.",
                submitted.id, submitted.id, submitted.id
            ));
            Ok(status)
        }
    }
}

fn print_summary<S: OutputSink + ?Sized>(descriptor: &JobDescriptor, config: &Config, sink: &mut S) {
    sink.info(RULE);
    sink.info("Submitting Spark job to Kyuubi Server");
    sink.info(RULE);
    sink.info(&format!("Kyuubi Server URL: {}", config.server_url));
    sink.info(&format!("Username: {}", config.username));
    sink.info(THIN_RULE);
    match (descriptor.kind, &descriptor.class_name) {
        (BatchKind::Script, _) => sink.info(&format!("PySpark Script: {}", descriptor.resource)),
        (BatchKind::Generic, Some(class_name)) => {
            sink.info(&format!("Application Class: {}", class_name))
        }
        (BatchKind::Generic, None) => {}
    }
    sink.info(&format!("Resource: {}", descriptor.resource));
    if let Some(name) = &descriptor.name {
        sink.info(&format!("Job Name: {}", name));
    }
    if let Some(proxy_user) = &descriptor.proxy_user {
        sink.info(&format!("Proxy User: {}", proxy_user));
    }
    if let Some(queue) = &descriptor.queue {
        sink.info(&format!("Queue: {}", queue));
    }
    sink.info(&format!("Deploy Mode: {}", descriptor.deploy_mode));

    let lists = [
        ("Py Files", &descriptor.py_files),
        ("Files", &descriptor.files),
        ("Archives", &descriptor.archives),
        ("Jars", &descriptor.jars),
        ("Packages", &descriptor.packages),
        ("Repositories", &descriptor.repositories),
    ];
    for (label, values) in lists {
        if !values.is_empty() {
            sink.info(&format!("{}: {}", label, values.join(",")));
        }
    }
    if !descriptor.conf.is_empty() {
        sink.info("Configuration:");
        for (key, value) in &descriptor.conf {
            sink.info(&format!("  {} = {}", key, value));
        }
    }
    sink.info(RULE);
}

fn print_submitted<S: OutputSink + ?Sized>(handle: &BatchHandle, config: &Config, sink: &mut S) {
    sink.info("\n✅ Batch submitted successfully!");
    sink.info(&format!("Batch ID: {}", handle.id));
    if let Some(app_id) = handle.app_id() {
        sink.info(&format!("Application ID: {}", app_id));
    }
    if let Some(url) = history_server_url(config.history_server_url.as_deref(), handle.app_id()) {
        sink.info(&format!("Application URL: {}", url));
    }
    sink.info("\nWaiting for job to complete...");
    sink.info(THIN_RULE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{handle, ScriptedClient};
    use crate::sink::testing::{Event, RecordingSink};
    use clap::CommandFactory;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kyuubi-submit").chain(args.iter().copied())).unwrap()
    }

    fn test_config() -> Config {
        let mut system = BTreeMap::new();
        system.insert(
            crate::config::HISTORY_SERVER_URL_KEY.to_string(),
            "http://history:18080".to_string(),
        );
        Config::resolve(PathBuf::from("/tmp/none"), &system, |_| None, None).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submission() {
        let cli = parse(&[
            "--class",
            "org.apache.spark.examples.SparkPi",
            "--name",
            "spark-pi",
            "--executor-memory",
            "4g",
            "--conf",
            "spark.executor.memory=2g",
            "--conf",
            "spark.eventLog.enabled=true",
            "--jars",
            "a.jar, b.jar",
            "--jars",
            "c.jar",
            "--queue",
            "etl",
            "oss://bucket/spark-examples.jar",
            "1000",
            "--verbose-app",
        ]);
        assert_eq!(cli.resource.as_deref(), Some("oss://bucket/spark-examples.jar"));
        assert_eq!(cli.app_args, vec!["1000".to_string(), "--verbose-app".to_string()]);

        let request = cli.to_job_request().unwrap();
        assert_eq!(request.jars, vec!["a.jar", "b.jar", "c.jar"]);
        assert_eq!(request.conf["spark.executor.memory"], "4g");
        assert_eq!(request.conf["spark.eventLog.enabled"], "true");
        assert_eq!(request.conf["spark.yarn.queue"], "etl");
    }

    #[test]
    fn test_status_and_kill_conflict() {
        let result = Cli::try_parse_from(["kyuubi-submit", "--status", "b1", "--kill", "b1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_conf_is_rejected() {
        assert!(Cli::try_parse_from(["kyuubi-submit", "--conf", "novalue", "app.py"]).is_err());
        assert!(Cli::try_parse_from(["kyuubi-submit", "--conf", "=x", "app.py"]).is_err());
    }

    #[test]
    fn test_defines_become_system_properties() {
        let cli = parse(&["-D", "kyuubi.server.url=http://kyuubi:10099", "--status", "b1"]);
        let props = cli.system_properties();
        assert_eq!(props["kyuubi.server.url"], "http://kyuubi:10099");
    }

    #[test]
    fn test_properties_file_provides_conf_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "spark.executor.memory=1g").unwrap();
        writeln!(temp_file, "spark.executor.instances=3").unwrap();
        temp_file.flush().unwrap();
        let path = temp_file.path().to_str().unwrap().to_string();

        let cli = parse(&[
            "--properties-file",
            path.as_str(),
            "--conf",
            "spark.executor.memory=8g",
            "job.py",
        ]);
        let (descriptor, _) = cli.to_job_request().unwrap().build().unwrap();
        assert_eq!(descriptor.conf["spark.executor.memory"], "8g");
        assert_eq!(descriptor.conf["spark.executor.instances"], "3");
    }

    #[test]
    fn test_client_deploy_mode_is_coerced_and_submission_proceeds() {
        let cli = parse(&["--deploy-mode", "client", "job.py"]);
        let client = ScriptedClient::new().with_statuses(vec![Ok(handle("FINISHED"))]);
        let mut sink = RecordingSink::default();
        let (_tx, rx) = std::sync::mpsc::channel();

        // The scripted submission answers PENDING; the session then polls once.
        let status =
            handle_submit(&cli, &test_config(), &client, &mut sink, move || rx).unwrap();

        assert_eq!(status, ExitStatus::Success);
        assert!(matches!(&sink.events[0], Event::Warn(w) if w.contains("not supported")));
        assert!(sink
            .events
            .contains(&Event::Info("Deploy Mode: cluster".to_string())));
        assert_eq!(
            sink.transitions(),
            vec![("PENDING".to_string(), "FINISHED".to_string())]
        );
    }

    #[test]
    fn test_submit_without_class_fails_before_submission() {
        let cli = parse(&["app.jar"]);
        let client = ScriptedClient::new();
        let mut sink = RecordingSink::default();
        let armed = Cell::new(false);

        let err = handle_submit(&cli, &test_config(), &client, &mut sink, || {
            armed.set(true);
            std::sync::mpsc::channel().1
        })
        .unwrap_err();
        assert!(err.to_string().contains("--class is required"));
        assert!(sink.events.is_empty());
        assert!(!armed.get());
    }

    #[test]
    fn test_rejected_submission_never_arms_interrupt_handling() {
        let cli = parse(&["job.py"]);
        let client = ScriptedClient::new().rejecting_submissions();
        let mut sink = RecordingSink::default();
        let armed = Cell::new(false);

        let err = handle_submit(&cli, &test_config(), &client, &mut sink, || {
            armed.set(true);
            std::sync::mpsc::channel().1
        })
        .unwrap_err();
        assert!(err.to_string().contains("Failed to submit batch"));
        assert!(!armed.get());
        assert_eq!(client.status_calls(), 0);
    }

    #[test]
    fn test_interrupted_submission_reports_distinct_status() {
        let cli = parse(&["job.py"]);
        let client = ScriptedClient::new();
        let mut sink = RecordingSink::default();
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(MonitorCommand::Stop).unwrap();

        let status =
            handle_submit(&cli, &test_config(), &client, &mut sink, move || rx).unwrap();
        assert_eq!(status, ExitStatus::Interrupted);
        assert_eq!(client.status_calls(), 0);
    }

    #[test]
    fn test_status_prints_history_url() {
        let mut snapshot = handle("RUNNING");
        snapshot.app_id = Some("app-42".to_string());
        snapshot.app_url = Some("http://ignored:4040".to_string());
        let client = ScriptedClient::new().with_statuses(vec![Ok(snapshot)]);
        let mut sink = RecordingSink::default();

        let status = handle_status(&client, &test_config(), "b1", &mut sink).unwrap();

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(
            sink.events,
            vec![
                Event::Info("Batch ID: b1".into()),
                Event::Info("State: RUNNING".into()),
                Event::Info("Application ID: app-42".into()),
                Event::Info("Application URL: http://history:18080/history/app-42/1/".into()),
            ]
        );
    }

    #[test]
    fn test_status_failure_is_an_error() {
        let client = ScriptedClient::new().with_statuses(vec![Err(())]);
        let mut sink = RecordingSink::default();
        assert!(handle_status(&client, &test_config(), "b1", &mut sink).is_err());
    }

    #[test]
    fn test_kill_reports_request() {
        let client = ScriptedClient::new();
        let mut sink = RecordingSink::default();
        handle_kill(&client, "b1", &mut sink).unwrap();
        assert_eq!(
            sink.events,
            vec![Event::Info("Kill request sent for Batch ID: b1".into())]
        );
    }
}
