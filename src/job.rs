//! Job descriptor: the fully resolved request handed to the job client.

use crate::error::DescriptorError;
use std::collections::BTreeMap;
use std::fmt;

/// Configuration key the normalized deploy mode is written to.
pub const DEPLOY_MODE_KEY: &str = "spark.submit.deployMode";

/// Kind of batch, as understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// JVM application with an entry-point class.
    Generic,
    /// Python script; no entry-point class needed.
    Script,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Generic => "SPARK",
            BatchKind::Script => "PYSPARK",
        }
    }

    /// Infer the kind from the resource's file extension.
    pub fn infer(resource: &str) -> Self {
        if resource.ends_with(".py") {
            BatchKind::Script
        } else {
            BatchKind::Generic
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the driver runs. The service only accepts `Cluster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode {
    Cluster,
    Client,
}

impl DeployMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployMode::Cluster => "cluster",
            DeployMode::Client => "client",
        }
    }

    pub fn parse(mode: &str) -> Option<DeployMode> {
        let mode = mode.trim();
        if mode.eq_ignore_ascii_case("cluster") {
            Some(DeployMode::Cluster)
        } else if mode.eq_ignore_ascii_case("client") {
            Some(DeployMode::Client)
        } else {
            None
        }
    }

    /// Normalize a user supplied deploy mode.
    ///
    /// Always yields `Cluster`. Unsupported or invalid values come back with a
    /// warning for the operator instead of an error.
    pub fn normalize(requested: Option<&str>) -> (DeployMode, Option<String>) {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());
        let warning = match requested {
            None => None,
            Some(mode) => match DeployMode::parse(mode) {
                Some(DeployMode::Cluster) => None,
                Some(DeployMode::Client) => Some(
                    "--deploy-mode client is not supported in this environment. \
                     Client mode requires the driver to run on the local machine, \
                     which is not compatible with remote server submission. \
                     Deploy mode will be automatically changed to 'cluster'."
                        .to_string(),
                ),
                None => Some(format!(
                    "Invalid --deploy-mode value: {}. Only 'cluster' mode is supported. Using 'cluster' mode.",
                    mode
                )),
            },
        };
        (DeployMode::Cluster, warning)
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Split a comma separated list, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Mutable request as collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub resource: Option<String>,
    pub class_name: Option<String>,
    pub name: Option<String>,
    pub proxy_user: Option<String>,
    pub queue: Option<String>,
    pub deploy_mode: Option<String>,
    pub args: Vec<String>,
    /// Defaults loaded from a properties file; `conf` wins on conflict.
    pub conf_defaults: BTreeMap<String, String>,
    pub conf: BTreeMap<String, String>,
    pub files: Vec<String>,
    pub jars: Vec<String>,
    pub archives: Vec<String>,
    pub py_files: Vec<String>,
    pub packages: Vec<String>,
    pub repositories: Vec<String>,
}

impl JobRequest {
    /// Set a configuration value. A later write for the same key wins.
    pub fn set_conf(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.conf.insert(key.into(), value.into());
    }

    /// Validate the request and freeze it into a [`JobDescriptor`].
    ///
    /// Returns the descriptor together with any warnings the operator should see.
    pub fn build(self) -> Result<(JobDescriptor, Vec<String>), DescriptorError> {
        let resource = self
            .resource
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or(DescriptorError::MissingResource)?;

        let kind = BatchKind::infer(&resource);
        let class_name = self.class_name.filter(|c| !c.trim().is_empty());
        if kind != BatchKind::Script && class_name.is_none() {
            return Err(DescriptorError::MissingClass);
        }

        let mut conf = self.conf_defaults;
        conf.extend(self.conf);

        // --deploy-mode wins; otherwise whatever the conf asked for.
        let requested = self
            .deploy_mode
            .filter(|m| !m.trim().is_empty())
            .or_else(|| conf.get(DEPLOY_MODE_KEY).cloned());
        let mut warnings = Vec::new();
        let (deploy_mode, warning) = DeployMode::normalize(requested.as_deref());
        warnings.extend(warning);
        conf.insert(DEPLOY_MODE_KEY.to_string(), deploy_mode.as_str().to_string());

        Ok((
            JobDescriptor {
                resource,
                class_name,
                kind,
                name: non_empty(self.name),
                proxy_user: non_empty(self.proxy_user),
                queue: non_empty(self.queue),
                deploy_mode,
                args: self.args,
                conf,
                files: self.files,
                jars: self.jars,
                archives: self.archives,
                py_files: self.py_files,
                packages: self.packages,
                repositories: self.repositories,
            },
            warnings,
        ))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// A validated job request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub resource: String,
    pub class_name: Option<String>,
    pub kind: BatchKind,
    pub name: Option<String>,
    pub proxy_user: Option<String>,
    pub queue: Option<String>,
    pub deploy_mode: DeployMode,
    pub args: Vec<String>,
    pub conf: BTreeMap<String, String>,
    pub files: Vec<String>,
    pub jars: Vec<String>,
    pub archives: Vec<String>,
    pub py_files: Vec<String>,
    pub packages: Vec<String>,
    pub repositories: Vec<String>,
}
