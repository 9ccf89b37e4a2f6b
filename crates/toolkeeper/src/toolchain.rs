//! Runtime and package discovery for the managed Node.js programs.
//!
//! A package is run from a local `node_modules` install when one is found by
//! walking up from the package root, and through the package runner
//! otherwise.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::process::LaunchSpec;

const TOOLCHAIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::toolchain");

/// An npm package with a runnable entry script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Package {
    /// Registry name.
    pub name: &'static str,
    /// Pinned version.
    pub version: &'static str,
    /// Entry script relative to the package directory.
    pub entry: &'static str,
}

impl Package {
    /// `name@version`, as passed to the package runner.
    #[must_use]
    pub fn spec(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// The data-collection server.
pub const SERVER_PACKAGE: Package = Package {
    name: "@agentdeskai/browser-tools-server",
    version: "1.2.0",
    entry: "dist/browser-connector.js",
};

/// The protocol-bridge client.
pub const CLIENT_PACKAGE: Package = Package {
    name: "@agentdeskai/browser-tools-mcp",
    version: "1.2.0",
    entry: "dist/mcp-server.js",
};

/// Oldest runtime the packages support.
pub const MINIMUM_RUNTIME: RuntimeVersion = RuntimeVersion::new(18, 0, 0);

/// Where a package can be run from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Entry script of a local install.
    Local(PathBuf),
    /// Fetched and run by the package runner.
    Runner,
    /// Neither a local install nor a runner is available.
    Unavailable,
}

impl PackageSource {
    /// Whether the package can be launched at all.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

/// A `major.minor.patch` runtime version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl RuntimeVersion {
    /// Builds a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Text that is not a runtime version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{input}' is not a runtime version")]
pub struct VersionParseError {
    input: String,
}

impl FromStr for RuntimeVersion {
    type Err = VersionParseError;

    /// Accepts `v20.11.1`, `20.11.1`, and shorter forms such as `20.11`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionParseError {
            input: input.to_owned(),
        };
        let trimmed = input.trim();
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let mut parts = bare.split('.');
        let mut component = |required: bool| -> Result<u32, VersionParseError> {
            match parts.next() {
                Some(part) => part.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let major = component(true)?;
        let minor = component(false)?;
        let patch = component(false)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(major, minor, patch))
    }
}

/// How packages are found and launched.
pub trait Toolchain {
    /// Installed runtime version, or `None` when the runtime is missing.
    fn runtime_version(&self) -> impl Future<Output = Option<RuntimeVersion>>;

    /// Where `package` can be run from.
    fn locate(&self, package: &Package) -> impl Future<Output = PackageSource>;

    /// Command line for running `package` from `source` on `port`.
    fn launch_spec(
        &self,
        package: &Package,
        source: &PackageSource,
        port: u16,
    ) -> Option<LaunchSpec>;
}

/// The system Node.js runtime and `npx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeToolchain {
    package_root: PathBuf,
    runtime: String,
    runner: String,
}

impl NodeToolchain {
    /// Resolves local installs starting from `package_root`.
    pub fn new(package_root: impl Into<PathBuf>) -> Self {
        Self {
            package_root: package_root.into(),
            runtime: "node".to_owned(),
            runner: "npx".to_owned(),
        }
    }

    /// Entry script of a local install of `package`, searching `node_modules`
    /// in the package root and each of its ancestors.
    #[must_use]
    pub fn resolve_local(&self, package: &Package) -> Option<PathBuf> {
        self.package_root.ancestors().find_map(|dir| {
            let candidate = dir
                .join("node_modules")
                .join(package.name)
                .join(package.entry);
            candidate.is_file().then_some(candidate)
        })
    }

    async fn runner_available(&self) -> bool {
        succeeds(&self.runner, "--version").await
    }
}

impl Toolchain for NodeToolchain {
    async fn runtime_version(&self) -> Option<RuntimeVersion> {
        let output = Command::new(&self.runtime)
            .arg("--version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout);
        match text.parse() {
            Ok(version) => Some(version),
            Err(error) => {
                debug!(target: TOOLCHAIN_TARGET, error = %error, "unreadable runtime version");
                None
            }
        }
    }

    async fn locate(&self, package: &Package) -> PackageSource {
        if let Some(entry) = self.resolve_local(package) {
            debug!(
                target: TOOLCHAIN_TARGET,
                package = %package,
                entry = %entry.display(),
                "using local install"
            );
            return PackageSource::Local(entry);
        }
        if self.runner_available().await {
            debug!(target: TOOLCHAIN_TARGET, package = %package, "using package runner");
            PackageSource::Runner
        } else {
            PackageSource::Unavailable
        }
    }

    fn launch_spec(
        &self,
        package: &Package,
        source: &PackageSource,
        port: u16,
    ) -> Option<LaunchSpec> {
        default_launch_spec(&self.runtime, &self.runner, package, source, port)
    }
}

/// `runtime <entry> --port N` for a local install, `runner -y <pkg>@<ver>
/// --port N` otherwise. Both run with `NODE_ENV=production`.
#[must_use]
pub fn default_launch_spec(
    runtime: &str,
    runner: &str,
    package: &Package,
    source: &PackageSource,
    port: u16,
) -> Option<LaunchSpec> {
    let base = match source {
        PackageSource::Local(entry) => {
            LaunchSpec::new(runtime).arg(entry.to_string_lossy().into_owned())
        }
        PackageSource::Runner => LaunchSpec::new(runner).args(["-y".to_owned(), package.spec()]),
        PackageSource::Unavailable => return None,
    };
    Some(
        base.args(["--port".to_owned(), port.to_string()])
            .env("NODE_ENV", "production"),
    )
}

async fn succeeds(program: &str, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    #[rstest]
    #[case::node_style("v20.11.1\n", RuntimeVersion::new(20, 11, 1))]
    #[case::bare("18.0.0", RuntimeVersion::new(18, 0, 0))]
    #[case::short("16.20", RuntimeVersion::new(16, 20, 0))]
    #[case::major_only("v22", RuntimeVersion::new(22, 0, 0))]
    fn parses_runtime_versions(#[case] input: &str, #[case] expected: RuntimeVersion) {
        assert_eq!(input.parse::<RuntimeVersion>(), Ok(expected));
    }

    #[rstest]
    #[case::empty("")]
    #[case::words("not a version")]
    #[case::too_long("1.2.3.4")]
    #[case::prerelease("20.0.0-rc1")]
    fn rejects_malformed_versions(#[case] input: &str) {
        assert!(input.parse::<RuntimeVersion>().is_err());
    }

    #[rstest]
    #[case::older(RuntimeVersion::new(16, 20, 2), false)]
    #[case::minimum(RuntimeVersion::new(18, 0, 0), true)]
    #[case::newer_minor(RuntimeVersion::new(18, 1, 0), true)]
    #[case::newer_major(RuntimeVersion::new(20, 0, 0), true)]
    fn compares_against_minimum(#[case] found: RuntimeVersion, #[case] supported: bool) {
        assert_eq!(found >= MINIMUM_RUNTIME, supported);
    }

    #[test]
    fn resolves_install_in_ancestor_directory() {
        let dir = TempDir::new().expect("create temp dir");
        let entry = dir
            .path()
            .join("node_modules")
            .join(SERVER_PACKAGE.name)
            .join(SERVER_PACKAGE.entry);
        fs::create_dir_all(entry.parent().expect("entry has parent")).expect("create package dir");
        fs::write(&entry, "// stub").expect("write entry");
        let nested = dir.path().join("workspace").join("project");
        fs::create_dir_all(&nested).expect("create nested dir");

        let toolchain = NodeToolchain::new(&nested);

        assert_eq!(toolchain.resolve_local(&SERVER_PACKAGE), Some(entry));
        assert_eq!(toolchain.resolve_local(&CLIENT_PACKAGE), None);
    }

    #[test]
    fn local_install_runs_entry_with_runtime() {
        let source = PackageSource::Local(PathBuf::from("/opt/nm/mcp-server.js"));
        let spec = default_launch_spec("node", "npx", &CLIENT_PACKAGE, &source, 3025)
            .expect("local source launches");

        assert_eq!(spec.to_string(), "node /opt/nm/mcp-server.js --port 3025");
        assert_eq!(
            spec.environment().get("NODE_ENV").map(String::as_str),
            Some("production")
        );
    }

    #[test]
    fn runner_fetches_pinned_package() {
        let spec = default_launch_spec("node", "npx", &SERVER_PACKAGE, &PackageSource::Runner, 4000)
            .expect("runner source launches");
        assert_eq!(
            spec.to_string(),
            "npx -y @agentdeskai/browser-tools-server@1.2.0 --port 4000"
        );
    }

    #[test]
    fn unavailable_package_has_no_launch_spec() {
        let spec = default_launch_spec("node", "npx", &SERVER_PACKAGE, &PackageSource::Unavailable, 1);
        assert!(spec.is_none());
    }

    #[tokio::test]
    async fn missing_runtime_has_no_version() {
        let toolchain = NodeToolchain {
            package_root: PathBuf::from("."),
            runtime: "toolkeeper-no-such-runtime".to_owned(),
            runner: "toolkeeper-no-such-runner".to_owned(),
        };
        assert_eq!(toolchain.runtime_version().await, None);
        assert_eq!(toolchain.locate(&SERVER_PACKAGE).await, PackageSource::Unavailable);
    }
}
