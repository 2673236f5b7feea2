//! Install method records and their resolved form.
//!
//! Catalog files describe install methods loosely: a command plus an
//! argument list, a single command string with the arguments embedded, a
//! list of commands, or a zero-install marker. [`RawInstallMethod`] accepts
//! all of them; [`RawInstallMethod::resolve`] turns one into a typed
//! [`InstallMethod`] once, when the test queue is built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::env_template::EnvTemplate;

/// Install method as written in a catalog file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawInstallMethod {
    /// Program, or a full command line when `args` is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Environment template (placeholder or default values).
    pub env: BTreeMap<String, String>,
    /// Explicit package name, overriding extraction from the arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Steps of a multi-command method, run in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<RawInstallMethod>,
    #[serde(alias = "is_zero_install", alias = "zeroInstall")]
    pub zero_install: bool,
}

impl RawInstallMethod {
    /// Resolve into a typed install method.
    ///
    /// Fails when the record carries no command at all or a nested
    /// multi-command step.
    pub fn resolve(&self) -> Result<InstallMethod, String> {
        let env = EnvTemplate::new(self.env.clone());

        if self.zero_install {
            let launch = match &self.command {
                Some(cmd) if !cmd.trim().is_empty() => {
                    Some(command_spec(cmd, &self.args, env, self.package.clone())?)
                }
                _ => None,
            };
            return Ok(InstallMethod::ZeroInstall { launch });
        }

        if !self.commands.is_empty() {
            let mut specs = Vec::with_capacity(self.commands.len());
            for (idx, step) in self.commands.iter().enumerate() {
                if !step.commands.is_empty() {
                    return Err(format!("step {} nests another command list", idx + 1));
                }
                let cmd = step
                    .command
                    .as_deref()
                    .ok_or_else(|| format!("step {} has no command", idx + 1))?;
                let mut step_env = env.clone();
                for (k, v) in &step.env {
                    step_env.insert(k.clone(), v.clone());
                }
                specs.push(command_spec(cmd, &step.args, step_env, step.package.clone())?);
            }
            return Ok(InstallMethod::MultiCommand { commands: specs });
        }

        match &self.command {
            Some(cmd) => Ok(InstallMethod::SingleCommand {
                command: command_spec(cmd, &self.args, env, self.package.clone())?,
            }),
            None => Err("install method has no command".to_string()),
        }
    }
}

fn command_spec(
    command: &str,
    args: &[String],
    env: EnvTemplate,
    package: Option<String>,
) -> Result<CommandSpec, String> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| "install method has an empty command".to_string())?
        .to_string();

    // "npx -y pkg" style: arguments live in the command string.
    let mut full_args: Vec<String> = parts.map(str::to_string).collect();
    full_args.extend(args.iter().cloned());

    Ok(CommandSpec {
        program,
        args: full_args,
        env,
        package,
    })
}

/// Family of tooling a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodKind {
    Npx,
    Python,
    Pip,
    Uvx,
    ZeroInstall,
    Custom,
}

impl MethodKind {
    /// Classify a program by its file name.
    pub fn of_program(program: &str) -> Self {
        let base = program
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(program)
            .trim_end_matches(".exe")
            .trim_end_matches(".cmd");
        match base {
            "npx" | "npm" => Self::Npx,
            "python" | "python3" | "py" => Self::Python,
            "pip" | "pip3" => Self::Pip,
            "uvx" => Self::Uvx,
            _ => Self::Custom,
        }
    }

    /// Name used in allow-lists and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npx => "npx",
            Self::Python => "python",
            Self::Pip => "pip",
            Self::Uvx => "uvx",
            Self::ZeroInstall => "zero-install",
            Self::Custom => "custom",
        }
    }

    /// Whether the install phase resolves a package for this kind.
    pub fn is_package_manager(&self) -> bool {
        matches!(self, Self::Npx | Self::Python | Self::Pip | Self::Uvx)
    }

    /// Package ecosystem the kind installs from.
    pub fn ecosystem(&self) -> Option<Ecosystem> {
        match self {
            Self::Npx => Some(Ecosystem::Npm),
            Self::Python | Self::Pip | Self::Uvx => Some(Ecosystem::PyPi),
            Self::ZeroInstall | Self::Custom => None,
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MethodKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "npx" => Ok(Self::Npx),
            "python" => Ok(Self::Python),
            "pip" => Ok(Self::Pip),
            "uvx" => Ok(Self::Uvx),
            "zero-install" | "zero_install" => Ok(Self::ZeroInstall),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown method kind: {}", other)),
        }
    }
}

/// Package registries a method may resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    PyPi,
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npm => f.write_str("npm"),
            Self::PyPi => f.write_str("pypi"),
        }
    }
}

/// One concrete command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "EnvTemplate::is_empty")]
    pub env: EnvTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: EnvTemplate::default(),
            package: None,
        }
    }

    pub fn kind(&self) -> MethodKind {
        MethodKind::of_program(&self.program)
    }

    /// Command line for logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Bare program name, for allow-list matching of custom commands.
    pub fn program_name(&self) -> &str {
        self.program
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.program)
    }

    /// Package this command installs or runs, if one can be named.
    pub fn package_name(&self) -> Option<String> {
        if let Some(explicit) = &self.package {
            return Some(explicit.clone());
        }
        match self.kind() {
            MethodKind::Npx => first_positional(&self.args).map(strip_npm_version),
            MethodKind::Pip => {
                let after_install = self
                    .args
                    .iter()
                    .position(|a| a == "install")
                    .map(|idx| &self.args[idx + 1..])
                    .unwrap_or(&self.args[..]);
                first_positional(after_install).map(strip_pip_specifier)
            }
            MethodKind::Python => {
                let idx = self.args.iter().position(|a| a == "-m")?;
                let module = self.args.get(idx + 1)?;
                if module == "pip" {
                    let rest = &self.args[idx + 2..];
                    let after_install = rest
                        .iter()
                        .position(|a| a == "install")
                        .map(|i| &rest[i + 1..])?;
                    return first_positional(after_install).map(strip_pip_specifier);
                }
                let top = module.split('.').next().unwrap_or(module);
                Some(top.replace('_', "-"))
            }
            MethodKind::Uvx => first_positional(&self.args).map(strip_pip_specifier),
            MethodKind::ZeroInstall | MethodKind::Custom => None,
        }
    }
}

fn first_positional(args: &[String]) -> Option<&str> {
    args.iter()
        .map(String::as_str)
        .find(|a| !a.starts_with('-') && !a.is_empty())
}

/// `@scope/pkg@1.2.3` -> `@scope/pkg`, `pkg@latest` -> `pkg`.
fn strip_npm_version(spec: &str) -> String {
    let search_from = usize::from(spec.starts_with('@'));
    match spec[search_from..].find('@') {
        Some(pos) => spec[..search_from + pos].to_string(),
        None => spec.to_string(),
    }
}

/// `pkg==1.0`, `pkg>=2`, `pkg[extra]` -> `pkg`.
fn strip_pip_specifier(spec: &str) -> String {
    let end = spec
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ';' | ' '))
        .unwrap_or(spec.len());
    spec[..end].to_string()
}

/// An install method after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallMethod {
    /// Nothing to install; `launch` starts the server if given.
    ZeroInstall { launch: Option<CommandSpec> },
    SingleCommand { command: CommandSpec },
    /// Commands run in order; the last one launches the server.
    MultiCommand { commands: Vec<CommandSpec> },
}

impl InstallMethod {
    pub fn is_zero_install(&self) -> bool {
        matches!(self, Self::ZeroInstall { .. })
    }

    /// Classification used for allow-listing and per-method reporting.
    pub fn kind(&self) -> MethodKind {
        match self {
            Self::ZeroInstall { .. } => MethodKind::ZeroInstall,
            Self::SingleCommand { command } => command.kind(),
            Self::MultiCommand { commands } => commands
                .iter()
                .map(CommandSpec::kind)
                .find(MethodKind::is_package_manager)
                .or_else(|| commands.last().map(CommandSpec::kind))
                .unwrap_or(MethodKind::Custom),
        }
    }

    /// Every command the method may run.
    pub fn commands(&self) -> Vec<&CommandSpec> {
        match self {
            Self::ZeroInstall { launch } => launch.iter().collect(),
            Self::SingleCommand { command } => vec![command],
            Self::MultiCommand { commands } => commands.iter().collect(),
        }
    }

    /// Commands whose packages the install phase resolves.
    pub fn install_steps(&self) -> Vec<&CommandSpec> {
        match self {
            Self::ZeroInstall { .. } => Vec::new(),
            _ => self
                .commands()
                .into_iter()
                .filter(|c| c.kind().is_package_manager())
                .collect(),
        }
    }

    /// Command the health probe starts.
    pub fn launch(&self) -> Option<&CommandSpec> {
        match self {
            Self::ZeroInstall { launch } => launch.as_ref(),
            Self::SingleCommand { command } => Some(command),
            Self::MultiCommand { commands } => commands.last(),
        }
    }

    /// Tool kinds that must be present on the machine.
    pub fn required_tools(&self) -> Vec<MethodKind> {
        let mut kinds: Vec<MethodKind> = self
            .commands()
            .into_iter()
            .map(CommandSpec::kind)
            .filter(MethodKind::is_package_manager)
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Short human label, e.g. `npx` or `pip -> python`.
    pub fn label(&self) -> String {
        match self {
            Self::ZeroInstall { .. } => MethodKind::ZeroInstall.to_string(),
            Self::SingleCommand { command } => command.kind().to_string(),
            Self::MultiCommand { commands } => commands
                .iter()
                .map(|c| c.kind().to_string())
                .collect::<Vec<_>>()
                .join(" -> "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(command: &str, args: &[&str]) -> RawInstallMethod {
        RawInstallMethod {
            command: Some(command.to_string()),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn command_with_args_resolves_to_single() {
        let method = raw("npx", &["-y", "@modelcontextprotocol/server-memory"])
            .resolve()
            .unwrap();
        assert_eq!(method.kind(), MethodKind::Npx);
        let launch = method.launch().unwrap();
        assert_eq!(launch.program, "npx");
        assert_eq!(launch.args.len(), 2);
    }

    #[test]
    fn embedded_args_are_split() {
        let method = raw("uvx mcp-server-fetch", &[]).resolve().unwrap();
        let launch = method.launch().unwrap();
        assert_eq!(launch.program, "uvx");
        assert_eq!(launch.args, vec!["mcp-server-fetch"]);
    }

    #[test]
    fn zero_install_without_command() {
        let method = RawInstallMethod {
            zero_install: true,
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert!(method.is_zero_install());
        assert!(method.launch().is_none());
        assert!(method.install_steps().is_empty());
        assert!(method.required_tools().is_empty());
    }

    #[test]
    fn zero_install_with_launch_command() {
        let mut record = raw("npx", &["-y", "server"]);
        record.zero_install = true;
        let method = record.resolve().unwrap();
        assert_eq!(method.kind(), MethodKind::ZeroInstall);
        assert!(method.launch().is_some());
        assert!(method.install_steps().is_empty());
    }

    #[test]
    fn multi_command_launches_last() {
        let record = RawInstallMethod {
            commands: vec![
                raw("pip", &["install", "mcp-server-git"]),
                raw("python", &["-m", "mcp_server_git"]),
            ],
            ..Default::default()
        };
        let method = record.resolve().unwrap();
        assert_eq!(method.kind(), MethodKind::Pip);
        assert_eq!(method.launch().unwrap().program, "python");
        assert_eq!(method.install_steps().len(), 2);
        assert_eq!(method.required_tools(), vec![MethodKind::Python, MethodKind::Pip]);
        assert_eq!(method.label(), "pip -> python");
    }

    #[test]
    fn missing_command_is_an_error() {
        assert!(RawInstallMethod::default().resolve().is_err());
        let nested = RawInstallMethod {
            commands: vec![RawInstallMethod {
                commands: vec![raw("npx", &[])],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(nested.resolve().unwrap_err().contains("nests"));
    }

    #[test]
    fn kind_of_program_handles_paths() {
        assert_eq!(MethodKind::of_program("/usr/bin/python3"), MethodKind::Python);
        assert_eq!(MethodKind::of_program("npx.cmd"), MethodKind::Npx);
        assert_eq!(MethodKind::of_program("docker"), MethodKind::Custom);
    }

    #[test]
    fn npx_package_name_strips_version() {
        let spec = CommandSpec::new("npx", &["-y", "@scope/server@1.2.0", "/tmp"]);
        assert_eq!(spec.package_name().as_deref(), Some("@scope/server"));
        let spec = CommandSpec::new("npx", &["server-x@latest"]);
        assert_eq!(spec.package_name().as_deref(), Some("server-x"));
    }

    #[test]
    fn pip_package_name_after_install() {
        let spec = CommandSpec::new("pip", &["install", "--user", "mcp-server-git==0.6"]);
        assert_eq!(spec.package_name().as_deref(), Some("mcp-server-git"));
    }

    #[test]
    fn python_module_maps_to_package() {
        let spec = CommandSpec::new("python", &["-m", "mcp_server_time"]);
        assert_eq!(spec.package_name().as_deref(), Some("mcp-server-time"));
        let spec = CommandSpec::new("python3", &["-m", "pip", "install", "mcp-x[cli]"]);
        assert_eq!(spec.package_name().as_deref(), Some("mcp-x"));
        let spec = CommandSpec::new("python", &["server.py"]);
        assert_eq!(spec.package_name(), None);
    }

    #[test]
    fn explicit_package_wins() {
        let mut spec = CommandSpec::new("python", &["-m", "srv"]);
        spec.package = Some("actual-dist".to_string());
        assert_eq!(spec.package_name().as_deref(), Some("actual-dist"));
    }

    #[test]
    fn method_kind_parses_allow_list_names() {
        assert_eq!("zero-install".parse::<MethodKind>().unwrap(), MethodKind::ZeroInstall);
        assert_eq!("NPX".parse::<MethodKind>().unwrap(), MethodKind::Npx);
        assert!("docker".parse::<MethodKind>().is_err());
    }

    #[test]
    fn install_method_serializes_tagged() {
        let method = raw("npx", &["srv"]).resolve().unwrap();
        let json = serde_json::to_value(&method).unwrap();
        assert_eq!(json["type"], "single_command");
        assert_eq!(json["command"]["program"], "npx");
    }
}
