//! IaC engine subcommands

use std::fmt;

/// Environment entry that keeps `show` output addressing providers the way state records them
pub const SHOW_ENV: &str = "OPENTOFU_STATEFILE_PROVIDER_ADDRESS_TRANSLATION=0";

/// One IaC engine subcommand with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init { plugin_dir: String },
    /// `init` for engines older than 0.13
    InitLegacy { plugin_dir: String },
    Apply,
    Destroy,
    Plan,
    Show,
    Import { address: String, id: String },
    ReplaceProvider { old: String, new: String },
}

impl Command {
    /// Arguments passed after the program name
    pub fn args(&self) -> Vec<String> {
        match self {
            Command::Init { plugin_dir } => vec![
                "init".into(),
                format!("-plugin-dir={}", plugin_dir),
                "-no-color".into(),
            ],
            Command::InitLegacy { plugin_dir } => vec![
                "init".into(),
                format!("-plugin-dir={}", plugin_dir),
                "-get-plugins=false".into(),
                "-no-color".into(),
            ],
            Command::Apply => vec!["apply".into(), "-auto-approve".into(), "-no-color".into()],
            Command::Destroy => vec!["destroy".into(), "-auto-approve".into(), "-no-color".into()],
            Command::Plan => vec!["plan".into(), "-no-color".into()],
            Command::Show => vec!["show".into(), "-no-color".into()],
            Command::Import { address, id } => vec!["import".into(), address.clone(), id.clone()],
            Command::ReplaceProvider { old, new } => vec![
                "state".into(),
                "replace-provider".into(),
                "-auto-approve".into(),
                old.clone(),
                new.clone(),
            ],
        }
    }

    /// Extra `K=V` entries for the subprocess environment
    pub fn env(&self) -> Vec<String> {
        match self {
            Command::Show => vec![SHOW_ENV.to_string()],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}
