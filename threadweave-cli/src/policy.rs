//! `threadweave policy` subcommands

use serde_json::{Value, json};
use std::path::Path;
use tracing::info;

use threadweave_policy::{PolicyConfig, PolicyPreset, ToolInvocation};

use crate::PolicyCommands;
use crate::error::CliError;

pub fn run_policy_command(command: PolicyCommands) -> Result<(), CliError> {
    match command {
        PolicyCommands::Check {
            tool,
            args,
            policy,
            preset,
        } => {
            let output = check(&tool, args.as_deref(), policy.as_deref(), &preset)?;
            println!("{}", output);
        }
        PolicyCommands::Show { preset } => {
            print!("{}", show(&preset)?);
        }
    }
    Ok(())
}

fn load_policy(policy: Option<&Path>, preset: &str) -> Result<PolicyConfig, CliError> {
    match policy {
        Some(path) => Ok(PolicyConfig::load_from_file(path)?),
        None => Ok(preset.parse::<PolicyPreset>()?.config()),
    }
}

/// Evaluate one invocation and render the decision as pretty JSON.
pub fn check(
    tool: &str,
    args: Option<&str>,
    policy: Option<&Path>,
    preset: &str,
) -> Result<String, CliError> {
    let args: Value = match args {
        Some(raw) => serde_json::from_str(raw)?,
        None => json!({}),
    };
    let engine = load_policy(policy, preset)?.engine();
    let decision = engine.evaluate(&ToolInvocation::new(tool, args));
    info!(tool = %tool, action = %decision.action, "Evaluated policy");
    Ok(serde_json::to_string_pretty(&decision)?)
}

pub fn show(preset: &str) -> Result<String, CliError> {
    let preset: PolicyPreset = preset.parse()?;
    Ok(preset.config().to_toml()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_with_preset() {
        let output = check("File.read", None, None, "strict").unwrap();
        let decision: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(decision["action"], "allow");

        let output = check("Bash", Some(r#"{"cmd": "ls"}"#), None, "strict").unwrap();
        let decision: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(decision["action"], "reject");
    }

    #[test]
    fn test_check_with_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(
            &path,
            r#"
version = "1.0"

[[rules]]
tool = "Bash"
action = "reject"
matches = { cmd = "*rm -rf*" }

[[rules]]
tool = "Bash"
action = "ask"
"#,
        )
        .unwrap();

        let output = check("Bash", Some(r#"{"cmd": "rm -rf /"}"#), Some(&path), "default").unwrap();
        let decision: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(decision["action"], "reject");
        assert_eq!(decision["matchedRule"]["tool"], "Bash");
    }

    #[test]
    fn test_check_rejects_bad_input() {
        assert!(matches!(
            check("Bash", Some("{not json"), None, "default"),
            Err(CliError::Json(_))
        ));
        assert_eq!(
            check("Bash", None, None, "lenient").unwrap_err().code(),
            "POLICY_CONFIG"
        );
    }

    #[test]
    fn test_show_preset_round_trips() {
        let toml = show("permissive").unwrap();
        let config = PolicyConfig::load_from_toml(&toml).unwrap();
        assert_eq!(config, PolicyPreset::Permissive.config());
    }
}
