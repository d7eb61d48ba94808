//! `compose ps` invocation and NDJSON parsing.

use tokio::process::Command;

use crate::compose::{ComposeOptions, PsEntry};
use crate::error::{Error, Result};

/// Build the full `ps` argument vector.
#[must_use]
pub fn ps_args(options: &ComposeOptions) -> Vec<String> {
    let mut args = options.base_args();
    args.extend(["ps", "-a", "--format", "json"].iter().map(ToString::to_string));
    args
}

/// Run `ps -a --format json` and parse the container rows.
pub async fn run_ps(options: &ComposeOptions) -> Result<Vec<PsEntry>> {
    let args = ps_args(options);
    let output = Command::new("docker")
        .args(&args)
        .current_dir(&options.cwd)
        .output()
        .await
        .map_err(|e| Error::compose_exec("ps", format!("failed to spawn docker: {e}")))?;

    if !output.status.success() {
        return Err(Error::compose_exec(
            "ps",
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    parse_ps_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `ps --format json` output.
///
/// Newer compose releases emit NDJSON (one object per line); older ones emit
/// a single JSON array. Both are accepted.
pub fn parse_ps_output(stdout: &str) -> Result<Vec<PsEntry>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| Error::compose_exec("ps", format!("unparseable ps output: {e}")));
    }
    let mut entries = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: PsEntry = serde_json::from_str(line)
            .map_err(|e| Error::compose_exec("ps", format!("unparseable ps line: {e}")))?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ndjson() {
        let stdout = concat!(
            "{\"Name\":\"lo1-shop-db-1\",\"Service\":\"db\",\"State\":\"running\",\"Health\":\"healthy\",\"ExitCode\":0}\n",
            "{\"Name\":\"lo1-shop-migrator-1\",\"Service\":\"migrator\",\"State\":\"exited\",\"Health\":\"\",\"ExitCode\":0}\n",
        );
        let entries = parse_ps_output(stdout).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].service, "db");
        assert_eq!(entries[0].state, "running");
        assert_eq!(entries[0].health, "healthy");
        assert_eq!(entries[1].state, "exited");
        assert_eq!(entries[1].exit_code, Some(0));
    }

    #[test]
    fn test_parse_array_form() {
        let stdout = r#"[{"Name":"x","Service":"db","State":"running","Health":"","ExitCode":0}]"#;
        let entries = parse_ps_output(stdout).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].service, "db");
    }

    #[test]
    fn test_parse_missing_optional_fields() {
        let stdout = r#"{"Name":"x","Service":"db","State":"created"}"#;
        let entries = parse_ps_output(stdout).unwrap();
        assert_eq!(entries[0].health, "");
        assert_eq!(entries[0].exit_code, None);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_ps_output("").unwrap().is_empty());
        assert!(parse_ps_output("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn test_ps_args() {
        let options = ComposeOptions {
            project_name: "lo1-shop".into(),
            file_args: vec![std::path::PathBuf::from("compose.yaml")],
            cwd: std::path::PathBuf::from("."),
        };
        let args = ps_args(&options);
        let tail: Vec<_> = args.iter().skip_while(|a| *a != "ps").collect();
        assert_eq!(tail, ["ps", "-a", "--format", "json"]);
    }
}
