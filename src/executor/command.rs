use async_trait::async_trait;
use hv_utils::string::tail;
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;

use super::collaborator::{Collaborator, Failure};
use crate::models::{Record, Task};

const STDERR_TAIL: usize = 300;

/// Runs a shell command once per attempt and reads records from its stdout.
///
/// The task reaches the command through `HV_TASK_ID`, `HV_QUERY`,
/// `HV_LOCATION`, `HV_LIMIT` and `HV_TASK_JSON`. Stdout must hold a JSON array
/// of records, or an object with such an array under `places`.
#[derive(Debug, Clone)]
pub struct CommandCollaborator {
    command: String,
}

impl CommandCollaborator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Collaborator for CommandCollaborator {
    async fn execute(&mut self, task: &Task) -> Result<Vec<Record>, Failure> {
        let task_json = serde_json::to_string(task)
            .map_err(|err| Failure::permanent(format!("task is not serializable: {}", err)))?;

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("HV_TASK_ID", task.id.as_str())
            .env("HV_QUERY", &task.params.query)
            .env("HV_LOCATION", &task.params.location)
            .env("HV_LIMIT", task.params.limit.to_string())
            .env("HV_TASK_JSON", task_json)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| Failure::new(format!("failed to spawn command: {}", err)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Failure::new(format!(
                "command exited with {}: {}",
                output.status,
                tail(stderr.trim(), STDERR_TAIL)
            )));
        }

        parse_records(&output.stdout)
    }
}

fn parse_records(stdout: &[u8]) -> Result<Vec<Record>, Failure> {
    let value: Value = serde_json::from_slice(stdout)
        .map_err(|err| Failure::new(format!("unparsable command output: {}", err)))?;

    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut object) => match object.remove("places") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(Failure::new("command output has no `places` array")),
        },
        _ => Err(Failure::new("command output is not a list of records")),
    }
}
